//! dropforge-engine - `SQLite`-backed reward and ledger engine.
//!
//! This crate persists the state that `dropforge-core` computes over:
//! account balances behind an append-only ledger, crowdfunding campaigns
//! settled by contribution-weighted draws, inventories of cases and skins,
//! live sessions with giveaway rules, and the telemetry ingestion pipeline
//! that turns deduplicated packets into events, activity, and lottery
//! rounds.
//!
//! All writes go through one WAL-mode connection behind a mutex; every
//! money or state mutation is a single `rusqlite` transaction. Item prize
//! delivery is the one deliberately non-transactional edge: the deciding
//! draw commits first and the grant follows best-effort (see [`dispatch`]).
//!
//! # Modules
//!
//! - [`store`]: connection handling and the embedded schema
//! - [`ledger`]: balances and the append-only money ledger
//! - [`campaign`]: crowdfunding lifecycle and settlement
//! - [`lottery`]: round records and global telemetry draws
//! - [`session`]: live sessions, invites, giveaway rules
//! - [`inventory`]: cases and skins, opening and selling
//! - [`ingest`]: packet dedup, event derivation, trigger fan-out
//! - [`dispatch`]: post-commit item prize delivery
//! - [`engine`]: the composed façade

pub mod campaign;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod inventory;
pub mod ledger;
pub mod lottery;
pub mod session;
pub mod store;

pub use campaign::{
    Campaign, CampaignProgress, CampaignStatus, ContributionOutcome, ContributorShare, RewardKind,
    Settlement,
};
pub use dispatch::{dispatch_grants, DispatchReport, PendingGrant};
pub use engine::{ContributeResult, Engine, IngestResult, SettleResult};
pub use error::{EngineError, ErrorKind};
pub use ingest::{ingest_packet, IngestOutcome};
pub use inventory::{CaseOpening, InventoryItem, ItemKind, ItemStatus, Sale};
pub use ledger::{Account, LedgerEntry};
pub use lottery::Round;
pub use session::{GiveawayRule, Session, SessionStatus};
pub use store::Store;
