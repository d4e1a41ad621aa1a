//! Pure domain logic for the dropforge reward engine.
//!
//! This crate contains everything that does not touch storage:
//!
//! - [`draw`]: proportional weighted random selection over candidate sets
//! - [`loot`]: named weighted drop pools for case openings
//! - [`pricing`]: the layered price-resolution policy with a TTL cache
//! - [`telemetry`]: packet content hashing and semantic event derivation
//! - [`metadata`]: the typed key/value sidecar attached to ledger entries,
//!   rounds, and items
//! - [`config`]: engine configuration loaded from TOML
//!
//! The durable half (SQLite store, ledger, campaigns, inventory, ingestion)
//! lives in `dropforge-engine` and builds on these primitives.

pub mod config;
pub mod draw;
pub mod loot;
pub mod metadata;
pub mod pricing;
pub mod telemetry;

/// Monetary amount in minor currency units (cents). All balances, prices,
/// prizes, and contribution amounts use this representation; there is no
/// floating-point money anywhere in the engine.
pub type Cents = i64;

pub use config::EngineConfig;
pub use draw::{weighted_draw, DrawError, OsRandom, RandomSource, ScriptedRandom, WeightEntry};
pub use loot::{pool_for_case, premium_pool, standard_pool, LootEntry, LootTable, Rarity};
pub use metadata::{MetaValue, Metadata};
pub use pricing::{MarketPriceSource, NoMarket, PriceCache, PriceResolver};
pub use telemetry::{derive_events, packet_hash, DerivedEvent, EventKind};
