//! The engine façade: one handle composing the store, configuration,
//! random source, and price resolver, exposing the cross-module workflows.
//!
//! Single-module operations (sessions, campaign CRUD, inventory listing)
//! live in their modules and take the [`Store`] directly; the façade owns
//! the flows that span a settlement transaction plus post-commit delivery.

use dropforge_core::{
    Cents, EngineConfig, Metadata, NoMarket, OsRandom, PriceResolver, RandomSource,
};
use serde_json::Value;
use tracing::info;

use crate::campaign::{self, Campaign, Settlement};
use crate::dispatch::{self, PendingGrant};
use crate::error::EngineError;
use crate::ingest::{self, IngestOutcome};
use crate::inventory::{self, CaseOpening, InventoryItem, ItemKind, Sale, SOURCE_CROWDFUNDING};
use crate::ledger::{self, LedgerEntry};
use crate::store::Store;

/// Result of a contribution through the façade: the funding flip and, when
/// it crossed the target, the settlement that followed.
#[derive(Debug)]
pub struct ContributeResult {
    /// The campaign after the contribution.
    pub campaign: Campaign,
    /// Whether this contribution crossed the target.
    pub funded: bool,
    /// The settlement, when funding triggered one.
    pub settlement: Option<SettleResult>,
}

/// Result of settling one campaign.
#[derive(Debug)]
pub struct SettleResult {
    /// The draw and payout record.
    pub settlement: Settlement,
    /// The granted item for case/skin rewards. `None` for cash rewards, or
    /// when the grant failed and was left to a later retry (the round row
    /// records what is owed).
    pub granted: Option<InventoryItem>,
}

/// Result of ingesting a packet through the façade.
#[derive(Debug)]
pub struct IngestResult {
    /// The transactional outcome.
    pub outcome: IngestOutcome,
    /// Item prizes delivered post-commit.
    pub granted: Vec<InventoryItem>,
}

/// The assembled engine.
pub struct Engine {
    store: Store,
    config: EngineConfig,
    rng: Box<dyn RandomSource>,
    resolver: PriceResolver,
}

impl Engine {
    /// Assembles an engine from explicit parts.
    #[must_use]
    pub fn new(
        store: Store,
        config: EngineConfig,
        rng: Box<dyn RandomSource>,
        resolver: PriceResolver,
    ) -> Self {
        Self {
            store,
            config,
            rng,
            resolver,
        }
    }

    /// Engine over the OS random source with no market integration, using
    /// the configured cache and timeout settings.
    #[must_use]
    pub fn with_defaults(store: Store, config: EngineConfig) -> Self {
        let resolver = PriceResolver::new(
            Box::new(NoMarket),
            config.price_ttl(),
            config.market_timeout(),
        );
        Self::new(store, config, Box::new(OsRandom), resolver)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The price resolver.
    #[must_use]
    pub fn resolver(&self) -> &PriceResolver {
        &self.resolver
    }

    /// Creates the account if missing.
    ///
    /// # Errors
    ///
    /// Returns a database error on failure.
    pub fn ensure_account(&self, account_id: i64, display_name: &str) -> Result<(), EngineError> {
        ledger::ensure_account(&self.store.lock(), account_id, display_name)
    }

    /// Current balance in cents.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AccountNotFound`] for an unknown account.
    pub fn balance(&self, account_id: i64) -> Result<Cents, EngineError> {
        ledger::get_balance(&self.store.lock(), account_id)
    }

    /// Applies an operator adjustment to a balance.
    ///
    /// # Errors
    ///
    /// Returns the validation and conflict errors of
    /// [`ledger::adjust_balance`].
    pub fn adjust_balance(
        &self,
        account_id: i64,
        delta: Cents,
        reason: &str,
        metadata: &Metadata,
    ) -> Result<LedgerEntry, EngineError> {
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let entry = ledger::adjust_balance(&tx, account_id, delta, reason, metadata)?;
        tx.commit()?;
        Ok(entry)
    }

    /// Ledger history, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database error on failure.
    pub fn history(&self, account_id: i64, limit: u32) -> Result<Vec<LedgerEntry>, EngineError> {
        ledger::list_entries(&self.store.lock(), account_id, limit)
    }

    /// Contributes to a campaign; when the contribution crosses the target,
    /// settlement runs immediately and item rewards are delivered.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`campaign::contribute`]. A settlement failure
    /// after a committed funding flip also surfaces here; the campaign then
    /// stays `funded` for [`Engine::reconcile`].
    pub fn contribute(
        &self,
        account_id: i64,
        campaign_id: i64,
        amount: Cents,
    ) -> Result<ContributeResult, EngineError> {
        let outcome = campaign::contribute(&self.store, account_id, campaign_id, amount)?;
        let settlement = if outcome.funded {
            Some(self.settle_campaign(campaign_id)?)
        } else {
            None
        };
        Ok(ContributeResult {
            campaign: outcome.campaign,
            funded: outcome.funded,
            settlement,
        })
    }

    /// Settles a funded campaign and delivers its item reward.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`campaign::settle`].
    pub fn settle_campaign(&self, campaign_id: i64) -> Result<SettleResult, EngineError> {
        let settlement = campaign::settle(&self.store, campaign_id, self.rng.as_ref())?;

        let granted = match settlement.reward_kind {
            campaign::RewardKind::Cash => None,
            campaign::RewardKind::Case | campaign::RewardKind::Skin => {
                let kind = if settlement.reward_kind == campaign::RewardKind::Case {
                    ItemKind::Case
                } else {
                    ItemKind::Skin
                };
                let report = dispatch::dispatch_grants(
                    &self.store,
                    &self.resolver,
                    vec![PendingGrant {
                        account_id: settlement.winner_id,
                        kind,
                        name: settlement.reward_name.clone(),
                        source: SOURCE_CROWDFUNDING.to_string(),
                        round_id: settlement.round.id,
                    }],
                );
                report.granted.into_iter().next()
            }
        };

        Ok(SettleResult {
            settlement,
            granted,
        })
    }

    /// Settles every funded campaign left without a round by a crash
    /// between its funding flip and settlement.
    ///
    /// # Errors
    ///
    /// Returns a database error from the sweep query; individual
    /// settlements that fail abort the sweep with their error.
    pub fn reconcile(&self) -> Result<Vec<SettleResult>, EngineError> {
        let pending = campaign::unsettled_funded(&self.store.lock())?;
        if !pending.is_empty() {
            info!(count = pending.len(), "reconciling unsettled campaigns");
        }

        let mut settled = Vec::with_capacity(pending.len());
        for campaign_id in pending {
            settled.push(self.settle_campaign(campaign_id)?);
        }
        Ok(settled)
    }

    /// Opens a case from the caller's inventory.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`inventory::open_case`].
    pub fn open_case(&self, account_id: i64, item_id: i64) -> Result<CaseOpening, EngineError> {
        inventory::open_case(
            &self.store,
            account_id,
            item_id,
            self.rng.as_ref(),
            &self.resolver,
        )
    }

    /// Sells an item from the caller's inventory.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`inventory::sell_item`].
    pub fn sell_item(&self, account_id: i64, item_id: i64) -> Result<Sale, EngineError> {
        inventory::sell_item(&self.store, account_id, item_id, &self.resolver)
    }

    /// Ingests one telemetry packet and delivers any item prizes it won.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`ingest::ingest_packet`].
    pub fn ingest(
        &self,
        account_id: Option<i64>,
        source: &str,
        packet: &Value,
    ) -> Result<IngestResult, EngineError> {
        let outcome = ingest::ingest_packet(
            &self.store,
            &self.config,
            account_id,
            source,
            packet,
            self.rng.as_ref(),
        )?;
        let report = dispatch::dispatch_grants(
            &self.store,
            &self.resolver,
            outcome.pending_grants.clone(),
        );
        Ok(IngestResult {
            outcome,
            granted: report.granted,
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
