//! Post-commit delivery of item prizes.
//!
//! Cash prizes are credited inside the transaction that decides them; item
//! prizes (cases, skins) are granted here, after that transaction commits.
//! Delivery is best effort: each grant runs in its own transaction, a
//! failure is logged and reported without touching the grants that
//! succeeded, and the recorded round remains the source of truth for what
//! was won.

use dropforge_core::{Metadata, PriceResolver};
use tracing::warn;

use crate::error::EngineError;
use crate::inventory::{self, InventoryItem, ItemGrant, ItemKind};
use crate::store::Store;

/// An item prize decided but not yet granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGrant {
    /// The winning account.
    pub account_id: i64,
    /// Case or skin.
    pub kind: ItemKind,
    /// Market name of the prize.
    pub name: String,
    /// Item source to record (crowdfunding or giveaway).
    pub source: String,
    /// The round that decided this prize.
    pub round_id: i64,
}

/// Outcome of a dispatch pass.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Items granted.
    pub granted: Vec<InventoryItem>,
    /// Grants that failed, with their errors. The caller may retry; the
    /// winning round row is already durable.
    pub failed: Vec<(PendingGrant, EngineError)>,
}

impl DispatchReport {
    /// True when every grant landed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Grants each pending item prize in its own transaction.
pub fn dispatch_grants(
    store: &Store,
    resolver: &PriceResolver,
    grants: Vec<PendingGrant>,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for grant in grants {
        match grant_one(store, resolver, &grant) {
            Ok(item) => report.granted.push(item),
            Err(err) => {
                warn!(
                    account_id = grant.account_id,
                    round_id = grant.round_id,
                    name = grant.name,
                    error = %err,
                    "prize grant failed"
                );
                report.failed.push((grant, err));
            }
        }
    }
    report
}

fn grant_one(
    store: &Store,
    resolver: &PriceResolver,
    grant: &PendingGrant,
) -> Result<InventoryItem, EngineError> {
    // Prize items carry no rarity tier of their own; price resolution
    // falls through to the static table or the per-kind floor.
    let rarity = "";
    let price_cents = resolver.resolve(grant.kind.as_str(), &grant.name, rarity);

    let mut conn = store.lock();
    let tx = conn.transaction()?;
    let item = inventory::grant_item(
        &tx,
        ItemGrant {
            owner_id: grant.account_id,
            kind: grant.kind,
            name: &grant.name,
            rarity,
            price_cents,
            source: &grant.source,
            parent_item_id: None,
            metadata: Metadata::new().with("round_id", grant.round_id),
        },
    )?;
    tx.commit()?;
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{ItemStatus, SOURCE_CROWDFUNDING, SOURCE_GIVEAWAY};
    use crate::ledger::ensure_account;

    fn setup(accounts: &[i64]) -> Store {
        let store = Store::in_memory().unwrap();
        for &id in accounts {
            ensure_account(&store.lock(), id, "winner").unwrap();
        }
        store
    }

    fn pending(account_id: i64, kind: ItemKind, name: &str) -> PendingGrant {
        PendingGrant {
            account_id,
            kind,
            name: name.to_string(),
            source: SOURCE_CROWDFUNDING.to_string(),
            round_id: 1,
        }
    }

    #[test]
    fn test_grants_land_with_resolved_prices() {
        let store = setup(&[1]);
        let report = dispatch_grants(
            &store,
            &PriceResolver::offline(),
            vec![
                pending(1, ItemKind::Case, "Revolution Case"),
                pending(1, ItemKind::Skin, "AK-47 | Slate"),
            ],
        );

        assert!(report.is_complete());
        assert_eq!(report.granted.len(), 2);
        assert_eq!(report.granted[0].status, ItemStatus::Unopened);
        assert_eq!(report.granted[0].price_cents, 55);
        assert_eq!(report.granted[1].status, ItemStatus::Available);
        assert_eq!(report.granted[1].price_cents, 1200);
    }

    #[test]
    fn test_partial_failure_keeps_successes() {
        let store = setup(&[1]);
        let report = dispatch_grants(
            &store,
            &PriceResolver::offline(),
            vec![
                pending(1, ItemKind::Case, "Revolution Case"),
                // Unknown account: this grant fails, the first stands.
                pending(99, ItemKind::Case, "Revolution Case"),
            ],
        );

        assert_eq!(report.granted.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
        assert!(matches!(
            report.failed[0].1,
            EngineError::AccountNotFound { account_id: 99 }
        ));

        let items = inventory::list_items(&store.lock(), 1, 10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].metadata.get("round_id").cloned(),
            Some(dropforge_core::MetaValue::Int(1)));
    }

    #[test]
    fn test_giveaway_source_is_recorded() {
        let store = setup(&[1]);
        let mut grant = pending(1, ItemKind::Skin, "MP9 | Storm");
        grant.source = SOURCE_GIVEAWAY.to_string();
        let report = dispatch_grants(&store, &PriceResolver::offline(), vec![grant]);
        assert_eq!(report.granted[0].source, SOURCE_GIVEAWAY);
    }
}
