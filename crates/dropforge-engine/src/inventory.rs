//! Inventory items: cases and skins, their lifecycle, opening, and selling.
//!
//! Cases arrive `unopened` and skins arrive `available`. Opening a case is
//! one transaction that retires the case, draws from its pool, prices the
//! drop, and grants the resulting skin with provenance back to the case.
//! Selling retires the item and credits its price to the owner's balance.

use dropforge_core::{pool_for_case, Cents, Metadata, PriceResolver, RandomSource};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::info;

use crate::error::EngineError;
use crate::ledger;
use crate::store::{now_ms, Store};

/// Item source recorded for direct grants.
pub const SOURCE_SYSTEM: &str = "system";
/// Item source recorded for case-opening drops.
pub const SOURCE_CASE_OPEN: &str = "case_open";
/// Item source recorded for campaign settlement rewards.
pub const SOURCE_CROWDFUNDING: &str = "crowdfunding_reward";
/// Item source recorded for session giveaway prizes.
pub const SOURCE_GIVEAWAY: &str = "stream_giveaway_reward";

/// What an inventory item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// An openable container.
    Case,
    /// A weapon skin.
    Skin,
}

impl ItemKind {
    /// Canonical storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::Skin => "skin",
        }
    }

    /// Parses a kind from its canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidItemKind`] for anything else.
    pub fn parse(value: &str) -> Result<Self, EngineError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "case" => Ok(Self::Case),
            "skin" => Ok(Self::Skin),
            other => Err(EngineError::InvalidItemKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Item lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// A case not yet opened. May be opened or sold.
    Unopened,
    /// A skin in hand. May be sold.
    Available,
    /// A case that has been opened. Terminal.
    Opened,
    /// Sold. Terminal.
    Sold,
}

impl ItemStatus {
    /// Canonical storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::Available => "available",
            Self::Opened => "opened",
            Self::Sold => "sold",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "unopened" => Self::Unopened,
            "opened" => Self::Opened,
            "sold" => Self::Sold,
            _ => Self::Available,
        }
    }
}

/// One inventory item.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    /// Item id.
    pub id: i64,
    /// Owning account.
    pub owner_id: i64,
    /// Case or skin.
    pub kind: ItemKind,
    /// Market name.
    pub name: String,
    /// Rarity tier name; empty for cases.
    pub rarity: String,
    /// Resolved price at grant time, in cents.
    pub price_cents: Cents,
    /// Lifecycle status.
    pub status: ItemStatus,
    /// Where the item came from.
    pub source: String,
    /// The case this item dropped from, for case-opening provenance.
    pub parent_item_id: Option<i64>,
    /// Open-ended sidecar (pool name, trigger, ...).
    pub metadata: Metadata,
    /// Grant time in epoch milliseconds.
    pub created_at_ms: i64,
    /// Open time, for opened cases.
    pub opened_at_ms: Option<i64>,
    /// Sale time, for sold items.
    pub sold_at_ms: Option<i64>,
}

/// Fields for an item about to be granted.
#[derive(Debug, Clone)]
pub struct ItemGrant<'a> {
    /// Owning account.
    pub owner_id: i64,
    /// Case or skin.
    pub kind: ItemKind,
    /// Market name.
    pub name: &'a str,
    /// Rarity tier name; empty for cases.
    pub rarity: &'a str,
    /// Resolved price in cents.
    pub price_cents: Cents,
    /// Where the item came from.
    pub source: &'a str,
    /// The case this item dropped from, if any.
    pub parent_item_id: Option<i64>,
    /// Open-ended sidecar.
    pub metadata: Metadata,
}

/// Grants an item inside the caller's transaction. Cases start `unopened`,
/// skins start `available`.
///
/// # Errors
///
/// Returns [`EngineError::EmptyItemName`] for a blank name and
/// [`EngineError::AccountNotFound`] for an unknown owner.
pub fn grant_item(
    tx: &Transaction<'_>,
    grant: ItemGrant<'_>,
) -> Result<InventoryItem, EngineError> {
    let name = grant.name.trim();
    if name.is_empty() {
        return Err(EngineError::EmptyItemName);
    }
    ledger::get_account(tx, grant.owner_id)?;

    let status = match grant.kind {
        ItemKind::Case => ItemStatus::Unopened,
        ItemKind::Skin => ItemStatus::Available,
    };
    let created_at_ms = now_ms();
    tx.execute(
        "INSERT INTO inventory_items
             (owner_id, kind, name, rarity, price_cents, status, source, parent_item_id,
              metadata, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            grant.owner_id,
            grant.kind.as_str(),
            name,
            grant.rarity,
            grant.price_cents.max(0),
            status.as_str(),
            grant.source,
            grant.parent_item_id,
            grant.metadata.to_json(),
            created_at_ms
        ],
    )?;
    let id = tx.last_insert_rowid();
    info!(
        item_id = id,
        owner_id = grant.owner_id,
        kind = grant.kind.as_str(),
        name,
        source = grant.source,
        "item granted"
    );

    Ok(InventoryItem {
        id,
        owner_id: grant.owner_id,
        kind: grant.kind,
        name: name.to_string(),
        rarity: grant.rarity.to_string(),
        price_cents: grant.price_cents.max(0),
        status,
        source: grant.source.to_string(),
        parent_item_id: grant.parent_item_id,
        metadata: grant.metadata,
        created_at_ms,
        opened_at_ms: None,
        sold_at_ms: None,
    })
}

/// Loads an item by id.
///
/// # Errors
///
/// Returns [`EngineError::ItemNotFound`] if the item does not exist.
pub fn get_item(conn: &Connection, item_id: i64) -> Result<InventoryItem, EngineError> {
    let row = conn
        .query_row(
            "SELECT id, owner_id, kind, name, rarity, price_cents, status, source,
                    parent_item_id, metadata, created_at_ms, opened_at_ms, sold_at_ms
             FROM inventory_items WHERE id = ?1",
            params![item_id],
            row_to_raw,
        )
        .optional()?;
    row.map_or(Err(EngineError::ItemNotFound { item_id }), raw_to_item)
}

/// Lists an account's items, newest first.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn list_items(
    conn: &Connection,
    owner_id: i64,
    limit: u32,
) -> Result<Vec<InventoryItem>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, kind, name, rarity, price_cents, status, source,
                parent_item_id, metadata, created_at_ms, opened_at_ms, sold_at_ms
         FROM inventory_items WHERE owner_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![owner_id, limit], row_to_raw)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(raw_to_item(row?)?);
    }
    Ok(items)
}

/// Lists an account's live items only — unopened cases and available
/// skins — newest first. The display view; sold and opened items stay in
/// [`list_items`] for audit.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn list_active_items(
    conn: &Connection,
    owner_id: i64,
    limit: u32,
) -> Result<Vec<InventoryItem>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, kind, name, rarity, price_cents, status, source,
                parent_item_id, metadata, created_at_ms, opened_at_ms, sold_at_ms
         FROM inventory_items
         WHERE owner_id = ?1 AND status IN ('unopened', 'available')
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![owner_id, limit], row_to_raw)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(raw_to_item(row?)?);
    }
    Ok(items)
}

/// Result of opening a case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOpening {
    /// The retired case.
    pub case: InventoryItem,
    /// The granted drop.
    pub drop: InventoryItem,
}

/// Opens a case: retires it, draws from its pool, prices the drop, and
/// grants the resulting skin, all in one transaction.
///
/// # Errors
///
/// Returns [`EngineError::NotItemOwner`] for a non-owner caller and
/// [`EngineError::ItemNotOpenable`] unless the item is an unopened case.
pub fn open_case(
    store: &Store,
    account_id: i64,
    item_id: i64,
    rng: &dyn RandomSource,
    resolver: &PriceResolver,
) -> Result<CaseOpening, EngineError> {
    let mut conn = store.lock();
    let tx = conn.transaction()?;

    let mut case = get_item(&tx, item_id)?;
    if case.owner_id != account_id {
        return Err(EngineError::NotItemOwner {
            account_id,
            item_id,
        });
    }
    if case.kind != ItemKind::Case || case.status != ItemStatus::Unopened {
        return Err(EngineError::ItemNotOpenable { item_id });
    }

    let pool = pool_for_case(&case.name);
    let outcome = pool.draw(rng)?;
    let price_cents = resolver.resolve(
        ItemKind::Skin.as_str(),
        outcome.name,
        outcome.rarity.as_str(),
    );

    let opened_at_ms = now_ms();
    tx.execute(
        "UPDATE inventory_items SET status = 'opened', opened_at_ms = ?2 WHERE id = ?1",
        params![item_id, opened_at_ms],
    )?;
    case.status = ItemStatus::Opened;
    case.opened_at_ms = Some(opened_at_ms);

    let mut meta = Metadata::new().with("pool", pool.name);
    meta.set_price_cents(price_cents);
    let drop = grant_item(
        &tx,
        ItemGrant {
            owner_id: account_id,
            kind: ItemKind::Skin,
            name: outcome.name,
            rarity: outcome.rarity.as_str(),
            price_cents,
            source: SOURCE_CASE_OPEN,
            parent_item_id: Some(item_id),
            metadata: meta,
        },
    )?;
    tx.commit()?;

    info!(case_id = item_id, drop_id = drop.id, drop_name = drop.name, "case opened");
    Ok(CaseOpening { case, drop })
}

/// Result of selling an item.
#[derive(Debug, Clone, PartialEq)]
pub struct Sale {
    /// The retired item.
    pub item: InventoryItem,
    /// The amount credited to the owner.
    pub credited_cents: Cents,
}

/// Sells an item at its recorded price (re-resolving when none was stored),
/// crediting the owner and retiring the item in one transaction.
///
/// Available skins and unopened cases are sellable; opened and sold items
/// are not.
///
/// # Errors
///
/// Returns [`EngineError::NotItemOwner`] for a non-owner caller and
/// [`EngineError::ItemNotSellable`] for terminal statuses.
pub fn sell_item(
    store: &Store,
    account_id: i64,
    item_id: i64,
    resolver: &PriceResolver,
) -> Result<Sale, EngineError> {
    let mut conn = store.lock();
    let tx = conn.transaction()?;

    let mut item = get_item(&tx, item_id)?;
    if item.owner_id != account_id {
        return Err(EngineError::NotItemOwner {
            account_id,
            item_id,
        });
    }
    let sellable = matches!(
        (item.kind, item.status),
        (ItemKind::Skin, ItemStatus::Available) | (ItemKind::Case, ItemStatus::Unopened)
    );
    if !sellable {
        return Err(EngineError::ItemNotSellable {
            item_id,
            status: item.status.as_str().to_string(),
        });
    }

    let credited_cents = if item.price_cents > 0 {
        item.price_cents
    } else {
        resolver.resolve(item.kind.as_str(), &item.name, &item.rarity)
    };

    let meta = Metadata::new()
        .with("item_id", item_id)
        .with("item_name", item.name.as_str());
    ledger::adjust_balance(
        &tx,
        account_id,
        credited_cents,
        ledger::REASON_INVENTORY_SELL,
        &meta,
    )?;

    let sold_at_ms = now_ms();
    tx.execute(
        "UPDATE inventory_items SET status = 'sold', sold_at_ms = ?2 WHERE id = ?1",
        params![item_id, sold_at_ms],
    )?;
    tx.commit()?;

    item.status = ItemStatus::Sold;
    item.sold_at_ms = Some(sold_at_ms);
    info!(item_id, account_id, credited_cents, "item sold");
    Ok(Sale {
        item,
        credited_cents,
    })
}

type RawItem = (
    i64,
    i64,
    String,
    String,
    String,
    Cents,
    String,
    String,
    Option<i64>,
    String,
    i64,
    Option<i64>,
    Option<i64>,
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawItem> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ))
}

fn raw_to_item(raw: RawItem) -> Result<InventoryItem, EngineError> {
    let (
        id,
        owner_id,
        kind,
        name,
        rarity,
        price_cents,
        status,
        source,
        parent_item_id,
        metadata,
        created_at_ms,
        opened_at_ms,
        sold_at_ms,
    ) = raw;
    Ok(InventoryItem {
        id,
        owner_id,
        kind: ItemKind::parse(&kind)?,
        name,
        rarity,
        price_cents,
        status: ItemStatus::parse(&status),
        source,
        parent_item_id,
        metadata: Metadata::from_json(&metadata),
        created_at_ms,
        opened_at_ms,
        sold_at_ms,
    })
}

#[cfg(test)]
mod tests {
    use dropforge_core::{OsRandom, ScriptedRandom};

    use super::*;
    use crate::ledger::ensure_account;

    fn setup(accounts: &[i64]) -> Store {
        let store = Store::in_memory().unwrap();
        for &id in accounts {
            ensure_account(&store.lock(), id, "tester").unwrap();
        }
        store
    }

    fn grant_case(store: &Store, owner_id: i64, name: &str) -> InventoryItem {
        let mut conn = store.lock();
        let tx = conn.transaction().unwrap();
        let case = grant_item(
            &tx,
            ItemGrant {
                owner_id,
                kind: ItemKind::Case,
                name,
                rarity: "",
                price_cents: 55,
                source: SOURCE_SYSTEM,
                parent_item_id: None,
                metadata: Metadata::new(),
            },
        )
        .unwrap();
        tx.commit().unwrap();
        case
    }

    #[test]
    fn test_grant_assigns_status_by_kind() {
        let store = setup(&[1]);
        let case = grant_case(&store, 1, "Revolution Case");
        assert_eq!(case.status, ItemStatus::Unopened);

        let mut conn = store.lock();
        let tx = conn.transaction().unwrap();
        let skin = grant_item(
            &tx,
            ItemGrant {
                owner_id: 1,
                kind: ItemKind::Skin,
                name: "AK-47 | Slate",
                rarity: "restricted",
                price_cents: 1200,
                source: SOURCE_SYSTEM,
                parent_item_id: None,
                metadata: Metadata::new(),
            },
        )
        .unwrap();
        assert_eq!(skin.status, ItemStatus::Available);

        let err = grant_item(
            &tx,
            ItemGrant {
                owner_id: 1,
                kind: ItemKind::Skin,
                name: "  ",
                rarity: "",
                price_cents: 0,
                source: SOURCE_SYSTEM,
                parent_item_id: None,
                metadata: Metadata::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::EmptyItemName));
    }

    #[test]
    fn test_open_case_retires_case_and_grants_priced_drop() {
        let store = setup(&[1]);
        let case = grant_case(&store, 1, "Revolution Case");

        // Standard pool total 100; r = 99 is the covert slot.
        let rng = ScriptedRandom::new([99]);
        let opening =
            open_case(&store, 1, case.id, &rng, &PriceResolver::offline()).unwrap();
        assert_eq!(opening.case.status, ItemStatus::Opened);
        assert_eq!(opening.drop.name, "AWP | Wildfire");
        assert_eq!(opening.drop.price_cents, 5200); // static table
        assert_eq!(opening.drop.parent_item_id, Some(case.id));
        assert_eq!(opening.drop.source, SOURCE_CASE_OPEN);

        // Opening twice is a conflict.
        let err = open_case(&store, 1, case.id, &OsRandom, &PriceResolver::offline())
            .unwrap_err();
        assert!(matches!(err, EngineError::ItemNotOpenable { .. }));
    }

    #[test]
    fn test_open_requires_ownership_and_case_kind() {
        let store = setup(&[1, 2]);
        let case = grant_case(&store, 1, "Revolution Case");

        let err = open_case(&store, 2, case.id, &OsRandom, &PriceResolver::offline())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotItemOwner { .. }));

        let rng = ScriptedRandom::new([0]);
        let opening = open_case(&store, 1, case.id, &rng, &PriceResolver::offline()).unwrap();
        let err = open_case(
            &store,
            1,
            opening.drop.id,
            &OsRandom,
            &PriceResolver::offline(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ItemNotOpenable { .. }));
    }

    #[test]
    fn test_sell_credits_owner_and_retires_item() {
        let store = setup(&[1]);
        let case = grant_case(&store, 1, "Revolution Case");
        let rng = ScriptedRandom::new([99]);
        let opening =
            open_case(&store, 1, case.id, &rng, &PriceResolver::offline()).unwrap();

        let sale = sell_item(&store, 1, opening.drop.id, &PriceResolver::offline()).unwrap();
        assert_eq!(sale.credited_cents, 5200);
        assert_eq!(sale.item.status, ItemStatus::Sold);
        assert_eq!(ledger::get_balance(&store.lock(), 1).unwrap(), 5200);

        let err = sell_item(&store, 1, opening.drop.id, &PriceResolver::offline()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ItemNotSellable { .. }
        ));
        // Opened case cannot be sold either.
        let err = sell_item(&store, 1, case.id, &PriceResolver::offline()).unwrap_err();
        assert!(matches!(err, EngineError::ItemNotSellable { .. }));
    }

    #[test]
    fn test_sell_unopened_case_uses_recorded_price() {
        let store = setup(&[1]);
        let case = grant_case(&store, 1, "Revolution Case");
        let sale = sell_item(&store, 1, case.id, &PriceResolver::offline()).unwrap();
        assert_eq!(sale.credited_cents, 55);
    }

    #[test]
    fn test_premium_case_can_drop_gold() {
        let store = setup(&[1]);
        let case = grant_case(&store, 1, "Knife Fever Case");
        // Premium pool total 100; r = 99 is the last gold slot.
        let rng = ScriptedRandom::new([99]);
        let opening =
            open_case(&store, 1, case.id, &rng, &PriceResolver::offline()).unwrap();
        assert_eq!(opening.drop.name, "Butterfly Knife | Slaughter");
        assert_eq!(opening.drop.rarity, "gold");
        assert_eq!(opening.drop.price_cents, 175_000);
    }

    #[test]
    fn test_list_items_newest_first() {
        let store = setup(&[1]);
        grant_case(&store, 1, "Revolution Case");
        grant_case(&store, 1, "Kilowatt Case");

        let items = list_items(&store.lock(), 1, 10).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Kilowatt Case");
    }

    #[test]
    fn test_active_listing_hides_terminal_items() {
        let store = setup(&[1]);
        let case = grant_case(&store, 1, "Revolution Case");
        let keeper = grant_case(&store, 1, "Kilowatt Case");
        let rng = ScriptedRandom::new([0]);
        let opening =
            open_case(&store, 1, case.id, &rng, &PriceResolver::offline()).unwrap();
        sell_item(&store, 1, opening.drop.id, &PriceResolver::offline()).unwrap();

        let conn = store.lock();
        // Audit view keeps everything.
        assert_eq!(list_items(&conn, 1, 10).unwrap().len(), 3);
        // Active view drops the opened case and the sold skin.
        let active = list_active_items(&conn, 1, 10).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keeper.id);
    }
}
