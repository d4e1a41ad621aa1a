//! Account balances and the append-only money ledger.
//!
//! Every balance change goes through [`adjust_balance`]: it checks the
//! non-negative invariant, updates the cached balance, and appends a ledger
//! entry carrying the signed delta, a reason code, and optional metadata —
//! all inside the caller's transaction. At any point the sum of an account's
//! entry deltas equals its balance.

use dropforge_core::{Cents, Metadata};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::error::EngineError;
use crate::store::{now_ms, Store};

/// Reason code for a contribution debit.
pub const REASON_CASE_CONTRIBUTION: &str = "case_contribution";
/// Reason code for a lottery cash prize credit.
pub const REASON_LOTTERY_REWARD: &str = "lottery_reward";
/// Reason code for a session giveaway cash prize credit.
pub const REASON_GIVEAWAY_REWARD: &str = "stream_giveaway_reward";
/// Reason code for an inventory sale credit.
pub const REASON_INVENTORY_SELL: &str = "inventory_sell";
/// Reason code for an operator-initiated adjustment.
pub const REASON_MANUAL_ADJUST: &str = "manual_adjust";

/// A participant account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Account id (externally assigned).
    pub id: i64,
    /// Display name.
    pub display_name: String,
    /// Cached balance in cents. Always equals the sum of ledger deltas.
    pub balance_cents: Cents,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// Entry id, monotonically increasing.
    pub id: i64,
    /// The account whose balance changed.
    pub account_id: i64,
    /// Signed delta in cents.
    pub delta_cents: Cents,
    /// Reason code.
    pub reason: String,
    /// Structured context (campaign id, item id, source, ...).
    pub metadata: Metadata,
    /// Entry time in epoch milliseconds.
    pub created_at_ms: i64,
}

/// Creates the account if it does not exist, updating the display name when
/// a non-empty one is supplied.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn ensure_account(
    conn: &Connection,
    account_id: i64,
    display_name: &str,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT OR IGNORE INTO accounts (id, display_name, balance_cents, created_at_ms)
         VALUES (?1, ?2, 0, ?3)",
        params![account_id, display_name, now_ms()],
    )?;
    if !display_name.is_empty() {
        conn.execute(
            "UPDATE accounts SET display_name = ?2 WHERE id = ?1",
            params![account_id, display_name],
        )?;
    }
    Ok(())
}

/// Loads an account by id.
///
/// # Errors
///
/// Returns [`EngineError::AccountNotFound`] if the account does not exist.
pub fn get_account(conn: &Connection, account_id: i64) -> Result<Account, EngineError> {
    conn.query_row(
        "SELECT id, display_name, balance_cents, created_at_ms FROM accounts WHERE id = ?1",
        params![account_id],
        |row| {
            Ok(Account {
                id: row.get(0)?,
                display_name: row.get(1)?,
                balance_cents: row.get(2)?,
                created_at_ms: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or(EngineError::AccountNotFound { account_id })
}

/// Returns the cached balance for an account.
///
/// # Errors
///
/// Returns [`EngineError::AccountNotFound`] if the account does not exist.
pub fn get_balance(conn: &Connection, account_id: i64) -> Result<Cents, EngineError> {
    conn.query_row(
        "SELECT balance_cents FROM accounts WHERE id = ?1",
        params![account_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(EngineError::AccountNotFound { account_id })
}

/// Applies a signed delta to an account inside the caller's transaction.
///
/// Checks the balance floor, updates the cached balance, and appends the
/// ledger entry. The caller decides whether the surrounding work commits.
///
/// # Errors
///
/// Returns a validation error for a zero delta or empty reason,
/// [`EngineError::AccountNotFound`] for an unknown account, and
/// [`EngineError::InsufficientFunds`] when the delta would take the balance
/// below zero.
pub fn adjust_balance(
    tx: &Transaction<'_>,
    account_id: i64,
    delta: Cents,
    reason: &str,
    metadata: &Metadata,
) -> Result<LedgerEntry, EngineError> {
    if delta == 0 {
        return Err(EngineError::ZeroDelta);
    }
    if reason.trim().is_empty() {
        return Err(EngineError::EmptyReason);
    }

    let balance = get_balance(tx, account_id)?;
    let next = balance + delta;
    if next < 0 {
        return Err(EngineError::InsufficientFunds {
            account_id,
            balance,
            delta,
        });
    }

    tx.execute(
        "UPDATE accounts SET balance_cents = ?2 WHERE id = ?1",
        params![account_id, next],
    )?;

    let created_at_ms = now_ms();
    tx.execute(
        "INSERT INTO ledger_entries (account_id, delta_cents, reason, metadata, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![account_id, delta, reason, metadata.to_json(), created_at_ms],
    )?;
    let id = tx.last_insert_rowid();

    debug!(account_id, delta, reason, balance = next, "ledger entry appended");

    Ok(LedgerEntry {
        id,
        account_id,
        delta_cents: delta,
        reason: reason.to_string(),
        metadata: metadata.clone(),
        created_at_ms,
    })
}

/// Credits `amount` cents in its own transaction.
///
/// # Errors
///
/// Returns [`EngineError::NonPositiveAmount`] for a non-positive amount,
/// plus the errors of [`adjust_balance`].
pub fn credit(
    store: &Store,
    account_id: i64,
    amount: Cents,
    reason: &str,
    metadata: &Metadata,
) -> Result<LedgerEntry, EngineError> {
    if amount <= 0 {
        return Err(EngineError::NonPositiveAmount { amount });
    }
    let mut conn = store.lock();
    let tx = conn.transaction()?;
    let entry = adjust_balance(&tx, account_id, amount, reason, metadata)?;
    tx.commit()?;
    Ok(entry)
}

/// Debits `amount` cents in its own transaction.
///
/// # Errors
///
/// Returns [`EngineError::NonPositiveAmount`] for a non-positive amount,
/// plus the errors of [`adjust_balance`] (notably
/// [`EngineError::InsufficientFunds`]).
pub fn debit(
    store: &Store,
    account_id: i64,
    amount: Cents,
    reason: &str,
    metadata: &Metadata,
) -> Result<LedgerEntry, EngineError> {
    if amount <= 0 {
        return Err(EngineError::NonPositiveAmount { amount });
    }
    let mut conn = store.lock();
    let tx = conn.transaction()?;
    let entry = adjust_balance(&tx, account_id, -amount, reason, metadata)?;
    tx.commit()?;
    Ok(entry)
}

/// Lists an account's ledger entries, newest first.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn list_entries(
    conn: &Connection,
    account_id: i64,
    limit: u32,
) -> Result<Vec<LedgerEntry>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, delta_cents, reason, metadata, created_at_ms
         FROM ledger_entries WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![account_id, limit], |row| {
        Ok(LedgerEntry {
            id: row.get(0)?,
            account_id: row.get(1)?,
            delta_cents: row.get(2)?,
            reason: row.get(3)?,
            metadata: Metadata::from_json(&row.get::<_, String>(4)?),
            created_at_ms: row.get(5)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Sum of all entry deltas for an account, for invariant checks.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn entry_sum(conn: &Connection, account_id: i64) -> Result<Cents, EngineError> {
    let sum: Cents = conn.query_row(
        "SELECT COALESCE(SUM(delta_cents), 0) FROM ledger_entries WHERE account_id = ?1",
        params![account_id],
        |row| row.get(0),
    )?;
    Ok(sum)
}
