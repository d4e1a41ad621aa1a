//! Live sessions, invite-code membership, and per-session giveaway rules.
//!
//! A session scopes participation: viewers join through an invite code, and
//! session-bound campaigns only accept contributions from participants.
//! Giveaway rules map a telemetry event kind to a prize handed to a random
//! participant when that event fires during the session.

use dropforge_core::{EventKind, RandomSource};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::info;

use crate::campaign::RewardKind;
use crate::error::EngineError;
use crate::store::{now_ms, Store};

/// Characters used in invite codes. Excludes ambiguous glyphs (I, O, 0, 1).
const INVITE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Invite code length.
const INVITE_CODE_LEN: usize = 12;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Accepting joins, contributions, and giveaway triggers.
    Active,
    /// Ended; read-only.
    Ended,
}

impl SessionStatus {
    /// Canonical storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "ended" => Self::Ended,
            _ => Self::Active,
        }
    }
}

/// A live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session id.
    pub id: i64,
    /// The account that started the session.
    pub owner_id: i64,
    /// Title shown to viewers.
    pub title: String,
    /// Join code.
    pub invite_code: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Start time in epoch milliseconds.
    pub created_at_ms: i64,
    /// End time, if ended.
    pub ended_at_ms: Option<i64>,
}

/// One giveaway rule: when `trigger_kind` fires during the session, hand
/// the configured prize to a random participant.
#[derive(Debug, Clone, PartialEq)]
pub struct GiveawayRule {
    /// Rule id.
    pub id: i64,
    /// The session this rule belongs to.
    pub session_id: i64,
    /// The event kind that fires this rule.
    pub trigger_kind: EventKind,
    /// What the prize is.
    pub prize_kind: RewardKind,
    /// Prize item name; empty for cash prizes.
    pub prize_name: String,
    /// Prize amount in cents; zero for item prizes.
    pub prize_cents: i64,
    /// Disabled rules are kept but never fire.
    pub enabled: bool,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
}

/// Generates a fresh invite code from the session alphabet.
///
/// # Errors
///
/// Returns an error if the random source fails.
pub fn generate_invite_code(rng: &dyn RandomSource) -> Result<String, EngineError> {
    let mut code = String::with_capacity(INVITE_CODE_LEN);
    for _ in 0..INVITE_CODE_LEN {
        let idx = rng.next_below(INVITE_ALPHABET.len() as u64)?;
        code.push(char::from(INVITE_ALPHABET[idx as usize]));
    }
    Ok(code)
}

/// Starts a session owned by `owner_id`.
///
/// # Errors
///
/// Returns [`EngineError::EmptyTitle`] for a blank title and
/// [`EngineError::AccountNotFound`] for an unknown owner.
pub fn start_session(
    store: &Store,
    owner_id: i64,
    title: &str,
    rng: &dyn RandomSource,
) -> Result<Session, EngineError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(EngineError::EmptyTitle);
    }

    let conn = store.lock();
    crate::ledger::get_account(&conn, owner_id)?;

    // The UNIQUE constraint on invite_code closes the race between
    // generation and insert; collisions on a 60-bit code are retried.
    let created_at_ms = now_ms();
    loop {
        let invite_code = generate_invite_code(rng)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sessions (owner_id, title, invite_code, status, created_at_ms)
             VALUES (?1, ?2, ?3, 'active', ?4)",
            params![owner_id, title, invite_code, created_at_ms],
        )?;
        if inserted == 1 {
            let id = conn.last_insert_rowid();
            info!(session_id = id, owner_id, "session started");
            return Ok(Session {
                id,
                owner_id,
                title: title.to_string(),
                invite_code,
                status: SessionStatus::Active,
                created_at_ms,
                ended_at_ms: None,
            });
        }
    }
}

/// Loads a session by id.
///
/// # Errors
///
/// Returns [`EngineError::SessionNotFound`] if the session does not exist.
pub fn get_session(conn: &Connection, session_id: i64) -> Result<Session, EngineError> {
    query_session(
        conn,
        "SELECT id, owner_id, title, invite_code, status, created_at_ms, ended_at_ms
         FROM sessions WHERE id = ?1",
        params![session_id],
    )?
    .ok_or_else(|| EngineError::SessionNotFound {
        reference: session_id.to_string(),
    })
}

/// Loads a session by invite code.
///
/// # Errors
///
/// Returns [`EngineError::SessionNotFound`] if no session has this code.
pub fn find_by_invite(conn: &Connection, invite_code: &str) -> Result<Session, EngineError> {
    let code = invite_code.trim().to_ascii_uppercase();
    query_session(
        conn,
        "SELECT id, owner_id, title, invite_code, status, created_at_ms, ended_at_ms
         FROM sessions WHERE invite_code = ?1",
        params![code],
    )?
    .ok_or(EngineError::SessionNotFound { reference: code })
}

fn query_session(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Option<Session>, EngineError> {
    conn.query_row(sql, args, |row| {
        Ok(Session {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            invite_code: row.get(3)?,
            status: SessionStatus::parse(&row.get::<_, String>(4)?),
            created_at_ms: row.get(5)?,
            ended_at_ms: row.get(6)?,
        })
    })
    .optional()
    .map_err(Into::into)
}

/// Ends a session. Only the owner may end it; ending twice is a conflict.
///
/// # Errors
///
/// Returns [`EngineError::NotSessionOwner`] for a non-owner caller and
/// [`EngineError::SessionNotActive`] if the session already ended.
pub fn end_session(store: &Store, owner_id: i64, session_id: i64) -> Result<(), EngineError> {
    let conn = store.lock();
    let session = get_session(&conn, session_id)?;
    if session.owner_id != owner_id {
        return Err(EngineError::NotSessionOwner {
            account_id: owner_id,
            session_id,
        });
    }
    if session.status != SessionStatus::Active {
        return Err(EngineError::SessionNotActive { session_id });
    }

    conn.execute(
        "UPDATE sessions SET status = 'ended', ended_at_ms = ?2 WHERE id = ?1",
        params![session_id, now_ms()],
    )?;
    info!(session_id, "session ended");
    Ok(())
}

/// Joins the session identified by `invite_code`. The first join also
/// scores one activity point for the joiner; joining twice is a no-op.
///
/// # Errors
///
/// Returns [`EngineError::SessionNotFound`] for an unknown code,
/// [`EngineError::SessionNotActive`] for an ended session, and
/// [`EngineError::AccountNotFound`] for an unknown account.
pub fn join_by_invite(
    store: &Store,
    account_id: i64,
    invite_code: &str,
) -> Result<Session, EngineError> {
    let conn = store.lock();
    crate::ledger::get_account(&conn, account_id)?;

    let session = find_by_invite(&conn, invite_code)?;
    if session.status != SessionStatus::Active {
        return Err(EngineError::SessionNotActive {
            session_id: session.id,
        });
    }

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO session_participants (session_id, account_id, joined_at_ms)
         VALUES (?1, ?2, ?3)",
        params![session.id, account_id, now_ms()],
    )?;
    if inserted > 0 {
        // Joining counts as activity; only the first join does.
        crate::lottery::record_activity(&conn, account_id, 1)?;
    }
    Ok(session)
}

/// Returns whether `account_id` has joined the session. The owner always
/// counts as a participant.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn is_participant(
    conn: &Connection,
    session_id: i64,
    account_id: i64,
) -> Result<bool, EngineError> {
    let joined: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM session_participants WHERE session_id = ?1 AND account_id = ?2
             UNION SELECT 1 FROM sessions WHERE id = ?1 AND owner_id = ?2",
            params![session_id, account_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(joined.is_some())
}

/// Lists participant account ids for a session, in join order.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn participants(conn: &Connection, session_id: i64) -> Result<Vec<i64>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT account_id FROM session_participants WHERE session_id = ?1 ORDER BY joined_at_ms",
    )?;
    let rows = stmt.query_map(params![session_id], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Adds a giveaway rule to the caller's session.
///
/// Cash prizes need a positive amount; item prizes need a name.
///
/// # Errors
///
/// Returns [`EngineError::NotSessionOwner`] for a non-owner caller plus the
/// validation errors above.
pub fn add_rule(
    store: &Store,
    owner_id: i64,
    session_id: i64,
    trigger_kind: EventKind,
    prize_kind: RewardKind,
    prize_name: &str,
    prize_cents: i64,
) -> Result<GiveawayRule, EngineError> {
    let prize_name = prize_name.trim();
    match prize_kind {
        RewardKind::Cash if prize_cents <= 0 => {
            return Err(EngineError::NonPositiveAmount {
                amount: prize_cents,
            });
        }
        RewardKind::Case | RewardKind::Skin if prize_name.is_empty() => {
            return Err(EngineError::EmptyItemName);
        }
        _ => {}
    }

    let conn = store.lock();
    let session = get_session(&conn, session_id)?;
    if session.owner_id != owner_id {
        return Err(EngineError::NotSessionOwner {
            account_id: owner_id,
            session_id,
        });
    }

    let created_at_ms = now_ms();
    conn.execute(
        "INSERT INTO giveaway_rules
             (session_id, trigger_kind, prize_kind, prize_name, prize_cents, enabled, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![
            session_id,
            trigger_kind.as_str(),
            prize_kind.as_str(),
            prize_name,
            prize_cents,
            created_at_ms
        ],
    )?;

    Ok(GiveawayRule {
        id: conn.last_insert_rowid(),
        session_id,
        trigger_kind,
        prize_kind,
        prize_name: prize_name.to_string(),
        prize_cents,
        enabled: true,
        created_at_ms,
    })
}

/// Enables or disables a rule. Owner only.
///
/// # Errors
///
/// Returns [`EngineError::RuleNotFound`] for an unknown rule and
/// [`EngineError::NotSessionOwner`] for a non-owner caller.
pub fn set_rule_enabled(
    store: &Store,
    owner_id: i64,
    rule_id: i64,
    enabled: bool,
) -> Result<(), EngineError> {
    let conn = store.lock();
    rule_owner_check(&conn, owner_id, rule_id)?;
    conn.execute(
        "UPDATE giveaway_rules SET enabled = ?2 WHERE id = ?1",
        params![rule_id, i64::from(enabled)],
    )?;
    Ok(())
}

/// Deletes a rule. Owner only.
///
/// # Errors
///
/// Returns [`EngineError::RuleNotFound`] for an unknown rule and
/// [`EngineError::NotSessionOwner`] for a non-owner caller.
pub fn delete_rule(store: &Store, owner_id: i64, rule_id: i64) -> Result<(), EngineError> {
    let conn = store.lock();
    rule_owner_check(&conn, owner_id, rule_id)?;
    conn.execute("DELETE FROM giveaway_rules WHERE id = ?1", params![rule_id])?;
    Ok(())
}

fn rule_owner_check(conn: &Connection, owner_id: i64, rule_id: i64) -> Result<(), EngineError> {
    let session_owner: Option<(i64, i64)> = conn
        .query_row(
            "SELECT r.session_id, s.owner_id FROM giveaway_rules r
             JOIN sessions s ON s.id = r.session_id WHERE r.id = ?1",
            params![rule_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (session_id, session_owner) =
        session_owner.ok_or(EngineError::RuleNotFound { rule_id })?;
    if session_owner != owner_id {
        return Err(EngineError::NotSessionOwner {
            account_id: owner_id,
            session_id,
        });
    }
    Ok(())
}

/// Lists all rules for a session, enabled or not.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn list_rules(conn: &Connection, session_id: i64) -> Result<Vec<GiveawayRule>, EngineError> {
    load_rules(
        conn,
        "SELECT id, session_id, trigger_kind, prize_kind, prize_name, prize_cents, enabled,
                created_at_ms
         FROM giveaway_rules WHERE session_id = ?1 ORDER BY id",
        params![session_id],
    )
}

/// Enabled rules matching a trigger kind in the submitting streamer's
/// active sessions. Used by telemetry ingestion inside its transaction.
///
/// Rules belong to the streamer whose telemetry fires them; other
/// streamers' sessions are never touched.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn rules_for_trigger(
    tx: &Transaction<'_>,
    streamer_id: i64,
    kind: EventKind,
) -> Result<Vec<GiveawayRule>, EngineError> {
    load_rules(
        tx,
        "SELECT r.id, r.session_id, r.trigger_kind, r.prize_kind, r.prize_name, r.prize_cents,
                r.enabled, r.created_at_ms
         FROM giveaway_rules r
         JOIN sessions s ON s.id = r.session_id
         WHERE r.trigger_kind = ?1 AND r.enabled = 1 AND s.status = 'active'
           AND s.owner_id = ?2
         ORDER BY r.id",
        params![kind.as_str(), streamer_id],
    )
}

fn load_rules(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<GiveawayRule>, EngineError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, i64>(7)?,
        ))
    })?;

    let mut rules = Vec::new();
    for row in rows {
        let (id, session_id, trigger, prize, prize_name, prize_cents, enabled, created_at_ms) =
            row?;
        let trigger_kind = EventKind::parse(&trigger)
            .ok_or_else(|| EngineError::InvalidRewardKind { kind: trigger })?;
        let prize_kind = RewardKind::parse(&prize)?;
        rules.push(GiveawayRule {
            id,
            session_id,
            trigger_kind,
            prize_kind,
            prize_name,
            prize_cents,
            enabled: enabled != 0,
            created_at_ms,
        });
    }
    Ok(rules)
}
