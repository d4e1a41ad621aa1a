//! Lottery rounds: the audit record of every draw, plus the draws fired
//! directly by telemetry events — global activity-weighted draws and
//! per-session giveaway draws.
//!
//! Every draw the engine performs — campaign settlement, global telemetry
//! trigger, session giveaway — persists one round row recording the trigger,
//! the winner, and the prize. Global draws select among recently active
//! viewers weighted by activity score plus lifetime contributions.

use dropforge_core::{weighted_draw, Cents, EventKind, Metadata, RandomSource, WeightEntry};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::campaign::RewardKind;
use crate::error::EngineError;
use crate::ledger;
use crate::session::{self, GiveawayRule};
use crate::store::now_ms;

/// Trigger kind recorded for campaign settlement draws.
pub const TRIGGER_CROWDFUNDING: &str = "crowdfunding";
/// Trigger kind prefix recorded for session giveaway draws.
pub const TRIGGER_GIVEAWAY: &str = "giveaway";

/// Divisor converting lifetime contribution cents into draw weight.
const CONTRIBUTION_WEIGHT_DIVISOR: i64 = 100;

/// One completed draw.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    /// Round id.
    pub id: i64,
    /// What fired the draw (`crowdfunding`, `giveaway`, or an event kind).
    pub trigger_kind: String,
    /// The game event that fired it, if any.
    pub trigger_event_id: Option<i64>,
    /// The settled campaign, for crowdfunding rounds.
    pub campaign_id: Option<i64>,
    /// The session, for giveaway rounds.
    pub session_id: Option<i64>,
    /// The winning account.
    pub winner_id: Option<i64>,
    /// Cash prize in cents; zero for item prizes.
    pub prize_cents: Cents,
    /// Draw context (reward name, candidate count, ...).
    pub details: Value,
    /// Draw time in epoch milliseconds.
    pub created_at_ms: i64,
}

/// Fields for a round about to be recorded.
#[derive(Debug, Clone)]
pub struct NewRound<'a> {
    /// What fired the draw.
    pub trigger_kind: &'a str,
    /// The game event that fired it, if any.
    pub trigger_event_id: Option<i64>,
    /// The settled campaign, for crowdfunding rounds.
    pub campaign_id: Option<i64>,
    /// The session, for giveaway rounds.
    pub session_id: Option<i64>,
    /// The winning account.
    pub winner_id: Option<i64>,
    /// Cash prize in cents; zero for item prizes.
    pub prize_cents: Cents,
    /// Draw context.
    pub details: Value,
}

/// Records a round inside the caller's transaction.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn insert_round(tx: &Transaction<'_>, round: NewRound<'_>) -> Result<Round, EngineError> {
    let created_at_ms = now_ms();
    tx.execute(
        "INSERT INTO lottery_rounds
             (trigger_kind, trigger_event_id, campaign_id, session_id, winner_id, prize_cents,
              details, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            round.trigger_kind,
            round.trigger_event_id,
            round.campaign_id,
            round.session_id,
            round.winner_id,
            round.prize_cents,
            round.details.to_string(),
            created_at_ms
        ],
    )?;
    Ok(Round {
        id: tx.last_insert_rowid(),
        trigger_kind: round.trigger_kind.to_string(),
        trigger_event_id: round.trigger_event_id,
        campaign_id: round.campaign_id,
        session_id: round.session_id,
        winner_id: round.winner_id,
        prize_cents: round.prize_cents,
        details: round.details,
        created_at_ms,
    })
}

/// Bumps an account's activity score. The score feeds global draw weights
/// and decays only by falling out of the recency window.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn record_activity(
    conn: &Connection,
    account_id: i64,
    delta: i64,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT INTO viewer_activity (account_id, score, updated_at_ms) VALUES (?1, ?2, ?3)
         ON CONFLICT (account_id)
         DO UPDATE SET score = score + excluded.score, updated_at_ms = excluded.updated_at_ms",
        params![account_id, delta, now_ms()],
    )?;
    Ok(())
}

/// Candidate set for a global draw: accounts active since `cutoff_ms`,
/// weighted by `max(1, score + lifetime_contributions / 100)`.
///
/// The floor of 1 keeps newly active viewers in the draw even before any
/// score or contribution accrues.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn global_candidates(
    conn: &Connection,
    cutoff_ms: i64,
) -> Result<Vec<WeightEntry<i64>>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT a.account_id, a.score,
                COALESCE((SELECT SUM(c.amount_cents) FROM contributions c
                          WHERE c.account_id = a.account_id), 0)
         FROM viewer_activity a
         WHERE a.updated_at_ms >= ?1
         ORDER BY a.account_id",
    )?;
    let rows = stmt.query_map(params![cutoff_ms], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut candidates = Vec::new();
    for row in rows {
        let (account_id, score, contributed) = row?;
        let weight = (score + contributed / CONTRIBUTION_WEIGHT_DIVISOR).max(1);
        candidates.push(WeightEntry::new(account_id, weight));
    }
    Ok(candidates)
}

/// Runs a global draw for a telemetry trigger, crediting the winner's
/// balance and recording the round, all inside the caller's transaction.
///
/// Returns `Ok(None)` when no viewer is in the recency window; a trigger
/// with nobody to win is not an error.
///
/// # Errors
///
/// Returns a database error or draw failure.
pub fn trigger_global(
    tx: &Transaction<'_>,
    kind: EventKind,
    trigger_event_id: i64,
    prize_cents: Cents,
    cutoff_ms: i64,
    rng: &dyn RandomSource,
) -> Result<Option<Round>, EngineError> {
    let candidates = global_candidates(tx, cutoff_ms)?;
    let Some(&winner_id) = weighted_draw(&candidates, rng)? else {
        return Ok(None);
    };

    let meta = Metadata::new()
        .with("trigger", kind.as_str())
        .with("round_trigger_event_id", trigger_event_id);
    ledger::adjust_balance(tx, winner_id, prize_cents, ledger::REASON_LOTTERY_REWARD, &meta)?;

    let round = insert_round(
        tx,
        NewRound {
            trigger_kind: kind.as_str(),
            trigger_event_id: Some(trigger_event_id),
            campaign_id: None,
            session_id: None,
            winner_id: Some(winner_id),
            prize_cents,
            details: json!({
                "candidates": candidates.len(),
                "prize": "cash",
            }),
        },
    )?;
    info!(round_id = round.id, winner_id, trigger = kind.as_str(), "global draw settled");
    Ok(Some(round))
}

/// Runs a giveaway draw over the rule's session participants, each with
/// equal weight, recording the round inside the caller's transaction.
///
/// Cash prizes are credited here; item prizes are granted by the caller
/// after commit. No participants means no draw.
///
/// # Errors
///
/// Returns a database error or draw failure.
pub fn trigger_for_participants(
    tx: &Transaction<'_>,
    rule: &GiveawayRule,
    trigger_event_id: i64,
    rng: &dyn RandomSource,
) -> Result<Option<Round>, EngineError> {
    let participants = session::participants(tx, rule.session_id)?;
    let weights: Vec<WeightEntry<i64>> = participants
        .into_iter()
        .map(|id| WeightEntry::new(id, 1))
        .collect();
    let Some(&winner_id) = weighted_draw(&weights, rng)? else {
        debug!(rule_id = rule.id, "giveaway trigger with no participants");
        return Ok(None);
    };

    let prize_cents = if rule.prize_kind == RewardKind::Cash {
        let meta = Metadata::new()
            .with("rule_id", rule.id)
            .with("session_id", rule.session_id)
            .with("trigger", rule.trigger_kind.as_str());
        ledger::adjust_balance(
            tx,
            winner_id,
            rule.prize_cents,
            ledger::REASON_GIVEAWAY_REWARD,
            &meta,
        )?;
        rule.prize_cents
    } else {
        0
    };

    let round = insert_round(
        tx,
        NewRound {
            trigger_kind: TRIGGER_GIVEAWAY,
            trigger_event_id: Some(trigger_event_id),
            campaign_id: None,
            session_id: Some(rule.session_id),
            winner_id: Some(winner_id),
            prize_cents,
            details: json!({
                "rule_id": rule.id,
                "trigger": rule.trigger_kind.as_str(),
                "prize_kind": rule.prize_kind.as_str(),
                "prize_name": rule.prize_name,
            }),
        },
    )?;
    info!(round_id = round.id, winner_id, rule_id = rule.id, "giveaway settled");
    Ok(Some(round))
}

/// The settlement round for a campaign, if one exists.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn campaign_round(
    conn: &Connection,
    campaign_id: i64,
) -> Result<Option<Round>, EngineError> {
    conn.query_row(
        "SELECT id, trigger_kind, trigger_event_id, campaign_id, session_id, winner_id,
                prize_cents, details, created_at_ms
         FROM lottery_rounds WHERE campaign_id = ?1 ORDER BY id LIMIT 1",
        params![campaign_id],
        row_to_round,
    )
    .optional()
    .map_err(Into::into)
}

/// Lists recent rounds, newest first.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn list_rounds(conn: &Connection, limit: u32) -> Result<Vec<Round>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, trigger_kind, trigger_event_id, campaign_id, session_id, winner_id,
                prize_cents, details, created_at_ms
         FROM lottery_rounds ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], row_to_round)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn row_to_round(row: &rusqlite::Row<'_>) -> rusqlite::Result<Round> {
    let details_raw: String = row.get(7)?;
    Ok(Round {
        id: row.get(0)?,
        trigger_kind: row.get(1)?,
        trigger_event_id: row.get(2)?,
        campaign_id: row.get(3)?,
        session_id: row.get(4)?,
        winner_id: row.get(5)?,
        prize_cents: row.get(6)?,
        details: serde_json::from_str(&details_raw).unwrap_or(Value::Null),
        created_at_ms: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use dropforge_core::ScriptedRandom;

    use super::*;
    use crate::ledger::ensure_account;
    use crate::store::Store;

    fn setup(accounts: &[i64]) -> Store {
        let store = Store::in_memory().unwrap();
        for &id in accounts {
            ensure_account(&store.lock(), id, "viewer").unwrap();
        }
        store
    }

    #[test]
    fn test_activity_upsert_accumulates() {
        let store = setup(&[1]);
        let conn = store.lock();
        record_activity(&conn, 1, 2).unwrap();
        record_activity(&conn, 1, 3).unwrap();

        let candidates = global_candidates(&conn, 0).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].weight, 5);
    }

    #[test]
    fn test_candidate_weight_floor_and_contribution_bonus() {
        let store = setup(&[1, 2]);
        let conn = store.lock();
        record_activity(&conn, 1, 0).unwrap();
        record_activity(&conn, 2, 0).unwrap();
        // 250 cents of contributions adds 2 to account 2's weight.
        conn.execute(
            "INSERT INTO campaigns (id, owner_id, title, reward_kind, reward_name, target_cents,
                                    created_at_ms, updated_at_ms)
             VALUES (9, 1, 't', 'cash', '', 1000, 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO contributions (campaign_id, account_id, amount_cents, created_at_ms)
             VALUES (9, 2, 250, 0)",
            [],
        )
        .unwrap();

        let candidates = global_candidates(&conn, 0).unwrap();
        assert_eq!(candidates[0].weight, 1); // zero score floors at 1
        assert_eq!(candidates[1].weight, 2);
    }

    #[test]
    fn test_recency_window_excludes_stale_viewers() {
        let store = setup(&[1]);
        let conn = store.lock();
        record_activity(&conn, 1, 5).unwrap();

        let future_cutoff = now_ms() + 60_000;
        assert!(global_candidates(&conn, future_cutoff).unwrap().is_empty());
    }

    #[test]
    fn test_trigger_global_credits_winner_and_records_round() {
        let store = setup(&[1]);
        let mut conn = store.lock();
        record_activity(&conn, 1, 1).unwrap();
        conn.execute(
            "INSERT INTO game_events (id, source, event_type, payload, created_at_ms)
             VALUES (77, 'telemetry', 'ace', '{}', 0)",
            [],
        )
        .unwrap();

        let tx = conn.transaction().unwrap();
        let round = trigger_global(&tx, EventKind::Ace, 77, 100, 0, &ScriptedRandom::new([0]))
            .unwrap()
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(round.winner_id, Some(1));
        assert_eq!(round.prize_cents, 100);
        assert_eq!(round.trigger_event_id, Some(77));
        assert_eq!(ledger::get_balance(&conn, 1).unwrap(), 100);

        let listed = list_rounds(&conn, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].trigger_kind, "ace");
    }

    #[test]
    fn test_trigger_for_participants_pays_equal_odds_winner() {
        let store = setup(&[1, 2, 3]);
        let s = session::start_session(&store, 1, "stream", &dropforge_core::OsRandom).unwrap();
        session::join_by_invite(&store, 2, &s.invite_code).unwrap();
        session::join_by_invite(&store, 3, &s.invite_code).unwrap();
        session::add_rule(&store, 1, s.id, EventKind::RoundWin, RewardKind::Cash, "", 500)
            .unwrap();

        let mut conn = store.lock();
        conn.execute(
            "INSERT INTO game_events (id, source, event_type, payload, created_at_ms)
             VALUES (5, 'telemetry', 'round_win', '{}', 0)",
            [],
        )
        .unwrap();
        let tx = conn.transaction().unwrap();
        let rules = session::rules_for_trigger(&tx, 1, EventKind::RoundWin).unwrap();
        // Equal weights; r = 1 lands on the second joiner.
        let round = trigger_for_participants(&tx, &rules[0], 5, &ScriptedRandom::new([1]))
            .unwrap()
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(round.trigger_kind, TRIGGER_GIVEAWAY);
        assert_eq!(round.session_id, Some(s.id));
        assert_eq!(round.winner_id, Some(3));
        assert_eq!(round.prize_cents, 500);
        assert_eq!(ledger::get_balance(&conn, 3).unwrap(), 500);
    }

    #[test]
    fn test_trigger_global_without_candidates_is_no_draw() {
        let store = setup(&[1]);
        let mut conn = store.lock();
        let tx = conn.transaction().unwrap();
        let round =
            trigger_global(&tx, EventKind::Headshot, 1, 100, 0, &ScriptedRandom::new([0]))
                .unwrap();
        assert!(round.is_none());
    }
}
