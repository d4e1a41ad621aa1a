//! Telemetry ingestion: dedup, event derivation, and trigger fan-out.
//!
//! One packet is one transaction. The content hash goes into the dedup
//! table first with `INSERT OR IGNORE`; losing that race means another
//! ingest already owns the packet and this one returns the stored outcome
//! with no further effect. Winners derive semantic events, persist them,
//! bump the sender's activity score, and fan out to global lottery draws
//! and the giveaway rules of the sender's own active sessions. Cash prizes
//! commit with the packet; item prizes come back as pending grants for
//! post-commit dispatch.

use dropforge_core::{derive_events, packet_hash, EngineConfig, EventKind, RandomSource};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::campaign::RewardKind;
use crate::dispatch::PendingGrant;
use crate::error::EngineError;
use crate::inventory::{ItemKind, SOURCE_GIVEAWAY};
use crate::ledger;
use crate::lottery::{self, Round};
use crate::session;
use crate::store::{now_ms, Store};

/// Result of ingesting one packet.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Content hash of the packet.
    pub packet_hash: String,
    /// True when this packet was already processed; the rest of the
    /// outcome is then read back from the first ingest.
    pub deduplicated: bool,
    /// Ids of the persisted game events.
    pub event_ids: Vec<i64>,
    /// Lottery rounds fired by this packet.
    pub rounds: Vec<Round>,
    /// Item prizes awaiting post-commit delivery.
    pub pending_grants: Vec<PendingGrant>,
}

/// Ingests one telemetry packet.
///
/// Repeating a packet with identical content is a no-op returning the
/// original event ids; no balance, round, or event row is written twice.
///
/// # Errors
///
/// Returns a database error or draw failure; either aborts the whole
/// packet, so a later retry starts clean.
pub fn ingest_packet(
    store: &Store,
    config: &EngineConfig,
    account_id: Option<i64>,
    source: &str,
    packet: &Value,
    rng: &dyn RandomSource,
) -> Result<IngestOutcome, EngineError> {
    let hash = packet_hash(packet);

    let mut conn = store.lock();
    let tx = conn.transaction()?;

    // Idempotency barrier. Exactly one ingest per hash gets past this.
    let claimed = tx.execute(
        "INSERT OR IGNORE INTO packet_dedup (packet_hash, account_id, event_ids, created_at_ms)
         VALUES (?1, ?2, '[]', ?3)",
        params![hash, account_id, now_ms()],
    )?;
    if claimed == 0 {
        let stored: Option<String> = tx
            .query_row(
                "SELECT event_ids FROM packet_dedup WHERE packet_hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        let event_ids = stored
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        debug!(packet_hash = hash, "duplicate packet ignored");
        return Ok(IngestOutcome {
            packet_hash: hash,
            deduplicated: true,
            event_ids,
            rounds: Vec::new(),
            pending_grants: Vec::new(),
        });
    }

    let derived = derive_events(packet);
    let mut event_ids = Vec::with_capacity(derived.len());
    let mut fired: Vec<(i64, EventKind)> = Vec::new();
    for event in &derived {
        tx.execute(
            "INSERT INTO game_events (account_id, source, event_type, payload, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                account_id,
                source,
                event.kind.as_str(),
                event.detail.to_string(),
                now_ms()
            ],
        )?;
        let id = tx.last_insert_rowid();
        event_ids.push(id);
        fired.push((id, event.kind));
    }

    tx.execute(
        "UPDATE packet_dedup SET event_ids = ?2 WHERE packet_hash = ?1",
        params![hash, serde_json::to_string(&event_ids).unwrap_or_default()],
    )?;

    if let Some(account_id) = account_id {
        ledger::ensure_account(&tx, account_id, "")?;
        lottery::record_activity(&tx, account_id, event_ids.len() as i64)?;
    }

    let cutoff_ms = now_ms() - config.activity_window_ms();
    let mut rounds = Vec::new();
    let mut pending_grants = Vec::new();

    for &(event_id, kind) in &fired {
        if kind.triggers_global_lottery() {
            if let Some(round) = lottery::trigger_global(
                &tx,
                kind,
                event_id,
                config.global_prize_cents,
                cutoff_ms,
                rng,
            )? {
                rounds.push(round);
            }
        }

        // Session rules are scoped to the sender's own sessions; an
        // anonymous packet has none to fire.
        let Some(streamer_id) = account_id else {
            continue;
        };
        for rule in session::rules_for_trigger(&tx, streamer_id, kind)? {
            let Some(round) = lottery::trigger_for_participants(&tx, &rule, event_id, rng)? else {
                continue;
            };
            if rule.prize_kind != RewardKind::Cash {
                pending_grants.push(PendingGrant {
                    account_id: round.winner_id.unwrap_or_default(),
                    kind: match rule.prize_kind {
                        RewardKind::Case => ItemKind::Case,
                        _ => ItemKind::Skin,
                    },
                    name: rule.prize_name.clone(),
                    source: SOURCE_GIVEAWAY.to_string(),
                    round_id: round.id,
                });
            }
            rounds.push(round);
        }
    }

    tx.commit()?;
    info!(
        packet_hash = hash,
        events = event_ids.len(),
        rounds = rounds.len(),
        "packet ingested"
    );

    Ok(IngestOutcome {
        packet_hash: hash,
        deduplicated: false,
        event_ids,
        rounds,
        pending_grants,
    })
}
