//! Telemetry packet hashing and semantic event derivation.
//!
//! Raw packets are structured key/value documents with nested player and
//! round state, consumed as data. [`packet_hash`] gives the content hash
//! used as the idempotency key; [`derive_events`] applies the declarative
//! rule set that turns one packet into zero or more semantic game events.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Semantic game event kinds derivable from telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// One or more kills this round.
    Kill,
    /// One or more headshot kills this round.
    Headshot,
    /// Five or more kills this round.
    Ace,
    /// Player health hit zero.
    Death,
    /// Round phase reached "over".
    RoundWin,
    /// Bomb state reached "planted".
    BombPlant,
    /// No specific rule matched; generic state snapshot.
    GameState,
}

impl EventKind {
    /// Canonical snake_case name used in storage and trigger matching.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kill => "kill",
            Self::Headshot => "headshot",
            Self::Ace => "ace",
            Self::Death => "death",
            Self::RoundWin => "round_win",
            Self::BombPlant => "bomb_plant",
            Self::GameState => "game_state",
        }
    }

    /// Parses a kind from its canonical name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kill" => Some(Self::Kill),
            "headshot" => Some(Self::Headshot),
            "ace" => Some(Self::Ace),
            "death" => Some(Self::Death),
            "round_win" => Some(Self::RoundWin),
            "bomb_plant" => Some(Self::BombPlant),
            "game_state" => Some(Self::GameState),
            _ => None,
        }
    }

    /// Whether this kind fires a global lottery round on its own, without
    /// any session giveaway rule.
    #[must_use]
    pub const fn triggers_global_lottery(self) -> bool {
        matches!(self, Self::Ace | Self::Headshot | Self::BombPlant)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event derived from one telemetry packet.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedEvent {
    /// The event kind.
    pub kind: EventKind,
    /// Rule-specific detail fields (the matched values).
    pub detail: Value,
}

/// Content hash of a raw packet: lowercase hex SHA-256 over the serialized
/// JSON bytes.
///
/// Identical content (including any embedded uniqueness nonce) always
/// hashes identically, which is what makes the dedup barrier work.
#[must_use]
pub fn packet_hash(packet: &Value) -> String {
    let bytes = serde_json::to_vec(packet).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

/// Derives semantic events from a packet's structured fields.
///
/// Rules, applied independently (a single packet can match several):
/// - kill: `player.state.round_kills > 0`
/// - headshot: `player.state.round_killhs > 0`
/// - ace: `player.state.round_kills >= 5`
/// - death: `player.state.health == 0`
/// - round_win: `round.phase == "over"`
/// - bomb_plant: `round.bomb == "planted"`
///
/// If nothing matches, a single generic `game_state` event is emitted so
/// every accepted packet leaves a trace.
#[must_use]
pub fn derive_events(packet: &Value) -> Vec<DerivedEvent> {
    let mut events = Vec::new();

    if let Some(state) = packet.pointer("/player/state") {
        let round_kills = as_i64(state.get("round_kills"));
        let round_headshots = as_i64(state.get("round_killhs"));

        if round_kills > 0 {
            events.push(DerivedEvent {
                kind: EventKind::Kill,
                detail: json!({ "round_kills": round_kills }),
            });
        }
        if round_headshots > 0 {
            events.push(DerivedEvent {
                kind: EventKind::Headshot,
                detail: json!({ "round_killhs": round_headshots }),
            });
        }
        if round_kills >= 5 {
            events.push(DerivedEvent {
                kind: EventKind::Ace,
                detail: json!({ "round_kills": round_kills }),
            });
        }
        if state.get("health").is_some() && as_i64(state.get("health")) == 0 {
            events.push(DerivedEvent {
                kind: EventKind::Death,
                detail: json!({ "health": 0 }),
            });
        }
    }

    if let Some(round) = packet.get("round") {
        if as_lower(round.get("phase")) == "over" {
            events.push(DerivedEvent {
                kind: EventKind::RoundWin,
                detail: json!({ "phase": "over" }),
            });
        }
        if as_lower(round.get("bomb")) == "planted" {
            events.push(DerivedEvent {
                kind: EventKind::BombPlant,
                detail: json!({ "bomb": "planted" }),
            });
        }
    }

    if events.is_empty() {
        events.push(DerivedEvent {
            kind: EventKind::GameState,
            detail: json!({}),
        });
    }

    events
}

#[allow(clippy::cast_possible_truncation)]
fn as_i64(value: Option<&Value>) -> i64 {
    let Some(Value::Number(n)) = value else {
        return 0;
    };
    if let Some(i) = n.as_i64() {
        return i;
    }
    n.as_f64().map(|f| f as i64).unwrap_or(0)
}

fn as_lower(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase()
}
