//! Weighted drop pools for case openings.
//!
//! A [`LootTable`] is a named, ordered set of `(descriptor, weight)` entries.
//! Two built-in pools exist: the standard pool and a premium pool with
//! better odds for expensive tiers, selected when the case descriptor
//! carries a premium/knife marker.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::draw::{weighted_draw, DrawError, RandomSource, WeightEntry};

/// Rarity tier of an item, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rarity {
    /// Consumer grade (white).
    Consumer,
    /// Industrial grade (light blue).
    Industrial,
    /// Mil-spec (blue).
    MilSpec,
    /// Restricted (purple).
    Restricted,
    /// Classified (pink).
    Classified,
    /// Covert (red).
    Covert,
    /// Gold tier: knives and other exceedingly rare drops.
    Gold,
}

impl Rarity {
    /// Canonical lowercase name used in storage and metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Consumer => "consumer",
            Self::Industrial => "industrial",
            Self::MilSpec => "mil-spec",
            Self::Restricted => "restricted",
            Self::Classified => "classified",
            Self::Covert => "covert",
            Self::Gold => "gold",
        }
    }

    /// Parses a rarity from its canonical name. Accepts the legacy
    /// `milspec` spelling and `extraordinary` as an alias for covert.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "consumer" => Some(Self::Consumer),
            "industrial" => Some(Self::Industrial),
            "mil-spec" | "milspec" => Some(Self::MilSpec),
            "restricted" => Some(Self::Restricted),
            "classified" => Some(Self::Classified),
            "covert" | "extraordinary" => Some(Self::Covert),
            "gold" => Some(Self::Gold),
            _ => None,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One possible drop outcome: an item descriptor plus its draw weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LootEntry {
    /// Market name of the item.
    pub name: &'static str,
    /// Rarity tier of the item.
    pub rarity: Rarity,
    /// Draw weight within the pool.
    pub weight: i64,
}

/// A named, ordered set of drop outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LootTable {
    /// Pool name, recorded in drop provenance metadata.
    pub name: &'static str,
    /// Ordered entries; order is part of the table identity but does not
    /// affect selection probability.
    pub entries: Vec<LootEntry>,
}

impl LootTable {
    /// Draws one entry with probability proportional to its weight.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::InvalidWeights`] if the pool's total weight is
    /// not positive, or a random-source error.
    pub fn draw(&self, rng: &dyn RandomSource) -> Result<&LootEntry, DrawError> {
        let weights: Vec<WeightEntry<usize>> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| WeightEntry::new(i, e.weight))
            .collect();

        match weighted_draw(&weights, rng)? {
            Some(&index) => Ok(&self.entries[index]),
            // A built-in pool is never empty; treat as invalid rather than
            // panic if a caller constructs one.
            None => Err(DrawError::InvalidWeights { total: 0 }),
        }
    }
}

/// The standard drop pool.
pub fn standard_pool() -> &'static LootTable {
    static POOL: OnceLock<LootTable> = OnceLock::new();
    POOL.get_or_init(|| LootTable {
        name: "standard",
        entries: vec![
            entry("P250 | Sand Dune", Rarity::Consumer, 35),
            entry("MP9 | Storm", Rarity::Industrial, 25),
            entry("UMP-45 | Briefing", Rarity::MilSpec, 18),
            entry("AK-47 | Slate", Rarity::Restricted, 12),
            entry("M4A1-S | Cyrex", Rarity::Classified, 7),
            entry("AWP | Wildfire", Rarity::Covert, 3),
        ],
    })
}

/// The premium pool: better chances for expensive tiers versus the standard
/// pool, plus gold-tier knife outcomes.
pub fn premium_pool() -> &'static LootTable {
    static POOL: OnceLock<LootTable> = OnceLock::new();
    POOL.get_or_init(|| LootTable {
        name: "premium",
        entries: vec![
            entry("P250 | Sand Dune", Rarity::Consumer, 18),
            entry("MP9 | Storm", Rarity::Industrial, 16),
            entry("UMP-45 | Briefing", Rarity::MilSpec, 18),
            entry("AK-47 | Slate", Rarity::Restricted, 18),
            entry("M4A1-S | Cyrex", Rarity::Classified, 14),
            entry("AWP | Wildfire", Rarity::Covert, 11),
            entry("Karambit | Doppler", Rarity::Gold, 2),
            entry("M9 Bayonet | Fade", Rarity::Gold, 2),
            entry("Butterfly Knife | Slaughter", Rarity::Gold, 1),
        ],
    })
}

/// Selects the drop pool for a case by its descriptor name.
///
/// Names carrying a knife/premium/omega marker use the premium pool;
/// everything else uses the standard pool.
#[must_use]
pub fn pool_for_case(case_name: &str) -> &'static LootTable {
    let name = case_name.trim().to_ascii_lowercase();
    if name.contains("knife") || name.contains("premium") || name.contains("omega") {
        premium_pool()
    } else {
        standard_pool()
    }
}

const fn entry(name: &'static str, rarity: Rarity, weight: i64) -> LootEntry {
    LootEntry {
        name,
        rarity,
        weight,
    }
}

#[cfg(test)]
mod tests {
    use crate::draw::{OsRandom, ScriptedRandom};

    use super::*;

    #[test]
    fn test_rarity_roundtrip() {
        for rarity in [
            Rarity::Consumer,
            Rarity::Industrial,
            Rarity::MilSpec,
            Rarity::Restricted,
            Rarity::Classified,
            Rarity::Covert,
            Rarity::Gold,
        ] {
            assert_eq!(Rarity::parse(rarity.as_str()), Some(rarity));
        }
        assert_eq!(Rarity::parse("milspec"), Some(Rarity::MilSpec));
        assert_eq!(Rarity::parse("extraordinary"), Some(Rarity::Covert));
        assert_eq!(Rarity::parse("mythical"), None);
    }

    #[test]
    fn test_pool_selection_by_case_name() {
        assert_eq!(pool_for_case("Revolution Case").name, "standard");
        assert_eq!(pool_for_case("Knife Fever Case").name, "premium");
        assert_eq!(pool_for_case("  PREMIUM Omega ").name, "premium");
        assert_eq!(pool_for_case("Dreams & Nightmares Case").name, "standard");
    }

    #[test]
    fn test_draw_returns_pool_member() {
        for _ in 0..64 {
            let drop = standard_pool().draw(&OsRandom).unwrap();
            assert!(standard_pool().entries.iter().any(|e| e == drop));
        }
    }

    #[test]
    fn test_scripted_draw_hits_expected_tiers() {
        // Standard pool total weight = 100; r = 99 lands on the last entry.
        let rng = ScriptedRandom::new([99, 0]);
        let covert = standard_pool().draw(&rng).unwrap();
        assert_eq!(covert.name, "AWP | Wildfire");
        let consumer = standard_pool().draw(&rng).unwrap();
        assert_eq!(consumer.rarity, Rarity::Consumer);
    }

    #[test]
    fn test_premium_pool_carries_gold_tier() {
        assert!(premium_pool()
            .entries
            .iter()
            .any(|e| e.rarity == Rarity::Gold));
        assert!(!standard_pool()
            .entries
            .iter()
            .any(|e| e.rarity == Rarity::Gold));
    }
}
