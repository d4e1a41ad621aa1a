//! Layered price resolution for items.
//!
//! Resolution order: TTL cache, static table of known high-value names,
//! external market lookup with a short timeout, rarity-tier fallback.
//! Fallback results are cached too, so a flapping market source does not
//! trigger repeated external calls within the TTL.
//!
//! External lookup failures are absorbed here and degrade to fallback
//! pricing; they are never surfaced to the caller. A case opening must not
//! fail because a price service is down.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::loot::Rarity;
use crate::Cents;

/// External market price lookup. May fail transiently; implementations
/// bound their own wait to the supplied timeout.
pub trait MarketPriceSource: Send + Sync {
    /// Returns the current market price for `name` in cents, or `None` if
    /// the price is unavailable within `timeout`.
    fn lookup(&self, name: &str, timeout: Duration) -> Option<Cents>;
}

/// Market source that never answers. Used where no market integration is
/// configured; resolution falls through to static and rarity pricing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMarket;

impl MarketPriceSource for NoMarket {
    fn lookup(&self, _name: &str, _timeout: Duration) -> Option<Cents> {
        None
    }
}

struct CachedPrice {
    cents: Cents,
    expires_at: Instant,
}

/// Shared price cache keyed by normalized `kind|name`, with TTL expiry.
///
/// An explicit component guarded by a read/write lock, owned by the
/// resolver — never a global.
pub struct PriceCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedPrice>>,
}

impl PriceCache {
    /// Creates a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<Cents> {
        let entries = self.entries.read().unwrap();
        let cached = entries.get(key)?;
        (Instant::now() < cached.expires_at).then_some(cached.cents)
    }

    fn put(&self, key: String, cents: Cents) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            CachedPrice {
                cents,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

/// Resolves item prices through the cache / static / market / fallback
/// chain. The resolved price is always non-negative.
pub struct PriceResolver {
    cache: PriceCache,
    market: Box<dyn MarketPriceSource>,
    market_timeout: Duration,
}

impl PriceResolver {
    /// Creates a resolver over the given market source.
    #[must_use]
    pub fn new(market: Box<dyn MarketPriceSource>, ttl: Duration, market_timeout: Duration) -> Self {
        Self {
            cache: PriceCache::new(ttl),
            market,
            market_timeout,
        }
    }

    /// Resolver with no market integration and default timings.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(
            Box::new(NoMarket),
            Duration::from_secs(600),
            Duration::from_millis(3500),
        )
    }

    /// Resolves the price of an item in cents.
    ///
    /// Never fails: market errors degrade to the rarity fallback table, and
    /// the worst case is the generic per-kind floor price.
    #[must_use]
    pub fn resolve(&self, kind: &str, name: &str, rarity: &str) -> Cents {
        let key = cache_key(kind, name);
        if key == "|" {
            return fallback_by_rarity(rarity, kind);
        }

        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        if let Some(price) = static_known_price(name) {
            self.cache.put(key, price);
            return price;
        }

        if let Some(price) = self.market.lookup(name.trim(), self.market_timeout) {
            if price > 0 {
                self.cache.put(key, price);
                return price;
            }
        }

        let fallback = fallback_by_rarity(rarity, kind);
        debug!(name, rarity, fallback, "market price unavailable, using rarity fallback");
        if fallback > 0 {
            self.cache.put(key, fallback);
        }
        fallback
    }
}

fn cache_key(kind: &str, name: &str) -> String {
    format!("{}|{}", kind.trim(), name.trim()).to_ascii_lowercase()
}

/// Static table of known names. Covers the built-in drop pools and the
/// common case descriptors so the engine prices sensibly offline.
#[must_use]
pub fn static_known_price(name: &str) -> Option<Cents> {
    let cents = match name.trim().to_ascii_lowercase().as_str() {
        "revolution case" => 55,
        "kilowatt case" => 95,
        "knife fever case" => 1250,
        "dreams & nightmares case" => 140,
        "awp | wildfire" => 5200,
        "m4a1-s | cyrex" => 2100,
        "ak-47 | slate" => 1200,
        "karambit | doppler" => 150_000,
        "m9 bayonet | fade" => 130_000,
        "butterfly knife | slaughter" => 175_000,
        "ump-45 | briefing" => 180,
        "mp9 | storm" => 80,
        "p250 | sand dune" => 25,
        _ => return None,
    };
    Some(cents)
}

/// Last-resort price by rarity tier, with a per-kind floor for unknown
/// rarities.
#[must_use]
pub fn fallback_by_rarity(rarity: &str, kind: &str) -> Cents {
    match Rarity::parse(rarity) {
        Some(Rarity::Consumer) => 25,
        Some(Rarity::Industrial) => 75,
        Some(Rarity::MilSpec) => 220,
        Some(Rarity::Restricted) => 850,
        Some(Rarity::Classified) => 2200,
        Some(Rarity::Covert) => 6200,
        Some(Rarity::Gold) => 120_000,
        None => {
            if kind.trim().eq_ignore_ascii_case("case") {
                120
            } else {
                150
            }
        }
    }
}
