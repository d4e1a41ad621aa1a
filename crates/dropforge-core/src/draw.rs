//! Proportional weighted random selection.
//!
//! Given a set of `(identity, weight)` pairs, [`weighted_draw`] selects one
//! identity with probability `weight / total`. The randomness comes from a
//! [`RandomSource`] so the production path can use the operating system's
//! CSPRNG while tests drive scripted values.
//!
//! The draw is a pure function over its inputs and the random source: it has
//! no side effects and holds no state between calls.

use thiserror::Error;

/// Errors from a weighted draw.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DrawError {
    /// The weight set is non-empty but its total is not positive.
    #[error("invalid weight set: total weight {total} is not positive")]
    InvalidWeights {
        /// The computed total weight.
        total: i64,
    },

    /// The random source failed to produce a value.
    #[error("random source failure: {0}")]
    RandomSource(String),
}

/// A transient `(identity, weight)` pair.
///
/// Weight sets are computed on demand — from contributions, activity scores,
/// or participant lists — and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightEntry<T> {
    /// The candidate identity.
    pub id: T,
    /// The candidate's weight. Must be positive to participate in a draw.
    pub weight: i64,
}

impl<T> WeightEntry<T> {
    /// Creates a new weight entry.
    pub const fn new(id: T, weight: i64) -> Self {
        Self { id, weight }
    }
}

/// Source of uniformly distributed unpredictable integers.
///
/// Implementations must be safe for concurrent use from multiple threads
/// without producing correlated outputs.
pub trait RandomSource: Send + Sync {
    /// Returns a uniformly distributed value in `[0, bound)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying entropy source fails. `bound`
    /// must be non-zero; callers guarantee this.
    fn next_below(&self, bound: u64) -> Result<u64, DrawError>;
}

/// Production random source backed by the operating system CSPRNG.
///
/// `OsRng` pulls from the platform entropy pool on every call, so outputs
/// are unpredictable and uncorrelated across threads. It is not seeded from
/// any observable state.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_below(&self, bound: u64) -> Result<u64, DrawError> {
        use rand::Rng;
        if bound == 0 {
            return Err(DrawError::RandomSource("zero bound".to_string()));
        }
        Ok(rand::rngs::OsRng.gen_range(0..bound))
    }
}

/// Scripted random source for tests: returns the queued values in order,
/// wrapping each into range with a modulo.
#[derive(Debug, Default)]
pub struct ScriptedRandom {
    values: std::sync::Mutex<std::collections::VecDeque<u64>>,
}

impl ScriptedRandom {
    /// Creates a scripted source that yields `values` in order.
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
        Self {
            values: std::sync::Mutex::new(values.into_iter().collect()),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_below(&self, bound: u64) -> Result<u64, DrawError> {
        let mut values = self.values.lock().unwrap();
        let v = values
            .pop_front()
            .ok_or_else(|| DrawError::RandomSource("script exhausted".to_string()))?;
        Ok(v % bound)
    }
}

/// Selects one identity with probability proportional to its weight.
///
/// Returns `Ok(None)` for an empty candidate set — "no draw possible" is a
/// valid outcome, not an error. For a non-empty set the total weight must be
/// positive; entries with non-positive weight make the set invalid.
///
/// The selection draws `r` uniformly from `[0, total)` and walks the list
/// accumulating weights, returning the first identity whose cumulative
/// weight exceeds `r`. No tie-break is needed because weights are summed,
/// not compared.
///
/// # Errors
///
/// Returns [`DrawError::InvalidWeights`] if the non-empty set has a
/// non-positive total, or [`DrawError::RandomSource`] if the source fails.
#[allow(clippy::cast_sign_loss)] // total and per-entry weights checked positive
pub fn weighted_draw<'a, T>(
    entries: &'a [WeightEntry<T>],
    rng: &dyn RandomSource,
) -> Result<Option<&'a T>, DrawError> {
    if entries.is_empty() {
        return Ok(None);
    }

    let total: i64 = entries.iter().map(|e| e.weight).sum();
    if total <= 0 {
        return Err(DrawError::InvalidWeights { total });
    }

    let r = rng.next_below(total as u64)?;

    let mut running: u64 = 0;
    for entry in entries {
        if entry.weight <= 0 {
            continue;
        }
        running += entry.weight as u64;
        if r < running {
            return Ok(Some(&entry.id));
        }
    }

    // Unreachable when r < total, but the accumulation above skips
    // non-positive weights, so fall back to the last candidate.
    Ok(entries.last().map(|e| &e.id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    fn entries(weights: &[(i64, i64)]) -> Vec<WeightEntry<i64>> {
        weights
            .iter()
            .map(|&(id, w)| WeightEntry::new(id, w))
            .collect()
    }

    #[test]
    fn test_empty_set_is_no_draw() {
        let result = weighted_draw::<i64>(&[], &OsRandom).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_single_candidate_always_wins() {
        let set = entries(&[(7, 1)]);
        for _ in 0..32 {
            assert_eq!(weighted_draw(&set, &OsRandom).unwrap(), Some(&7));
        }
    }

    #[test]
    fn test_non_positive_total_is_invalid() {
        let set = entries(&[(1, 0), (2, 0)]);
        let err = weighted_draw(&set, &OsRandom).unwrap_err();
        assert!(matches!(err, DrawError::InvalidWeights { total: 0 }));

        let set = entries(&[(1, 5), (2, -5)]);
        let err = weighted_draw(&set, &OsRandom).unwrap_err();
        assert!(matches!(err, DrawError::InvalidWeights { total: 0 }));
    }

    #[test]
    fn test_scripted_draw_walks_cumulative_weights() {
        // Weights 4/700: r in [0,400) picks A, [400,1100) picks B.
        let set = entries(&[(1, 400), (2, 700)]);

        let rng = ScriptedRandom::new([0, 399, 400, 1099]);
        assert_eq!(weighted_draw(&set, &rng).unwrap(), Some(&1));
        assert_eq!(weighted_draw(&set, &rng).unwrap(), Some(&1));
        assert_eq!(weighted_draw(&set, &rng).unwrap(), Some(&2));
        assert_eq!(weighted_draw(&set, &rng).unwrap(), Some(&2));
    }

    #[test]
    fn test_selection_frequency_converges_to_weight_share() {
        // 10k draws over a 400/700 split: B should win ~63.6% of the time.
        let set = entries(&[(1, 400), (2, 700)]);
        let draws = 10_000u32;

        let mut counts: HashMap<i64, u32> = HashMap::new();
        for _ in 0..draws {
            let winner = weighted_draw(&set, &OsRandom).unwrap().unwrap();
            *counts.entry(*winner).or_default() += 1;
        }

        let b_share = f64::from(counts[&2]) / f64::from(draws);
        let expected = 700.0 / 1100.0;
        // 4 sigma for a Bernoulli(0.636) over 10k trials is ~1.9%.
        assert!(
            (b_share - expected).abs() < 0.03,
            "B won {b_share:.4}, expected ~{expected:.4}"
        );
    }

    proptest! {
        #[test]
        fn prop_draw_returns_member_of_input(
            weights in proptest::collection::vec(1i64..10_000, 1..50)
        ) {
            let set: Vec<WeightEntry<usize>> = weights
                .iter()
                .enumerate()
                .map(|(i, &w)| WeightEntry::new(i, w))
                .collect();
            let winner = weighted_draw(&set, &OsRandom).unwrap().unwrap();
            prop_assert!(*winner < set.len());
        }
    }
}
