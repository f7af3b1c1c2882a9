//! Two-count success estimates used as selection weights

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Beta-style belief: positive and negative evidence counts with the
/// time of the last update. Both counts stay at or above 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    pub pos: f64,
    pub neg: f64,
    pub updated_at: DateTime<Utc>,
}

impl Default for Belief {
    fn default() -> Self {
        Self::new()
    }
}

impl Belief {
    /// The uninformed prior `(1, 1)`.
    pub fn new() -> Self {
        Self {
            pos: 1.0,
            neg: 1.0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_counts(pos: f64, neg: f64) -> Self {
        Self {
            pos: pos.max(1.0),
            neg: neg.max(1.0),
            updated_at: Utc::now(),
        }
    }

    /// Laplace-smoothed success score in `(0, 1)`.
    pub fn score(&self) -> f64 {
        (self.pos + 1.0) / (self.pos + self.neg + 2.0)
    }

    /// Record one observation.
    pub fn update(&mut self, success: bool) {
        if success {
            self.pos += 1.0;
        } else {
            self.neg += 1.0;
        }
        self.updated_at = Utc::now();
    }

    /// This belief with both counts decayed exponentially toward the
    /// `(1, 1)` prior. A rate of zero (or less) disables decay. The
    /// stored counts are never mutated; decay is applied by readers.
    pub fn decayed(&self, rate_per_milli: f64, now: DateTime<Utc>) -> Belief {
        if rate_per_milli <= 0.0 {
            return self.clone();
        }
        let elapsed_millis = (now - self.updated_at).num_milliseconds().max(0) as f64;
        let factor = (-rate_per_milli * elapsed_millis).exp();
        Belief {
            pos: 1.0 + (self.pos - 1.0) * factor,
            neg: 1.0 + (self.neg - 1.0) * factor,
            updated_at: self.updated_at,
        }
    }

    /// Score after read-time decay.
    pub fn decayed_score(&self, rate_per_milli: f64, now: DateTime<Utc>) -> f64 {
        self.decayed(rate_per_milli, now).score()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_default_score() {
        // (1+1)/(1+1+2) = 0.5
        assert!((Belief::new().score() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_counts_after_updates() {
        let mut belief = Belief::new();
        for _ in 0..3 {
            belief.update(true);
        }
        for _ in 0..2 {
            belief.update(false);
        }
        assert_eq!(belief.pos, 4.0);
        assert_eq!(belief.neg, 3.0);
        assert!((belief.score() - 5.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_decay_disabled_at_zero_rate() {
        let mut belief = Belief::new();
        belief.update(true);
        let later = belief.updated_at + Duration::hours(10);
        assert_eq!(belief.decayed(0.0, later), belief);
    }

    #[test]
    fn test_decay_approaches_prior() {
        let mut belief = Belief::with_counts(10.0, 4.0);
        belief.update(true);
        let later = belief.updated_at + Duration::hours(1000);
        let decayed = belief.decayed(1e-3, later);
        assert!((decayed.pos - 1.0).abs() < 1e-6);
        assert!((decayed.neg - 1.0).abs() < 1e-6);
        assert!((decayed.score() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decay_is_monotone_in_elapsed_time() {
        let belief = Belief::with_counts(9.0, 1.0);
        let soon = belief.updated_at + Duration::seconds(1);
        let late = belief.updated_at + Duration::hours(1);
        let score_soon = belief.decayed_score(1e-6, soon);
        let score_late = belief.decayed_score(1e-6, late);
        assert!(score_soon > score_late);
        assert!(score_late > 0.5);
    }
}
