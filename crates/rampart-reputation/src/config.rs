//! Scoring and decay policy configuration.
//!
//! Source material for this system disagreed on the exact constants
//! (increment tiers, block/release thresholds), so all of them are policy
//! fields with defaults rather than hard-coded contracts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Weight scoring policy: bounds, thresholds, and increment tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightPolicy {
    /// Floor a decayed weight saturates at. Records are never deleted, they
    /// rest here.
    pub min_weight: u32,
    /// Ceiling a weight is clamped to.
    pub max_weight: u32,
    /// Ascending through this weight raises a block crossing.
    pub block_threshold: u32,
    /// Descending through this weight (by decay) raises an unblock crossing.
    pub release_threshold: u32,
    /// Decaying to this weight or below raises a one-shot low-weight
    /// advisory.
    pub low_weight_threshold: u32,
    /// Request count above which the heavy increment applies.
    pub heavy_count: u64,
    /// Increment for heavy traffic.
    pub heavy_increment: u32,
    /// Request count above which the elevated increment applies.
    pub elevated_count: u64,
    /// Increment for elevated traffic.
    pub elevated_increment: u32,
    /// Increment for everything else.
    pub base_increment: u32,
    /// Flat addition when the reporter flags a repeat offender.
    pub repeat_offender_bonus: u32,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            min_weight: 10,
            max_weight: 100,
            block_threshold: 100,
            release_threshold: 60,
            low_weight_threshold: 20,
            heavy_count: 100,
            heavy_increment: 15,
            elevated_count: 50,
            elevated_increment: 7,
            base_increment: 3,
            repeat_offender_bonus: 30,
        }
    }
}

impl WeightPolicy {
    /// The additive increment for one observed event.
    #[must_use]
    pub const fn increment_for(&self, request_count: u64, is_repeat_offender: bool) -> u32 {
        let tier = if request_count > self.heavy_count {
            self.heavy_increment
        } else if request_count > self.elevated_count {
            self.elevated_increment
        } else {
            self.base_increment
        };

        if is_repeat_offender {
            tier + self.repeat_offender_bonus
        } else {
            tier
        }
    }

    /// Clamp a weight into `[min_weight, max_weight]`.
    #[must_use]
    pub fn clamp(&self, weight: u32) -> u32 {
        weight.clamp(self.min_weight, self.max_weight)
    }
}

/// Decay policy: how fast inactive reputations age back toward the floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayPolicy {
    /// How often the sweeper runs.
    pub tick_interval: Duration,
    /// A record must have been inactive at least this long before it decays.
    pub inactivity_threshold: Duration,
    /// Reference duration the decay step is scaled against.
    pub full_decay_duration: Duration,
    /// Step multiplier: `step = max(1, elapsed / full_decay_duration *
    /// decay_step_constant)`.
    pub decay_step_constant: u32,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            inactivity_threshold: Duration::from_secs(3 * 60),
            full_decay_duration: Duration::from_secs(60 * 60),
            decay_step_constant: 10,
        }
    }
}

impl DecayPolicy {
    /// The decay step for a record that has been inactive for `elapsed`.
    ///
    /// Proportional to inactive time over the full-decay duration, never
    /// less than 1 so stale records always make progress toward the floor.
    #[must_use]
    pub fn step_for(&self, elapsed: Duration) -> u32 {
        let full = self.full_decay_duration.as_secs().max(1);
        let scaled = elapsed.as_secs() * u64::from(self.decay_step_constant) / full;
        (scaled.max(1)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // ==================== WeightPolicy Tests ====================

    #[test]
    fn test_default_policy() {
        let policy = WeightPolicy::default();

        assert_eq!(policy.min_weight, 10);
        assert_eq!(policy.max_weight, 100);
        assert_eq!(policy.block_threshold, 100);
        assert_eq!(policy.release_threshold, 60);
        assert_eq!(policy.low_weight_threshold, 20);
    }

    #[test_case(150, false, 15 ; "heavy traffic")]
    #[test_case(101, false, 15 ; "just above heavy cutoff")]
    #[test_case(100, false, 7 ; "at heavy cutoff falls to elevated")]
    #[test_case(60, false, 7 ; "elevated traffic")]
    #[test_case(51, false, 7 ; "just above elevated cutoff")]
    #[test_case(50, false, 3 ; "at elevated cutoff falls to base")]
    #[test_case(0, false, 3 ; "no traffic")]
    #[test_case(150, true, 45 ; "heavy repeat offender")]
    #[test_case(10, true, 33 ; "base repeat offender")]
    fn test_increment_tiers(count: u64, repeat: bool, expected: u32) {
        let policy = WeightPolicy::default();
        assert_eq!(policy.increment_for(count, repeat), expected);
    }

    #[test]
    fn test_clamp() {
        let policy = WeightPolicy::default();

        assert_eq!(policy.clamp(5), 10);
        assert_eq!(policy.clamp(10), 10);
        assert_eq!(policy.clamp(55), 55);
        assert_eq!(policy.clamp(100), 100);
        assert_eq!(policy.clamp(130), 100);
    }

    #[test]
    fn test_policy_serde_roundtrip() {
        let policy = WeightPolicy {
            block_threshold: 90,
            ..WeightPolicy::default()
        };
        let json = serde_json::to_string(&policy).unwrap();
        let back: WeightPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.block_threshold, 90);
    }

    // ==================== DecayPolicy Tests ====================

    #[test]
    fn test_default_decay_policy() {
        let policy = DecayPolicy::default();

        assert_eq!(policy.tick_interval, Duration::from_secs(30));
        assert_eq!(policy.inactivity_threshold, Duration::from_secs(180));
        assert_eq!(policy.full_decay_duration, Duration::from_secs(3600));
        assert_eq!(policy.decay_step_constant, 10);
    }

    #[test]
    fn test_step_never_below_one() {
        let policy = DecayPolicy::default();
        assert_eq!(policy.step_for(Duration::from_secs(1)), 1);
        assert_eq!(policy.step_for(Duration::ZERO), 1);
    }

    #[test]
    fn test_step_scales_with_inactivity() {
        let policy = DecayPolicy::default();

        // 3 minutes over an hour rounds down, clamps to 1.
        assert_eq!(policy.step_for(Duration::from_secs(180)), 1);
        // Half the full duration.
        assert_eq!(policy.step_for(Duration::from_secs(1800)), 5);
        // The full duration yields the step constant.
        assert_eq!(policy.step_for(Duration::from_secs(3600)), 10);
        // Twice the full duration doubles it.
        assert_eq!(policy.step_for(Duration::from_secs(7200)), 20);
    }
}
