//! Periodic aging of inactive reputations.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, warn};

use crate::config::{DecayPolicy, WeightPolicy};
use crate::engine::{Crossing, CrossingEvent};
use crate::keyed_lock::KeyedMutex;
use crate::store::WeightStore;

/// Ages reputations that have seen no activity, emitting decay-driven
/// crossings.
///
/// One call to [`DecaySweeper::sweep_once`] is one pass over the stale
/// records; the caller owns the tick loop. The sweeper never raises a block
/// crossing — weight only falls here.
pub struct DecaySweeper {
    store: Arc<dyn WeightStore>,
    weight_policy: WeightPolicy,
    decay_policy: DecayPolicy,
    locks: Arc<KeyedMutex>,
}

impl DecaySweeper {
    /// Create a sweeper with its own lock table.
    #[must_use]
    pub fn new(
        store: Arc<dyn WeightStore>,
        weight_policy: WeightPolicy,
        decay_policy: DecayPolicy,
    ) -> Self {
        Self::with_locks(store, weight_policy, decay_policy, Arc::new(KeyedMutex::new()))
    }

    /// Create a sweeper sharing the engine's lock table, so decay and
    /// observation of the same key serialize.
    #[must_use]
    pub fn with_locks(
        store: Arc<dyn WeightStore>,
        weight_policy: WeightPolicy,
        decay_policy: DecayPolicy,
        locks: Arc<KeyedMutex>,
    ) -> Self {
        Self {
            store,
            weight_policy,
            decay_policy,
            locks,
        }
    }

    /// The decay policy in effect.
    #[must_use]
    pub const fn decay_policy(&self) -> &DecayPolicy {
        &self.decay_policy
    }

    /// Run one sweep at the current time.
    #[must_use]
    pub fn sweep_once(&self) -> Vec<CrossingEvent> {
        self.sweep_once_at(Utc::now())
    }

    /// Run one sweep as of `now`.
    ///
    /// Selects records inactive longer than the threshold and above the
    /// floor, applies a step proportional to inactive time, and collects
    /// unblock/low-weight crossings. A failure on one record is logged and
    /// skipped; the sweep continues across the rest of the tenant base.
    #[must_use]
    pub fn sweep_once_at(&self, now: DateTime<Utc>) -> Vec<CrossingEvent> {
        let inactivity =
            ChronoDuration::seconds(self.decay_policy.inactivity_threshold.as_secs() as i64);
        let cutoff = now - inactivity;

        let stale = match self.store.stale(cutoff, self.weight_policy.min_weight) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Decay sweep could not select stale records");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        let mut processed = 0usize;

        for (tenant, ip, _) in stale {
            let _guard = self.locks.lock(&(tenant, ip));

            // Reload under the key lock: an observation may have landed
            // between selection and here.
            let mut record = match self.store.load(tenant, ip) {
                Ok(Some(rec)) => rec,
                Ok(None) => continue,
                Err(e) => {
                    warn!(tenant = %tenant, ip = %ip, error = %e, "Skipping record: load failed");
                    continue;
                }
            };

            if record.last_updated >= cutoff || record.weight <= self.weight_policy.min_weight {
                continue;
            }

            let elapsed = (now - record.last_updated).to_std().unwrap_or_default();
            let step = self.decay_policy.step_for(elapsed);
            let prev_weight = record.weight;
            record.weight = record
                .weight
                .saturating_sub(step)
                .max(self.weight_policy.min_weight);

            if prev_weight >= self.weight_policy.release_threshold
                && record.weight < self.weight_policy.release_threshold
            {
                events.push(CrossingEvent {
                    tenant,
                    ip,
                    crossing: Crossing::Unblock,
                    weight: record.weight,
                });
            }

            if record.weight <= self.weight_policy.low_weight_threshold
                && !record.low_weight_notified
            {
                record.low_weight_notified = true;
                events.push(CrossingEvent {
                    tenant,
                    ip,
                    crossing: Crossing::LowWeight,
                    weight: record.weight,
                });
            }

            // last_updated tracks activity, not decay; leave it alone so the
            // step keeps growing while the address stays quiet.
            if let Err(e) = self.store.save(tenant, ip, &record) {
                warn!(tenant = %tenant, ip = %ip, error = %e, "Skipping record: save failed");
                continue;
            }

            debug!(
                tenant = %tenant,
                ip = %ip,
                from = prev_weight,
                to = record.weight,
                step = step,
                "Decayed inactive reputation"
            );
            processed += 1;
        }

        debug!(processed = processed, crossings = events.len(), "Decay sweep finished");
        events
    }
}
