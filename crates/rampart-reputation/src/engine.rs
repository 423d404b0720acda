//! The reputation engine: one observed event in, new weight plus crossing
//! out.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use rampart_proto::TenantId;

use crate::config::WeightPolicy;
use crate::error::StoreResult;
use crate::keyed_lock::KeyedMutex;
use crate::store::{ReputationRecord, WeightStore};

/// A threshold-triggered event produced by a weight change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    /// The weight ascended through the block threshold.
    Block,
    /// The weight decayed below the release threshold.
    Unblock,
    /// The weight decayed to the low boundary.
    LowWeight,
}

/// A crossing bound to the record that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingEvent {
    /// Owning tenant.
    pub tenant: TenantId,
    /// Address concerned.
    pub ip: IpAddr,
    /// Which threshold was crossed.
    pub crossing: Crossing,
    /// The weight after the change.
    pub weight: u32,
}

/// Result of observing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The weight after the observation.
    pub weight: u32,
    /// A crossing, if the observation pushed the weight through the block
    /// threshold.
    pub crossing: Option<Crossing>,
}

/// Converts observed request volume into persisted weight changes.
///
/// The engine only writes the store; it never talks to a channel. Same-key
/// observations serialize through a sharded [`KeyedMutex`]; different keys
/// proceed in parallel.
pub struct ReputationEngine {
    store: Arc<dyn WeightStore>,
    policy: WeightPolicy,
    locks: Arc<KeyedMutex>,
}

impl ReputationEngine {
    /// Create an engine with its own lock table.
    #[must_use]
    pub fn new(store: Arc<dyn WeightStore>, policy: WeightPolicy) -> Self {
        Self::with_locks(store, policy, Arc::new(KeyedMutex::new()))
    }

    /// Create an engine sharing a lock table with a sweeper.
    #[must_use]
    pub fn with_locks(
        store: Arc<dyn WeightStore>,
        policy: WeightPolicy,
        locks: Arc<KeyedMutex>,
    ) -> Self {
        Self {
            store,
            policy,
            locks,
        }
    }

    /// The scoring policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &WeightPolicy {
        &self.policy
    }

    /// The per-key lock table, for sharing with a [`crate::DecaySweeper`].
    #[must_use]
    pub fn locks(&self) -> Arc<KeyedMutex> {
        Arc::clone(&self.locks)
    }

    /// Observe one reported event and fold it into the persisted weight.
    ///
    /// The increment is additive to the existing weight, tiered by request
    /// count, with a flat bonus for repeat offenders; the result is clamped
    /// to the policy bounds. A record created by its first observation is
    /// seeded at the raw increment (not floor-adjusted). Ascending through
    /// the block threshold yields `Crossing::Block` exactly once; hovering
    /// at or above it does not re-fire until decay re-arms the threshold.
    ///
    /// # Errors
    ///
    /// Propagates store failures to the caller, which decides whether to
    /// retry the originating event.
    pub fn observe(
        &self,
        tenant: TenantId,
        ip: IpAddr,
        agent_label: &str,
        request_count: u64,
        is_repeat_offender: bool,
    ) -> StoreResult<Observation> {
        let increment = self.policy.increment_for(request_count, is_repeat_offender);
        let now = Utc::now();

        let _guard = self.locks.lock(&(tenant, ip));

        let (prev_weight, mut record) = match self.store.load(tenant, ip)? {
            Some(mut rec) => {
                let prev = rec.weight;
                rec.weight = self.policy.clamp(prev.saturating_add(increment));
                rec.agent_label = agent_label.to_string();
                rec.last_updated = now;
                (prev, rec)
            }
            None => {
                let seed = increment.min(self.policy.max_weight);
                (0, ReputationRecord::new(seed, agent_label, now))
            }
        };

        // Re-arm the low-weight advisory once the weight leaves the boundary.
        if record.weight > self.policy.low_weight_threshold {
            record.low_weight_notified = false;
        }

        let crossing = (prev_weight < self.policy.block_threshold
            && record.weight >= self.policy.block_threshold)
            .then_some(Crossing::Block);

        self.store.save(tenant, ip, &record)?;

        debug!(
            tenant = %tenant,
            ip = %ip,
            agent = agent_label,
            increment = increment,
            weight = record.weight,
            crossed = crossing.is_some(),
            "Observed event"
        );

        Ok(Observation {
            weight: record.weight,
            crossing,
        })
    }
}
