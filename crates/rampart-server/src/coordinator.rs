//! Wires scoring to delivery: the coordinator is what the rest of the
//! system calls.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use rampart_dispatch::{Dispatcher, SessionLedger};
use rampart_proto::TenantId;
use rampart_reputation::{
    CrossingEvent, DecayPolicy, DecaySweeper, ReputationEngine, ReputationRecord, RequestCounter,
    RequestCounterStore, StoreResult, WeightPolicy, WeightStore,
};

/// The coordinator: request events in, directives out, decay in the
/// background.
///
/// Scoring never blocks on agent I/O — crossings are spawned onto the
/// runtime and delivered (or dropped) by the [`Dispatcher`] on their own
/// time.
pub struct Coordinator {
    engine: ReputationEngine,
    sweeper: DecaySweeper,
    store: Arc<dyn WeightStore>,
    counters: Arc<dyn RequestCounterStore>,
    ledger: Arc<SessionLedger>,
    dispatcher: Arc<Dispatcher>,
}

impl Coordinator {
    /// Assemble a coordinator. The engine and sweeper share one keyed lock
    /// table so observation and decay of the same `(tenant, ip)` serialize.
    #[must_use]
    pub fn new(
        store: Arc<dyn WeightStore>,
        counters: Arc<dyn RequestCounterStore>,
        ledger: Arc<SessionLedger>,
        dispatcher: Arc<Dispatcher>,
        weight_policy: WeightPolicy,
        decay_policy: DecayPolicy,
    ) -> Self {
        let engine = ReputationEngine::new(Arc::clone(&store), weight_policy.clone());
        let sweeper =
            DecaySweeper::with_locks(Arc::clone(&store), weight_policy, decay_policy, engine.locks());
        Self {
            engine,
            sweeper,
            store,
            counters,
            ledger,
            dispatcher,
        }
    }

    /// Handle one reported traffic event.
    ///
    /// Increments the request counter, folds the event into the reputation
    /// weight, spawns delivery for any crossing, and returns the new weight.
    /// A tenant with no connected agent still accumulates weight; absence of
    /// a channel is a normal operating state, never an error here.
    ///
    /// # Errors
    ///
    /// Propagates store failures so the reporter can retry the event.
    pub async fn report_event(
        &self,
        tenant: TenantId,
        ip: IpAddr,
        host: &str,
        port: u16,
        request_count: u64,
        is_repeat_offender: bool,
    ) -> StoreResult<u32> {
        self.counters.record(tenant, ip, host, port)?;

        let agent_label = self.ledger.agent_label(tenant);
        let observation =
            self.engine
                .observe(tenant, ip, &agent_label, request_count, is_repeat_offender)?;

        if let Some(crossing) = observation.crossing {
            self.spawn_dispatch(CrossingEvent {
                tenant,
                ip,
                crossing,
                weight: observation.weight,
            });
        }

        Ok(observation.weight)
    }

    /// Run one decay sweep now, spawning delivery for every crossing it
    /// produced. Returns the crossings for observability.
    pub fn sweep_now(&self) -> Vec<CrossingEvent> {
        let events = self.sweeper.sweep_once();
        for event in &events {
            self.spawn_dispatch(*event);
        }
        events
    }

    /// The periodic decay loop. Runs until the task is dropped.
    pub async fn run_sweeper(&self) {
        let mut ticker = tokio::time::interval(self.sweeper.decay_policy().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.sweeper.decay_policy().tick_interval.as_secs(),
            "Decay sweeper running"
        );

        loop {
            ticker.tick().await;
            let events = self.sweep_now();
            if !events.is_empty() {
                debug!(crossings = events.len(), "Decay sweep raised crossings");
            }
        }
    }

    /// Reputation rows for a tenant, heaviest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn weight_report(&self, tenant: TenantId) -> StoreResult<Vec<(IpAddr, ReputationRecord)>> {
        self.store.tenant_report(tenant)
    }

    /// Request counters for a tenant at or above `min_count`, most recent
    /// first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn offender_report(
        &self,
        tenant: TenantId,
        min_count: u64,
    ) -> StoreResult<Vec<(IpAddr, String, u16, RequestCounter)>> {
        self.counters.offender_report(tenant, min_count)
    }

    fn spawn_dispatch(&self, event: CrossingEvent) {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            dispatcher.on_crossing(event).await;
        });
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}
