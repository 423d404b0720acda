//! End-to-end flow: reported events drive weights, crossings reach the
//! tenant's channel as directives.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use rampart_dispatch::{AgentLink, ConnectionRegistry, DeliveryOutcome, Dispatcher, RuleState, SessionLedger};
use rampart_proto::{Directive, TenantId};
use rampart_reputation::{
    DecayPolicy, MemoryRequestCounterStore, MemoryWeightStore, WeightPolicy, WeightStore,
};
use rampart_server::Coordinator;

/// Fake agent channel recording everything delivered to it.
struct RecordingLink {
    tenant: TenantId,
    rules: RuleState,
    delivered: Mutex<Vec<Directive>>,
}

impl RecordingLink {
    fn new(tenant: TenantId) -> Arc<Self> {
        Arc::new(Self {
            tenant,
            rules: RuleState::new(),
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn delivered(&self) -> Vec<Directive> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl AgentLink for RecordingLink {
    fn tenant(&self) -> TenantId {
        self.tenant
    }

    fn agent_name(&self) -> &str {
        "recording-agent"
    }

    fn rules(&self) -> &RuleState {
        &self.rules
    }

    async fn deliver(&self, directive: Directive) -> DeliveryOutcome {
        self.delivered.lock().push(directive);
        DeliveryOutcome::Acknowledged
    }
}

struct Harness {
    store: Arc<MemoryWeightStore>,
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<SessionLedger>,
    coordinator: Coordinator,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryWeightStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let ledger = Arc::new(SessionLedger::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));
    let coordinator = Coordinator::new(
        store.clone(),
        Arc::new(MemoryRequestCounterStore::new()),
        Arc::clone(&ledger),
        dispatcher,
        WeightPolicy::default(),
        DecayPolicy::default(),
    );
    Harness {
        store,
        registry,
        ledger,
        coordinator,
    }
}

async fn settle() {
    // Dispatch is spawned fire-and-forget; give it a beat to land.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn attack_ip() -> IpAddr {
    "203.0.113.99".parse().unwrap()
}

#[tokio::test]
async fn block_fires_once_at_the_ceiling() {
    let h = harness();
    let tenant = TenantId::new();
    let link = RecordingLink::new(tenant);
    h.registry.register(link.clone());
    h.ledger.mark_online(tenant, "recording-agent");

    // Three heavy observations: 15 → 30 → 45, no crossing.
    for expected in [15, 30, 45] {
        let weight = h
            .coordinator
            .report_event(tenant, attack_ip(), "web-1", 443, 120, false)
            .await
            .unwrap();
        assert_eq!(weight, expected);
    }

    // Elevated-tier repeat offender: 45 + 7 + 30 = 82, still below the
    // threshold.
    let weight = h
        .coordinator
        .report_event(tenant, attack_ip(), "web-1", 443, 60, true)
        .await
        .unwrap();
    assert_eq!(weight, 82);

    settle().await;
    assert!(link.delivered().is_empty());

    // One more pushes through the ceiling, clamped to 100: block fires.
    let weight = h
        .coordinator
        .report_event(tenant, attack_ip(), "web-1", 443, 60, true)
        .await
        .unwrap();
    assert_eq!(weight, 100);

    settle().await;
    assert_eq!(link.delivered(), vec![Directive::block(attack_ip())]);
    assert!(link.rules.is_applied(attack_ip()));

    // Hammering the saturated record does not re-fire the block.
    for _ in 0..3 {
        h.coordinator
            .report_event(tenant, attack_ip(), "web-1", 443, 150, true)
            .await
            .unwrap();
    }
    settle().await;
    assert_eq!(link.delivered().len(), 1);
}

#[tokio::test]
async fn decay_releases_a_blocked_address() {
    let h = harness();
    let tenant = TenantId::new();
    let link = RecordingLink::new(tenant);
    h.registry.register(link.clone());
    h.ledger.mark_online(tenant, "recording-agent");

    // Drive to the ceiling and deliver the block.
    for _ in 0..7 {
        h.coordinator
            .report_event(tenant, attack_ip(), "web-1", 443, 150, false)
            .await
            .unwrap();
    }
    settle().await;
    assert_eq!(link.delivered(), vec![Directive::block(attack_ip())]);

    // Age the record: two and a half hours of silence, step = 25 per sweep.
    let mut record = h.store.load(tenant, attack_ip()).unwrap().unwrap();
    record.last_updated = Utc::now() - ChronoDuration::minutes(150);
    h.store.save(tenant, attack_ip(), &record).unwrap();

    // Sweeps walk the weight down through the release threshold.
    let mut events = Vec::new();
    for _ in 0..3 {
        events.extend(h.coordinator.sweep_now());
    }
    settle().await;

    assert!(!events.is_empty());
    let delivered = link.delivered();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1], Directive::unblock(attack_ip()));
    assert!(!link.rules.is_applied(attack_ip()));
}

#[tokio::test]
async fn offline_tenant_accumulates_without_enforcement() {
    let h = harness();
    let tenant = TenantId::new();

    // No channel registered at all: reporting still works and returns
    // weights.
    for _ in 0..7 {
        let weight = h
            .coordinator
            .report_event(tenant, attack_ip(), "web-1", 443, 150, false)
            .await
            .unwrap();
        assert!(weight <= 100);
    }
    settle().await;

    // Weight saturated with nothing delivered anywhere and no error raised.
    let record = h.store.load(tenant, attack_ip()).unwrap().unwrap();
    assert_eq!(record.weight, 100);
}

#[tokio::test]
async fn low_weight_advisory_reaches_the_agent_once() {
    let h = harness();
    let tenant = TenantId::new();
    let link = RecordingLink::new(tenant);
    h.registry.register(link.clone());

    // A lightly-weighted record goes quiet for a long time.
    let mut record = rampart_reputation::ReputationRecord::new(
        25,
        "recording-agent",
        Utc::now() - ChronoDuration::minutes(60),
    );
    record.low_weight_notified = false;
    h.store.save(tenant, attack_ip(), &record).unwrap();

    for _ in 0..4 {
        h.coordinator.sweep_now();
    }
    settle().await;

    let advisories = link
        .delivered()
        .iter()
        .filter(|d| matches!(d, Directive::LowWeight { .. }))
        .count();
    assert_eq!(advisories, 1);
}
