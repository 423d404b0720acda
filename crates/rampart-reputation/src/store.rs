//! Storage seams for reputation records and request counters.
//!
//! The coordinator needs only read-modify-write of a reputation record and
//! append/increment of a request counter; everything dialect-specific lives
//! behind these traits. The in-memory implementations are the reference
//! used by the server binary and the test suites; a SQL-backed store slots
//! in without touching the engine.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use rampart_proto::TenantId;

use crate::error::StoreResult;

/// Durable reputation state for one `(tenant, ip)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Current weight, clamped to the policy bounds on every update.
    pub weight: u32,
    /// Name of the agent that reported the traffic.
    pub agent_label: String,
    /// Last observed activity for this address. Decay does not touch it.
    pub last_updated: DateTime<Utc>,
    /// Whether the one-shot low-weight advisory has been sent since the
    /// weight last rose above the low boundary.
    pub low_weight_notified: bool,
}

impl ReputationRecord {
    /// Create a fresh record seeded at `weight`.
    #[must_use]
    pub fn new(weight: u32, agent_label: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            weight,
            agent_label: agent_label.into(),
            last_updated: now,
            low_weight_notified: false,
        }
    }
}

/// Accumulated request statistics for one `(tenant, ip, host, port)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounter {
    /// Total observed requests.
    pub count: u64,
    /// When the last request was observed.
    pub last_request: DateTime<Utc>,
}

/// Read-modify-write access to reputation records.
///
/// Implementations must provide per-key atomicity for `load`/`save` pairs
/// only when the caller serializes them (the engine holds a keyed lock
/// around each read-modify-write); individual calls must be internally
/// consistent.
pub trait WeightStore: Send + Sync {
    /// Load the record for `(tenant, ip)`, if one exists.
    fn load(&self, tenant: TenantId, ip: IpAddr) -> StoreResult<Option<ReputationRecord>>;

    /// Create or replace the record for `(tenant, ip)`.
    fn save(&self, tenant: TenantId, ip: IpAddr, record: &ReputationRecord) -> StoreResult<()>;

    /// Records last updated before `older_than` whose weight is above
    /// `above_weight` — the decay sweeper's selection.
    fn stale(
        &self,
        older_than: DateTime<Utc>,
        above_weight: u32,
    ) -> StoreResult<Vec<(TenantId, IpAddr, ReputationRecord)>>;

    /// All records for a tenant, heaviest first. Backs the operator weight
    /// report.
    fn tenant_report(&self, tenant: TenantId) -> StoreResult<Vec<(IpAddr, ReputationRecord)>>;
}

/// Append/increment access to request counters.
pub trait RequestCounterStore: Send + Sync {
    /// Record one request, returning the updated counter.
    fn record(
        &self,
        tenant: TenantId,
        ip: IpAddr,
        host: &str,
        port: u16,
    ) -> StoreResult<RequestCounter>;

    /// Counters for a tenant with `count >= min_count`, most recent first.
    /// Backs the offender report.
    fn offender_report(
        &self,
        tenant: TenantId,
        min_count: u64,
    ) -> StoreResult<Vec<(IpAddr, String, u16, RequestCounter)>>;
}

/// In-memory weight store.
#[derive(Debug, Default)]
pub struct MemoryWeightStore {
    records: RwLock<HashMap<(TenantId, IpAddr), ReputationRecord>>,
}

impl MemoryWeightStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl WeightStore for MemoryWeightStore {
    fn load(&self, tenant: TenantId, ip: IpAddr) -> StoreResult<Option<ReputationRecord>> {
        Ok(self.records.read().get(&(tenant, ip)).cloned())
    }

    fn save(&self, tenant: TenantId, ip: IpAddr, record: &ReputationRecord) -> StoreResult<()> {
        self.records.write().insert((tenant, ip), record.clone());
        Ok(())
    }

    fn stale(
        &self,
        older_than: DateTime<Utc>,
        above_weight: u32,
    ) -> StoreResult<Vec<(TenantId, IpAddr, ReputationRecord)>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(_, rec)| rec.last_updated < older_than && rec.weight > above_weight)
            .map(|((tenant, ip), rec)| (*tenant, *ip, rec.clone()))
            .collect())
    }

    fn tenant_report(&self, tenant: TenantId) -> StoreResult<Vec<(IpAddr, ReputationRecord)>> {
        let mut rows: Vec<(IpAddr, ReputationRecord)> = self
            .records
            .read()
            .iter()
            .filter(|((t, _), _)| *t == tenant)
            .map(|((_, ip), rec)| (*ip, rec.clone()))
            .collect();
        rows.sort_by(|a, b| b.1.weight.cmp(&a.1.weight));
        Ok(rows)
    }
}

/// In-memory request counter store.
#[derive(Debug, Default)]
pub struct MemoryRequestCounterStore {
    counters: RwLock<HashMap<(TenantId, IpAddr, String, u16), RequestCounter>>,
}

impl MemoryRequestCounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestCounterStore for MemoryRequestCounterStore {
    fn record(
        &self,
        tenant: TenantId,
        ip: IpAddr,
        host: &str,
        port: u16,
    ) -> StoreResult<RequestCounter> {
        let now = Utc::now();
        let mut counters = self.counters.write();
        let counter = counters
            .entry((tenant, ip, host.to_string(), port))
            .and_modify(|c| {
                c.count += 1;
                c.last_request = now;
            })
            .or_insert(RequestCounter {
                count: 1,
                last_request: now,
            });
        Ok(counter.clone())
    }

    fn offender_report(
        &self,
        tenant: TenantId,
        min_count: u64,
    ) -> StoreResult<Vec<(IpAddr, String, u16, RequestCounter)>> {
        let mut rows: Vec<(IpAddr, String, u16, RequestCounter)> = self
            .counters
            .read()
            .iter()
            .filter(|((t, _, _, _), c)| *t == tenant && c.count >= min_count)
            .map(|((_, ip, host, port), c)| (*ip, host.clone(), *port, c.clone()))
            .collect();
        rows.sort_by(|a, b| b.3.last_request.cmp(&a.3.last_request));
        Ok(rows)
    }
}
