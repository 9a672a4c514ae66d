//! Registry Store (component C3): authoritative in-memory map of MCP
//! descriptors with per-entry locking, plus durable snapshotting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use coordinator_core::clock::{new_id, Clock};
use coordinator_core::model::{
    BreakerCounters, McpDescriptor, McpDescriptorRequest, McpKind, McpStatus, PerfWindow,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RegistryError;

/// Grace window within which a re-registration of the same `(kind,
/// endpoint)` is treated as idempotent (spec §4.3).
pub const IDEMPOTENCY_GRACE: Duration = Duration::from_secs(5 * 60);

/// Optional filter for [`RegistryStore::list`].
#[derive(Debug, Clone, Default)]
pub struct RegistryFilter {
    pub status: Option<McpStatus>,
    pub kind: Option<McpKind>,
}

impl RegistryFilter {
    fn matches(&self, d: &McpDescriptor) -> bool {
        self.status.is_none_or(|s| s == d.status) && self.kind.is_none_or(|k| k == d.kind)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct IdempotencyKey {
    kind: McpKind,
    endpoint: String,
}

struct IdempotencyEntry {
    mcp_id: String,
    registered_at: f64,
}

/// Durable snapshot file shape (spec §6).
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    taken_at: f64,
    entries: Vec<McpDescriptor>,
}

const SNAPSHOT_VERSION: u32 = 1;

pub struct RegistryStore {
    entries: DashMap<String, Arc<RwLock<McpDescriptor>>>,
    idempotency: DashMap<IdempotencyKey, IdempotencyEntry>,
    clock: Arc<dyn Clock>,
}

impl RegistryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            idempotency: DashMap::new(),
            clock,
        }
    }

    /// Register a new MCP, or update-in-place if the same `(kind, endpoint)`
    /// registered within [`IDEMPOTENCY_GRACE`] (spec §4.3 property 1).
    pub fn register(&self, req: McpDescriptorRequest) -> Result<String, RegistryError> {
        if req.capabilities.is_empty() {
            return Err(RegistryError::MissingField("capabilities"));
        }
        if req.workflows_supported.is_empty() {
            return Err(RegistryError::MissingField("workflows_supported"));
        }

        let now = self.clock.wall();
        let key = IdempotencyKey {
            kind: req.kind,
            endpoint: req.endpoint.clone(),
        };

        if let Some(existing) = self.idempotency.get(&key) {
            if now - existing.registered_at < IDEMPOTENCY_GRACE.as_secs_f64() {
                let id = existing.mcp_id.clone();
                drop(existing);
                if let Some(entry) = self.entries.get(&id) {
                    let mut d = entry.write();
                    d.declared_version = req.declared_version;
                    d.capabilities = req.capabilities;
                    d.workflows_supported = req.workflows_supported;
                    d.priority_tier = req.priority_tier;
                    d.max_concurrent = req.max_concurrent.unwrap_or(10);
                    d.perf_window = PerfWindow::default();
                    d.breaker = BreakerCounters::default();
                    debug!(mcp_id = %id, "idempotent re-registration");
                    return Ok(id);
                }
                // Entry vanished (e.g. concurrent deregister) — fall through to fresh registration.
            }
        }

        let id = new_id("mcp");
        let descriptor = McpDescriptor {
            id: id.clone(),
            kind: req.kind,
            endpoint: req.endpoint.clone(),
            capabilities: req.capabilities,
            workflows_supported: req.workflows_supported,
            priority_tier: req.priority_tier,
            declared_version: req.declared_version,
            registered_at: now,
            last_heartbeat: now,
            status: McpStatus::Active,
            breaker: BreakerCounters::default(),
            perf_window: PerfWindow::default(),
            max_concurrent: req.max_concurrent.unwrap_or(10),
            metadata: Default::default(),
        };
        self.entries.insert(id.clone(), Arc::new(RwLock::new(descriptor)));
        self.idempotency.insert(
            key,
            IdempotencyEntry {
                mcp_id: id.clone(),
                registered_at: now,
            },
        );
        info!(mcp_id = %id, "registered mcp");
        Ok(id)
    }

    /// Remove an MCP. In-flight dispatches already hold their own snapshot
    /// of the descriptor and complete normally; no new dispatch will select
    /// this id once it is gone.
    pub fn deregister(&self, mcp_id: &str) -> Result<(), RegistryError> {
        self.entries
            .remove(mcp_id)
            .ok_or_else(|| RegistryError::NotFound(mcp_id.to_string()))?;
        self.idempotency.retain(|_, v| v.mcp_id != mcp_id);
        info!(mcp_id, "deregistered mcp");
        Ok(())
    }

    /// Snapshot read of one descriptor.
    pub fn get(&self, mcp_id: &str) -> Option<McpDescriptor> {
        self.entries.get(mcp_id).map(|e| e.read().clone())
    }

    /// Snapshot read of all descriptors matching `filter`.
    pub fn list(&self, filter: &RegistryFilter) -> Vec<McpDescriptor> {
        self.entries
            .iter()
            .filter_map(|e| {
                let d = e.read();
                filter.matches(&d).then(|| d.clone())
            })
            .collect()
    }

    /// Serialized single-writer mutation under the entry's own lock — other
    /// entries are unaffected (spec §5: "Registry mutations on a single
    /// `mcp_id` are serialized").
    pub fn mutate<F>(&self, mcp_id: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut McpDescriptor),
    {
        let entry = self
            .entries
            .get(mcp_id)
            .ok_or_else(|| RegistryError::NotFound(mcp_id.to_string()))?;
        let mut d = entry.write();
        f(&mut d);
        d.enforce_dead_breaker_invariant();
        Ok(())
    }

    /// All descriptor ids currently present.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write a durable snapshot of the current registry state to `path`.
    pub fn snapshot_to_file(&self, path: &Path) -> Result<(), RegistryError> {
        let entries: Vec<McpDescriptor> = self.entries.iter().map(|e| e.read().clone()).collect();
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            taken_at: self.clock.wall(),
            entries,
        };
        let json = serde_json::to_vec_pretty(&file)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a snapshot as a warm-start aid. Every loaded entry is marked
    /// `Suspect` until its first heartbeat arrives (spec §4.3) — the
    /// snapshot is not treated as a liveness guarantee.
    pub fn load_snapshot_from_file(&self, path: &Path) -> Result<usize, RegistryError> {
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read(path)?;
        let file: SnapshotFile = serde_json::from_slice(&raw)?;
        let mut loaded = 0;
        for mut d in file.entries {
            d.status = McpStatus::Suspect;
            self.idempotency.insert(
                IdempotencyKey {
                    kind: d.kind,
                    endpoint: d.endpoint.clone(),
                },
                IdempotencyEntry {
                    mcp_id: d.id.clone(),
                    registered_at: d.registered_at,
                },
            );
            self.entries.insert(d.id.clone(), Arc::new(RwLock::new(d)));
            loaded += 1;
        }
        warn!(loaded, "loaded registry snapshot; entries marked suspect pending heartbeat");
        Ok(loaded)
    }
}

/// Periodically snapshot `store` to `path` every `period`, forever. Spawn
/// this as a background task; a write failure is logged and retried on the
/// next tick (spec §4 failure table: "non-fatal").
pub async fn run_periodic_snapshot(store: Arc<RegistryStore>, path: PathBuf, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = store.snapshot_to_file(&path) {
            warn!(error = %e, "periodic registry snapshot failed, will retry next tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_core::clock::FakeClock;
    use coordinator_core::model::{PriorityTier, WorkflowMatch};
    use std::collections::BTreeSet;

    fn sample_request() -> McpDescriptorRequest {
        McpDescriptorRequest {
            kind: McpKind::Adapter,
            endpoint: "http://a".into(),
            capabilities: BTreeSet::from(["ocr".to_string()]),
            workflows_supported: BTreeSet::from([WorkflowMatch::Tag("ocr".into())]),
            priority_tier: PriorityTier::Medium,
            declared_version: "1.0.0".into(),
            max_concurrent: None,
        }
    }

    #[test]
    fn register_rejects_missing_capabilities() {
        let store = RegistryStore::new(Arc::new(FakeClock::at(0)));
        let mut req = sample_request();
        req.capabilities.clear();
        assert!(matches!(store.register(req), Err(RegistryError::MissingField("capabilities"))));
    }

    #[test]
    fn reregistration_within_grace_is_idempotent() {
        let clock = Arc::new(FakeClock::at(0));
        let store = RegistryStore::new(clock.clone());
        let id1 = store.register(sample_request()).unwrap();
        clock.advance(1_000);
        let id2 = store.register(sample_request()).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reregistration_after_grace_creates_new_entry() {
        let clock = Arc::new(FakeClock::at(0));
        let store = RegistryStore::new(clock.clone());
        let id1 = store.register(sample_request()).unwrap();
        clock.advance((IDEMPOTENCY_GRACE.as_secs() + 1) * 1000);
        let id2 = store.register(sample_request()).unwrap();
        assert_ne!(id1, id2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn deregister_removes_entry() {
        let store = RegistryStore::new(Arc::new(FakeClock::at(0)));
        let id = store.register(sample_request()).unwrap();
        store.deregister(&id).unwrap();
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = RegistryStore::new(Arc::new(FakeClock::at(0)));
        store.register(sample_request()).unwrap();
        store.snapshot_to_file(&path).unwrap();

        let store2 = RegistryStore::new(Arc::new(FakeClock::at(0)));
        let loaded = store2.load_snapshot_from_file(&path).unwrap();
        assert_eq!(loaded, 1);
        let entries = store2.list(&RegistryFilter::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, McpStatus::Suspect);
    }

    #[test]
    fn mutate_enforces_dead_breaker_invariant() {
        let store = RegistryStore::new(Arc::new(FakeClock::at(0)));
        let id = store.register(sample_request()).unwrap();
        store
            .mutate(&id, |d| d.status = McpStatus::Dead)
            .unwrap();
        let d = store.get(&id).unwrap();
        assert_eq!(d.breaker.state, coordinator_core::model::BreakerState::Open);
    }
}
