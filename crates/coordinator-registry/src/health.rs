//! Health Monitor (component C4): heartbeat intake and the liveness
//! sweeper.

use std::sync::Arc;
use std::time::Duration;

use coordinator_core::model::{BreakerState, McpStatus};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::store::RegistryStore;

/// Soft TTL default: past this, status becomes `Suspect` (spec §4.4).
pub const DEFAULT_TTL_SOFT: Duration = Duration::from_secs(30);
/// Hard TTL default: past this, status becomes `Dead` and the breaker is
/// forced open (spec §4.4).
pub const DEFAULT_TTL_HARD: Duration = Duration::from_secs(90);
/// Sweep cadence (spec §4.4).
pub const SWEEP_PERIOD: Duration = Duration::from_secs(5);

/// Self-reported metrics an MCP may include with a heartbeat.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeartbeatMetrics {
    /// Normalized load in [0, 1].
    pub load: Option<f64>,
    pub inflight: Option<u32>,
}

/// EWMA smoothing factor applied to self-reported load samples.
const LOAD_EWMA_ALPHA: f64 = 0.3;

pub struct HealthMonitor {
    registry: Arc<RegistryStore>,
    ttl_soft: Duration,
    ttl_hard: Duration,
    clock: Arc<dyn coordinator_core::Clock>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<RegistryStore>,
        ttl_soft: Duration,
        ttl_hard: Duration,
        clock: Arc<dyn coordinator_core::Clock>,
    ) -> Self {
        Self {
            registry,
            ttl_soft,
            ttl_hard,
            clock,
        }
    }

    /// Record a heartbeat: bump `last_heartbeat`, fold reported metrics in,
    /// and resurrect a `Dead` MCP to `Active`/`HalfOpen` (spec §4.4).
    pub fn heartbeat(
        &self,
        mcp_id: &str,
        metrics: Option<HeartbeatMetrics>,
    ) -> Result<(), RegistryError> {
        let now = self.clock.wall();
        self.registry.mutate(mcp_id, |d| {
            let was_dead = d.status == McpStatus::Dead;
            d.last_heartbeat = now;
            if was_dead {
                d.status = McpStatus::Active;
                d.breaker.state = BreakerState::HalfOpen;
                info!(mcp_id, "mcp resurrected on heartbeat");
            } else if d.status == McpStatus::Suspect {
                d.status = McpStatus::Active;
            }
            if let Some(m) = metrics {
                if let Some(load) = m.load {
                    d.perf_window.record_load(load, LOAD_EWMA_ALPHA);
                }
            }
        })?;
        debug!(mcp_id, "heartbeat recorded");
        Ok(())
    }

    /// One sweep pass: demote stale entries to `Suspect`/`Dead`. Runs over
    /// a snapshot of registry ids, mutating each through the registry's own
    /// per-entry lock (spec §4.4: "Sweeper is single-threaded over the
    /// registry snapshot").
    pub fn sweep_once(&self) {
        let now = self.clock.wall();
        for id in self.registry.ids() {
            let Some(d) = self.registry.get(&id) else {
                continue;
            };
            if d.status == McpStatus::Dead {
                continue;
            }
            let age = now - d.last_heartbeat;
            if age >= self.ttl_hard.as_secs_f64() {
                let _ = self.registry.mutate(&id, |d| {
                    d.status = McpStatus::Dead;
                    d.breaker.state = BreakerState::Open;
                });
                warn!(mcp_id = %id, age, "mcp marked dead (ttl_hard exceeded)");
            } else if age >= self.ttl_soft.as_secs_f64() && d.status == McpStatus::Active {
                let _ = self.registry.mutate(&id, |d| d.status = McpStatus::Suspect);
                debug!(mcp_id = %id, age, "mcp marked suspect (ttl_soft exceeded)");
            }
        }
    }

    /// Run [`HealthMonitor::sweep_once`] forever on [`SWEEP_PERIOD`].
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SWEEP_PERIOD);
        loop {
            interval.tick().await;
            self.sweep_once();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_core::clock::FakeClock;
    use coordinator_core::model::{McpDescriptorRequest, McpKind, PriorityTier, WorkflowMatch};
    use std::collections::BTreeSet;

    fn setup() -> (Arc<RegistryStore>, Arc<FakeClock>, String) {
        let clock = Arc::new(FakeClock::at(0));
        let registry = Arc::new(RegistryStore::new(clock.clone()));
        let id = registry
            .register(McpDescriptorRequest {
                kind: McpKind::Adapter,
                endpoint: "http://a".into(),
                capabilities: BTreeSet::from(["ocr".to_string()]),
                workflows_supported: BTreeSet::from([WorkflowMatch::Tag("ocr".into())]),
                priority_tier: PriorityTier::Medium,
                declared_version: "1.0.0".into(),
                max_concurrent: None,
            })
            .unwrap();
        (registry, clock, id)
    }

    #[test]
    fn frequent_heartbeats_keep_status_active() {
        let (registry, clock, id) = setup();
        let monitor = HealthMonitor::new(registry.clone(), DEFAULT_TTL_SOFT, DEFAULT_TTL_HARD, clock.clone());
        for _ in 0..5 {
            clock.advance(10_000);
            monitor.heartbeat(&id, None).unwrap();
            monitor.sweep_once();
        }
        assert_eq!(registry.get(&id).unwrap().status, McpStatus::Active);
    }

    #[test]
    fn hard_ttl_gap_marks_dead_and_opens_breaker() {
        let (registry, clock, id) = setup();
        let monitor = HealthMonitor::new(registry.clone(), DEFAULT_TTL_SOFT, DEFAULT_TTL_HARD, clock.clone());
        clock.advance(DEFAULT_TTL_HARD.as_millis() as u64 + 1_000);
        monitor.sweep_once();
        let d = registry.get(&id).unwrap();
        assert_eq!(d.status, McpStatus::Dead);
        assert_eq!(d.breaker.state, BreakerState::Open);
    }

    #[test]
    fn soft_ttl_gap_marks_suspect_only() {
        let (registry, clock, id) = setup();
        let monitor = HealthMonitor::new(registry.clone(), DEFAULT_TTL_SOFT, DEFAULT_TTL_HARD, clock.clone());
        clock.advance(DEFAULT_TTL_SOFT.as_millis() as u64 + 1_000);
        monitor.sweep_once();
        assert_eq!(registry.get(&id).unwrap().status, McpStatus::Suspect);
    }

    #[test]
    fn heartbeat_resurrects_dead_mcp_to_half_open() {
        let (registry, clock, id) = setup();
        let monitor = HealthMonitor::new(registry.clone(), DEFAULT_TTL_SOFT, DEFAULT_TTL_HARD, clock.clone());
        clock.advance(DEFAULT_TTL_HARD.as_millis() as u64 + 1_000);
        monitor.sweep_once();
        monitor.heartbeat(&id, None).unwrap();
        let d = registry.get(&id).unwrap();
        assert_eq!(d.status, McpStatus::Active);
        assert_eq!(d.breaker.state, BreakerState::HalfOpen);
    }
}
