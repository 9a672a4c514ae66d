//! Durable Interaction Record store: per-day partitioned append-only log of
//! length-prefixed JSON records plus an in-memory index, fronted by a
//! bounded LRU cache (spec §3 "Lifecycle/ownership", §4.9, §6 "Persisted
//! state layout").
//!
//! The in-memory `records` map is the store's authoritative query surface
//! (point lookup, history, metrics); the append log exists to survive a
//! restart via [`Store::load_from_disk`]. The separate `cache` mirrors the
//! spec's "last N" LRU view used by the Log Processor for hot-path
//! idempotence checks — it does not gate what the Query API can see.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use coordinator_core::model::InteractionRecord;
use dashmap::DashMap;
use moka::sync::Cache;

use crate::error::LogError;
use crate::types::{HistoryFilter, MetricsSummary, MetricsWindow};

/// Default cache size (spec §4.9: "Memory cache retains last N (default
/// 10k) records").
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Format version written at the head of every partition file (spec §6:
/// "Format version in a header; future versions must be readable by the
/// current version or explicitly migrated").
const FORMAT_VERSION: u16 = 1;

pub struct Store {
    base_dir: PathBuf,
    records: DashMap<String, InteractionRecord>,
    cache: Cache<String, InteractionRecord>,
}

impl Store {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, cache_capacity: u64) -> Self {
        Self {
            base_dir: base_dir.into(),
            records: DashMap::new(),
            cache: Cache::new(cache_capacity),
        }
    }

    /// Replay every partition file under `base_dir`, reconstructing the
    /// in-memory index. Files are visited in filename (date) order so that
    /// a record rewritten in a later append wins (spec §6 round-trip
    /// property: "Snapshot -> restart -> snapshot: bit-equivalent").
    pub fn load_from_disk(&self) -> Result<usize, LogError> {
        if !self.base_dir.exists() {
            return Ok(0);
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.base_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "log"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            loaded += self.replay_file(&path)?;
        }
        Ok(loaded)
    }

    fn replay_file(&self, path: &Path) -> Result<usize, LogError> {
        let bytes = std::fs::read(path)?;
        if bytes.len() < 2 {
            return Ok(0);
        }
        let mut offset = 2; // skip the format-version header
        let mut count = 0;
        while offset + 4 <= bytes.len() {
            let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            if offset + len > bytes.len() {
                break; // truncated trailing write from a crash mid-append
            }
            let record: InteractionRecord = serde_json::from_slice(&bytes[offset..offset + len])?;
            offset += len;
            self.records.insert(record.interaction_id.clone(), record.clone());
            self.cache.insert(record.interaction_id.clone(), record);
            count += 1;
        }
        Ok(count)
    }

    /// Write-through a record: append its current snapshot to the day
    /// partition for its `start_ts`, update the in-memory index and cache.
    pub fn upsert(&self, record: &InteractionRecord) -> Result<(), LogError> {
        let path = self.partition_path(record.start_ts);
        append_record(&path, record)?;
        self.records.insert(record.interaction_id.clone(), record.clone());
        self.cache.insert(record.interaction_id.clone(), record.clone());
        Ok(())
    }

    fn partition_path(&self, start_ts: f64) -> PathBuf {
        let dt = DateTime::<Utc>::from_timestamp(start_ts as i64, 0).unwrap_or_else(Utc::now);
        self.base_dir.join(format!("{}.log", dt.format("%Y-%m-%d")))
    }

    /// Point lookup, cache-first (spec: cache is consulted for hot reads;
    /// a miss still resolves from the authoritative index).
    pub fn get(&self, interaction_id: &str) -> Option<InteractionRecord> {
        if let Some(r) = self.cache.get(interaction_id) {
            return Some(r);
        }
        self.records.get(interaction_id).map(|r| r.clone())
    }

    pub fn history(&self, filter: &HistoryFilter, limit: usize, offset: usize) -> Vec<InteractionRecord> {
        let mut matching: Vec<InteractionRecord> = self
            .records
            .iter()
            .filter(|e| {
                filter.mcp_id.as_deref().is_none_or(|m| m == e.mcp_id)
                    && filter.client_id.as_deref().is_none_or(|c| c == e.client_id)
            })
            .map(|e| e.clone())
            .collect();
        // Most-recent-first, matching a typical history feed.
        matching.sort_by(|a, b| b.start_ts.partial_cmp(&a.start_ts).unwrap_or(std::cmp::Ordering::Equal));
        matching.into_iter().skip(offset).take(limit).collect()
    }

    /// Aggregate metrics over `window`, optionally scoped to one MCP (spec
    /// §4.10, §8 property 7).
    pub fn metrics(&self, mcp_id: Option<&str>, window: MetricsWindow, now: f64) -> MetricsSummary {
        let horizon = now - window.as_secs();
        let mut success = 0u64;
        let mut failure = 0u64;
        let mut latencies: Vec<f64> = Vec::new();

        for entry in self.records.iter() {
            let r = entry.value();
            if r.start_ts < horizon {
                continue;
            }
            if let Some(id) = mcp_id {
                if r.mcp_id != id {
                    continue;
                }
            }
            match r.state {
                coordinator_core::model::InteractionState::Completed => {
                    success += 1;
                    if let Some(end) = r.end_ts {
                        latencies.push((end - r.start_ts) * 1000.0);
                    }
                }
                coordinator_core::model::InteractionState::Failed => {
                    failure += 1;
                    if let Some(end) = r.end_ts {
                        latencies.push((end - r.start_ts) * 1000.0);
                    }
                }
                _ => {}
            }
        }

        let count = success + failure;
        let (avg, min, max) = if latencies.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = latencies.iter().sum();
            let min = latencies.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = latencies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            (sum / latencies.len() as f64, min, max)
        };

        MetricsSummary {
            count,
            success_rate: if count == 0 { 0.0 } else { success as f64 / count as f64 },
            error_rate: if count == 0 { 0.0 } else { failure as f64 / count as f64 },
            avg_latency_ms: avg,
            min_latency_ms: min,
            max_latency_ms: max,
        }
    }

    /// Drop records older than `retention_secs` from the store (spec §4.9:
    /// "background sweeper deletes records older than the configured
    /// retention from the store; cache is unaffected"). The append log
    /// itself is left in place — historical partitions are immutable and
    /// rotate out by file age at the operator's discretion.
    pub fn sweep_retention(&self, retention_secs: f64, now: f64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| now - r.start_ts < retention_secs);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn append_record(path: &Path, record: &InteractionRecord) -> Result<(), LogError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let is_new = !path.exists();
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    if is_new {
        file.write_all(&FORMAT_VERSION.to_le_bytes())?;
    }
    let json = serde_json::to_vec(record)?;
    file.write_all(&(json.len() as u32).to_le_bytes())?;
    file.write_all(&json)?;
    Ok(())
}

/// Append a dead-letter entry: an event that failed store write three
/// times is recorded here, never surfaced to the producer since ingestion
/// already returned `accepted` (spec §4.9, §7).
pub fn append_dead_letter(base_dir: &Path, entry: &DeadLetterEntry) -> Result<(), LogError> {
    let path = base_dir.join("dead_letter.log");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let is_new = !path.exists();
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    if is_new {
        file.write_all(&FORMAT_VERSION.to_le_bytes())?;
    }
    let json = serde_json::to_vec(entry)?;
    file.write_all(&(json.len() as u32).to_le_bytes())?;
    file.write_all(&json)?;
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeadLetterEntry {
    pub event: crate::types::QueuedEvent,
    pub reason: String,
    pub failed_at: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_core::model::InteractionState;
    use std::collections::HashMap as StdMap;

    fn record(id: &str, start_ts: f64, state: InteractionState) -> InteractionRecord {
        InteractionRecord {
            interaction_id: id.into(),
            mcp_id: "mcp_1".into(),
            client_id: "client_1".into(),
            start_ts,
            end_ts: if state.is_terminal() { Some(start_ts + 1.0) } else { None },
            state,
            request_digest: "digest".into(),
            progress_events: Vec::new(),
            result_payload: None,
            error_payload: None,
            metadata: StdMap::new(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("interactions"), 100);
        let r = record("i1", 1_000.0, InteractionState::Started);
        store.upsert(&r).unwrap();
        assert_eq!(store.get("i1").unwrap().interaction_id, "i1");
    }

    #[test]
    fn reload_from_disk_reconstructs_index() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("interactions");
        let store = Store::new(&base, 100);
        store.upsert(&record("i1", 1_000.0, InteractionState::Completed)).unwrap();
        store.upsert(&record("i2", 1_050.0, InteractionState::Failed)).unwrap();

        let reloaded = Store::new(&base, 100);
        let count = reloaded.load_from_disk().unwrap();
        assert_eq!(count, 2);
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn later_append_overrides_earlier_on_replay() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("interactions");
        let store = Store::new(&base, 100);
        store.upsert(&record("i1", 1_000.0, InteractionState::Started)).unwrap();
        store.upsert(&record("i1", 1_000.0, InteractionState::Completed)).unwrap();

        let reloaded = Store::new(&base, 100);
        reloaded.load_from_disk().unwrap();
        assert_eq!(reloaded.get("i1").unwrap().state, InteractionState::Completed);
    }

    #[test]
    fn metrics_count_equals_success_plus_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("interactions"), 100);
        store.upsert(&record("i1", 1_000.0, InteractionState::Completed)).unwrap();
        store.upsert(&record("i2", 1_000.0, InteractionState::Failed)).unwrap();
        store.upsert(&record("i3", 1_000.0, InteractionState::InProgress)).unwrap();

        let summary = store.metrics(None, MetricsWindow::ThirtyDays, 2_000.0);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.error_rate, 0.5);
    }

    #[test]
    fn metrics_zero_count_yields_zero_rates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("interactions"), 100);
        let summary = store.metrics(None, MetricsWindow::OneHour, 0.0);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.error_rate, 0.0);
    }

    #[test]
    fn retention_sweep_drops_old_records_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("interactions"), 100);
        store.upsert(&record("old", 0.0, InteractionState::Completed)).unwrap();
        store.upsert(&record("new", 9_000.0, InteractionState::Completed)).unwrap();

        let dropped = store.sweep_retention(5_000.0, 10_000.0);
        assert_eq!(dropped, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("new").is_some());
    }

    #[test]
    fn history_orders_most_recent_first_and_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("interactions"), 100);
        store.upsert(&record("a", 100.0, InteractionState::Completed)).unwrap();
        store.upsert(&record("b", 300.0, InteractionState::Completed)).unwrap();
        store.upsert(&record("c", 200.0, InteractionState::Completed)).unwrap();

        let page = store.history(&HistoryFilter::default(), 2, 0);
        assert_eq!(page.iter().map(|r| r.interaction_id.clone()).collect::<Vec<_>>(), vec!["b", "c"]);
    }
}
