//! Shared application state wired together at startup and handed to every
//! axum handler via `State`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use coordinator_auth::CredentialValidator;
use coordinator_auth::StaticTokenTable;
use coordinator_core::{Clock, SystemClock};
use coordinator_log::{IngestionApi, InteractionQueue, LogProcessor, QueryApi, Store};
use coordinator_registry::{store::run_periodic_snapshot, HealthMonitor, RegistryError, RegistryStore};
use coordinator_routing::{Cascade, Dispatcher, RoutingEngine};
use tracing::{info, warn};

use crate::config::CoordinatorConfig;
use crate::crash;

/// Snapshot cadence (spec §4.3: "periodic snapshot every 30s and at
/// shutdown").
const SNAPSHOT_PERIOD: Duration = Duration::from_secs(30);
/// Retention sweeper cadence; daily is enough for a day-granularity policy.
const RETENTION_SWEEP_PERIOD: Duration = Duration::from_secs(3_600);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CoordinatorConfig>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<RegistryStore>,
    pub health: Arc<HealthMonitor>,
    pub cascade: Arc<Cascade>,
    pub validator: Arc<CredentialValidator>,
    pub ingest: Arc<IngestionApi>,
    pub queue: Arc<InteractionQueue>,
    pub query: Arc<QueryApi>,
    pub started_at: f64,
}

impl AppState {
    /// Build every component, load durable state from disk, and return the
    /// handle plus the background task handles a caller should keep alive
    /// for the life of the process (health sweeper, periodic snapshot, log
    /// processor drain loop, retention sweeper).
    pub fn bootstrap(config: CoordinatorConfig) -> (Self, Vec<tokio::task::JoinHandle<()>>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = Arc::new(config);

        let registry = Arc::new(RegistryStore::new(clock.clone()));
        match registry.load_snapshot_from_file(&config.snapshot_path) {
            Ok(0) => info!("no registry snapshot found, starting with an empty registry"),
            Ok(n) => info!(loaded = n, "loaded registry snapshot"),
            Err(e @ RegistryError::SnapshotSerde(_)) => {
                // The snapshot file exists but does not parse: an impossible
                // state per spec §7 ("corrupt snapshot"), not a missing-file
                // case — fatal rather than silently starting empty.
                crash::persist_and_exit(&config.store_path, "corrupt_registry_snapshot", &e.to_string());
            }
            Err(e) => warn!(error = %e, "failed to load registry snapshot, starting empty"),
        }

        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            config.heartbeat_soft,
            config.heartbeat_hard,
            clock.clone(),
        ));

        let engine = RoutingEngine::new(registry.clone(), clock.clone());
        let dispatcher = Dispatcher::new();
        let cascade = Arc::new(Cascade::new(registry.clone(), engine, dispatcher, clock.clone()));

        let static_tokens = load_static_tokens(config.static_tokens_path.as_deref());
        let validator = Arc::new(CredentialValidator::new(static_tokens, config.master_secret.clone(), clock.clone()));

        let queue = Arc::new(InteractionQueue::new(config.ingest_queue_cap));
        let ingest = Arc::new(IngestionApi::new(queue.clone(), clock.clone()));

        let store = Arc::new(Store::new(config.store_path.clone(), coordinator_log::store::DEFAULT_CACHE_CAPACITY));
        match store.load_from_disk() {
            Ok(n) => info!(loaded = n, "loaded interaction store from disk"),
            Err(e) => warn!(error = %e, "failed to load interaction store, starting empty"),
        }
        let query = Arc::new(QueryApi::new(store.clone(), clock.clone()));

        let dead_letter_dir: PathBuf = config.store_path.clone();
        let processor = Arc::new(LogProcessor::new(store, registry.clone(), dead_letter_dir, clock.clone()));

        let mut handles = Vec::new();

        handles.push(tokio::spawn(health.clone().run_sweeper()));
        handles.push(tokio::spawn(validator.clone().run_limiter_sweeper()));
        handles.push(tokio::spawn(run_periodic_snapshot(
            registry.clone(),
            config.snapshot_path.clone(),
            SNAPSHOT_PERIOD,
        )));

        let receiver = queue.take_receiver();
        handles.push(tokio::spawn(processor.clone().run(receiver)));
        handles.push(tokio::spawn(processor.run_retention_sweeper(config.retention, RETENTION_SWEEP_PERIOD)));

        let started_at = clock.wall();
        let state = Self {
            config,
            clock,
            registry,
            health,
            cascade,
            validator,
            ingest,
            queue,
            query,
            started_at,
        };

        (state, handles)
    }

    /// Write a final registry snapshot. Called on graceful shutdown (spec
    /// §4.3: "at shutdown").
    pub fn final_snapshot(&self) {
        if let Err(e) = self.registry.snapshot_to_file(&self.config.snapshot_path) {
            warn!(error = %e, "final registry snapshot failed");
        } else {
            info!("final registry snapshot written");
        }
    }
}

fn load_static_tokens(path: Option<&std::path::Path>) -> StaticTokenTable {
    let Some(path) = path else {
        return StaticTokenTable::default();
    };
    match std::fs::read_to_string(path) {
        Ok(raw) => match StaticTokenTable::load_from_str(&raw) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "failed to parse static token table, starting with none");
                StaticTokenTable::default()
            }
        },
        Err(e) => {
            warn!(error = %e, path = %path.display(), "failed to read static token table, starting with none");
            StaticTokenTable::default()
        }
    }
}
