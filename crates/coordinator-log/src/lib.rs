//! Interaction Log Pipeline: the Ingestion API (C7), the bounded Interaction
//! Queue (C8), the batch Log Processor (C9), the durable/cached Store, and
//! the read-only Query API (C10).
//!
//! Wiring: `IngestionApi::submit` validates and enqueues onto
//! `InteractionQueue`; `LogProcessor::run` is the queue's single consumer,
//! draining batches and writing them through to `Store`; `QueryApi` reads
//! `Store` directly. See spec §4.7-§4.10.

pub mod error;
pub mod ingest;
pub mod processor;
pub mod queue;
pub mod query;
pub mod store;
pub mod types;

pub use error::LogError;
pub use ingest::{IngestOutcome, IngestionApi};
pub use processor::LogProcessor;
pub use queue::InteractionQueue;
pub use query::QueryApi;
pub use store::Store;
pub use types::{HistoryFilter, InteractionEvent, MetricsSummary, MetricsWindow};
