//! Routing Engine (C5) and Dispatcher (C6): scores and orders registered
//! MCPs for a routing request, then drives the dispatch cascade across them.

pub mod breaker;
pub mod cascade;
pub mod dispatcher;
pub mod engine;
pub mod scoring;

pub use cascade::{Cascade, CascadeSuccess};
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher};
pub use engine::RoutingEngine;
