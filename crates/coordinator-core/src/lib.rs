//! Shared primitives for the MCP Coordination Core: the monotonic clock and
//! ID minter (C1), the wire data model (MCP Descriptor, Interaction Record,
//! Routing Request), the coordinator-wide error taxonomy, and the response
//! envelope every HTTP surface returns.

pub mod clock;
pub mod envelope;
pub mod error;
pub mod model;

pub use clock::{Clock, FakeClock, SystemClock};
pub use envelope::Envelope;
pub use error::{CoordError, CoordResult, ErrorKind, TrailEntry};
