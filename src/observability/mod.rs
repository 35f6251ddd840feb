//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Observers produce:
//!     → console.rs (one human-readable line per lifecycle event)
//!     → metrics.rs (request durations, orphan stops)
//!
//! Everything else produces:
//!     → logging.rs (structured tracing events)
//! ```
//!
//! # Design Decisions
//! - Observer output goes through a `LineSink` so it can be captured in tests
//! - Structured logs and observer lines are separate streams
//! - Metrics are optional; the recorder is only installed when enabled

pub mod console;
pub mod logging;
pub mod metrics;

pub use console::{sink_for, ConsoleSink, LineSink, MemorySink, TracingSink};
