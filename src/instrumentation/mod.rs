//! Instrumentation subsystem.
//!
//! # Data Flow
//! ```text
//! Producer (instrumented HTTP client)
//!     → EventSource::write (session.rs)
//!     → enabled listeners only (level + keywords per source)
//!     → EventListener::on_event_written (e.g. the request correlator)
//!
//! Listener registration:
//!     InstrumentationSession::register
//!     → on_source_created for every known source
//!     → ListenerRegistration (released exactly once)
//! ```

pub mod event;
pub mod http_events;
pub mod session;
pub mod subscription;

pub use event::{
    Enablement, EventDescriptor, EventKeywords, EventLevel, EventWritten, HttpVersionPolicy,
    PayloadError, PayloadValue,
};
pub use session::{EventListener, EventSource, InstrumentationSession, ListenerRegistration, TASKS_SOURCE};
pub use subscription::Subscription;
