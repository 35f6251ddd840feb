//! Diagnostic bus subsystem.
//!
//! # Data Flow
//! ```text
//! Producer (instrumented HTTP client)
//!     → DiagnosticBus::listener("HttpHandlerDiagnosticListener")
//!     → DiagnosticListener::write(key, DiagnosticPayload)
//!     → DiagnosticObserver::on_next (e.g. the diagnostic tap)
//!     → FieldAccessor::get → &dyn HttpExchange
//! ```
//!
//! # Design Decisions
//! - Observers depend on the `HttpExchange` capability, never on concrete
//!   payload types; `exchange.rs` is the only adapter that knows them
//! - Accessors are resolved when an observer is built, so a payload contract
//!   change fails at startup rather than per event

pub mod accessor;
pub mod bus;
pub mod exchange;

pub use accessor::{AccessorError, FieldAccessor, PayloadShapes};
pub use bus::{BusObserver, DiagnosticBus, DiagnosticListener, DiagnosticObserver, DiagnosticPayload};
pub use exchange::{HttpExchange, RecordedRequest, RecordedResponse, RequestStartData, RequestStopData};

/// Listener the instrumented HTTP client writes request lifecycle events to.
pub const HTTP_HANDLER_LISTENER: &str = "HttpHandlerDiagnosticListener";

/// Key of the event written before a request is sent.
pub const REQUEST_OUT_START: &str = "HttpRequestOut.Start";

/// Key of the event written once a request completes or fails.
pub const REQUEST_OUT_STOP: &str = "HttpRequestOut.Stop";
