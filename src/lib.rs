//! Outbound HTTP request observers.
//!
//! Two independent ways of watching an outbound call:
//! - [`observers::HttpEventListener`] correlates start/stop events from the
//!   [`instrumentation::InstrumentationSession`] and times each request
//! - [`observers::DiagnosticTap`] decodes request/response payloads from the
//!   [`diagnostics::DiagnosticBus`]
//!
//! [`http::InstrumentedClient`] publishes into both, and [`http::HttpServer`]
//! exposes one demo endpoint per observer.

pub mod config;
pub mod diagnostics;
pub mod http;
pub mod instrumentation;
pub mod lifecycle;
pub mod observability;
pub mod observers;

pub use config::ObserverConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
