//! The two request observers.
//!
//! # Data Flow
//! ```text
//! InstrumentationSession ── "http.client" events ──▶ correlator.rs (HttpEventListener)
//!                                                        → "<id> RequestStart <url> HTTP/1.1"
//!                                                        → "<url> executed in 12.3ms"
//!                                                        → "<id> RequestStop"
//!
//! DiagnosticBus ── "HttpHandlerDiagnosticListener" ──▶ tap.rs (DiagnosticTap)
//!                                                        → "GET <uri> 1.1 (UserAgent: ..)"
//!                                                        → "200 <uri>"
//! ```
//!
//! Neither observer knows about the other. Both are installed around a
//! single outbound call and torn down afterwards.

pub mod correlator;
pub mod tap;

pub use correlator::{CorrelationRecord, HttpEventListener};
pub use tap::{DiagnosticTap, HttpRequestsObserver, TapAccessors};
