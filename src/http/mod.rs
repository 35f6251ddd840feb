//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → server.rs (Axum router, trace + timeout layers)
//!     → handlers.rs (install one observer for the duration of the call)
//!     → client.rs (instrumented outbound GET, events to session + bus)
//!     → handlers.rs (decoded Todo as JSON, or error.rs mapping)
//! ```

pub mod client;
pub mod error;
pub mod handlers;
pub mod server;

pub use client::{ClientError, InstrumentedClient};
pub use error::AppError;
pub use handlers::Todo;
pub use server::{AppState, HttpServer, ServerError};
