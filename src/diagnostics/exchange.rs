//! The HTTP exchange decoding capability and the client's payload types.
//!
//! Payloads on the diagnostic bus are opaque. Observers never downcast them
//! directly; they go through a [`FieldAccessor`](crate::diagnostics::FieldAccessor)
//! that resolves one named field of one versioned payload shape to an
//! [`HttpExchange`]. Everything that knows the concrete payload layout lives
//! in this file.

use std::any::Any;

use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::{Method, StatusCode, Version};

use crate::diagnostics::accessor::PayloadShapes;

/// Shape of the payload written with the request-start key.
pub const REQUEST_START_SHAPE: &str = "http.request_out.start/v1";

/// Shape of the payload written with the request-stop key.
pub const REQUEST_STOP_SHAPE: &str = "http.request_out.stop/v1";

/// Read-only view of one side of an outbound HTTP exchange.
pub trait HttpExchange: Send + Sync {
    fn method(&self) -> &Method;

    /// Absolute URI of the originating request.
    fn uri(&self) -> &str;

    fn version(&self) -> Version;

    fn headers(&self) -> &HeaderMap;

    /// `None` for the request side.
    fn status(&self) -> Option<StatusCode>;

    fn user_agent(&self) -> &str {
        self.headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// Major and minor version numbers.
pub fn version_parts(version: Version) -> (u8, u8) {
    if version == Version::HTTP_09 {
        (0, 9)
    } else if version == Version::HTTP_10 {
        (1, 0)
    } else if version == Version::HTTP_2 {
        (2, 0)
    } else if version == Version::HTTP_3 {
        (3, 0)
    } else {
        (1, 1)
    }
}

/// `major.minor`, e.g. `1.1`.
pub fn version_label(version: Version) -> String {
    let (major, minor) = version_parts(version);
    format!("{major}.{minor}")
}

/// Snapshot of a request as it was sent.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub version: Version,
    pub headers: HeaderMap,
}

/// Snapshot of a received response head.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub request: RecordedRequest,
}

impl HttpExchange for RecordedRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn version(&self) -> Version {
        self.version
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn status(&self) -> Option<StatusCode> {
        None
    }
}

impl HttpExchange for RecordedResponse {
    fn method(&self) -> &Method {
        &self.request.method
    }

    fn uri(&self) -> &str {
        &self.request.uri
    }

    fn version(&self) -> Version {
        self.version
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn status(&self) -> Option<StatusCode> {
        Some(self.status)
    }
}

/// Payload of [`REQUEST_START_SHAPE`].
#[derive(Debug, Clone)]
pub struct RequestStartData {
    pub request: RecordedRequest,
}

/// Payload of [`REQUEST_STOP_SHAPE`]. `response` is `None` when the request
/// failed before a response head arrived.
#[derive(Debug, Clone)]
pub struct RequestStopData {
    pub request: RecordedRequest,
    pub response: Option<RecordedResponse>,
}

fn start_request(value: &(dyn Any + Send + Sync)) -> Option<&dyn HttpExchange> {
    value
        .downcast_ref::<RequestStartData>()
        .map(|data| &data.request as &dyn HttpExchange)
}

fn stop_request(value: &(dyn Any + Send + Sync)) -> Option<&dyn HttpExchange> {
    value
        .downcast_ref::<RequestStopData>()
        .map(|data| &data.request as &dyn HttpExchange)
}

fn stop_response(value: &(dyn Any + Send + Sync)) -> Option<&dyn HttpExchange> {
    value
        .downcast_ref::<RequestStopData>()
        .and_then(|data| data.response.as_ref())
        .map(|response| response as &dyn HttpExchange)
}

/// Register the fields of the instrumented client's payloads.
pub fn register_client_shapes(shapes: &mut PayloadShapes) {
    shapes.register(REQUEST_START_SHAPE, "request", start_request);
    shapes.register(REQUEST_STOP_SHAPE, "request", stop_request);
    shapes.register(REQUEST_STOP_SHAPE, "response", stop_response);
}
