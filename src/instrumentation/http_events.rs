//! Events written by the outbound HTTP client source.

use crate::instrumentation::event::{
    EventDescriptor, EventKeywords, EventLevel, EventWritten, HttpVersionPolicy, PayloadError,
    PayloadValue,
};

/// Name of the outbound HTTP client event source.
pub const HTTP_SOURCE: &str = "http.client";

pub const REQUEST_START: EventDescriptor = EventDescriptor {
    id: 1,
    name: "RequestStart",
    level: EventLevel::Informational,
    keywords: EventKeywords::NONE,
};

/// Payload: `[status_code: i32]`, `-1` when no response was received.
pub const REQUEST_STOP: EventDescriptor = EventDescriptor {
    id: 2,
    name: "RequestStop",
    level: EventLevel::Informational,
    keywords: EventKeywords::NONE,
};

/// Payload: `[message: string]`. Always followed by a `RequestStop`.
pub const REQUEST_FAILED: EventDescriptor = EventDescriptor {
    id: 3,
    name: "RequestFailed",
    level: EventLevel::Error,
    keywords: EventKeywords::NONE,
};

/// Decoded `RequestStart` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStartPayload {
    pub scheme: String,
    pub host: String,
    pub port: i32,
    pub path_and_query: String,
    pub version_major: u8,
    pub version_minor: u8,
    pub version_policy: HttpVersionPolicy,
}

impl RequestStartPayload {
    /// Decode the seven positional fields of a start event.
    pub fn decode(event: &EventWritten) -> Result<Self, PayloadError> {
        Ok(Self {
            scheme: event.str_at(0)?.to_string(),
            host: event.str_at(1)?.to_string(),
            port: event.i32_at(2)?,
            path_and_query: event.str_at(3)?.to_string(),
            version_major: event.u8_at(4)?,
            version_minor: event.u8_at(5)?,
            version_policy: event.version_policy_at(6)?,
        })
    }

    pub fn encode(&self) -> Vec<PayloadValue> {
        vec![
            self.scheme.as_str().into(),
            self.host.as_str().into(),
            self.port.into(),
            self.path_and_query.as_str().into(),
            self.version_major.into(),
            self.version_minor.into(),
            self.version_policy.into(),
        ]
    }

    /// `scheme://host:port/path?query`, port always explicit.
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, self.path_and_query
        )
    }
}
