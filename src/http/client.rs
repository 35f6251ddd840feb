//! Instrumented outbound HTTP client.
//!
//! # Responsibilities
//! - Send requests through `reqwest`
//! - Write `RequestStart` / `RequestFailed` / `RequestStop` to the
//!   `http.client` event source
//! - Write `HttpRequestOut.Start` / `HttpRequestOut.Stop` to the
//!   `HttpHandlerDiagnosticListener` diagnostic listener
//!
//! # Design Decisions
//! - Payloads are only built when someone is listening
//! - Every start is followed by exactly one stop, success or failure
//! - Failures are returned to the caller unchanged; instrumentation never
//!   swallows or rewrites them

use std::sync::Arc;

use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::{Request, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::UpstreamConfig;
use crate::diagnostics::exchange::{version_parts, REQUEST_START_SHAPE, REQUEST_STOP_SHAPE};
use crate::diagnostics::{
    DiagnosticBus, DiagnosticListener, DiagnosticPayload, RecordedRequest, RecordedResponse,
    RequestStartData, RequestStopData, HTTP_HANDLER_LISTENER, REQUEST_OUT_START, REQUEST_OUT_STOP,
};
use crate::instrumentation::http_events::{
    RequestStartPayload, HTTP_SOURCE, REQUEST_FAILED, REQUEST_START, REQUEST_STOP,
};
use crate::instrumentation::{EventSource, HttpVersionPolicy, InstrumentationSession};
use crate::observability::metrics;

/// Errors from an outbound call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("invalid user agent '{0}'")]
    UserAgent(String),

    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// `reqwest` client that reports every call to the instrumentation session
/// and the diagnostic bus.
#[derive(Clone)]
pub struct InstrumentedClient {
    client: reqwest::Client,
    user_agent: HeaderValue,
    session: InstrumentationSession,
    http_source: EventSource,
    diagnostics: Arc<DiagnosticListener>,
}

impl InstrumentedClient {
    pub fn new(
        session: &InstrumentationSession,
        bus: &DiagnosticBus,
        config: &UpstreamConfig,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ClientError::Build)?;
        Self::with_client(client, session, bus, &config.user_agent)
    }

    pub fn with_client(
        client: reqwest::Client,
        session: &InstrumentationSession,
        bus: &DiagnosticBus,
        user_agent: &str,
    ) -> Result<Self, ClientError> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|_| ClientError::UserAgent(user_agent.to_string()))?;
        Ok(Self {
            client,
            user_agent,
            session: session.clone(),
            http_source: session.source(HTTP_SOURCE),
            diagnostics: bus.listener(HTTP_HANDLER_LISTENER),
        })
    }

    /// GET `url` and decode a JSON body. Non-success statuses are errors.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let parsed = Url::parse(url).map_err(|source| ClientError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let request = self
            .client
            .get(parsed)
            .header(USER_AGENT, self.user_agent.clone())
            .build()
            .map_err(|source| ClientError::Request {
                url: url.to_string(),
                source,
            })?;

        let response = self.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status,
            });
        }

        response.json::<T>().await.map_err(|source| ClientError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Send a prepared request, writing start and stop events around it.
    pub async fn execute(&self, request: Request) -> Result<reqwest::Response, ClientError> {
        let (activity, start_enabled) = self.begin();
        let recorded = RecordedRequest {
            method: request.method().clone(),
            uri: request.url().to_string(),
            version: request.version(),
            headers: request.headers().clone(),
        };
        self.write_start(activity, start_enabled, request.url(), &recorded);

        tracing::debug!(
            activity_id = %activity,
            method = %recorded.method,
            url = %recorded.uri,
            "Sending outbound request"
        );

        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status();
                metrics::record_upstream_request(status.as_str());
                let recorded_response = RecordedResponse {
                    status,
                    version: response.version(),
                    headers: response.headers().clone(),
                    request: recorded.clone(),
                };
                self.write_stop(activity, recorded, Some(recorded_response));
                Ok(response)
            }
            Err(source) => {
                metrics::record_upstream_request("error");
                tracing::warn!(activity_id = %activity, url = %recorded.uri, error = %source, "Outbound request failed");
                self.http_source
                    .write(activity, &REQUEST_FAILED, vec![source.to_string().into()]);
                let url = recorded.uri.clone();
                self.write_stop(activity, recorded, None);
                Err(ClientError::Request { url, source })
            }
        }
    }

    /// Activity id for a new request and whether its start event is wanted.
    ///
    /// The id is taken after the enablement check: a listener that sees the
    /// start has already enabled flow ids, so it never gets a nil id.
    fn begin(&self) -> (Uuid, bool) {
        let start_enabled = self
            .http_source
            .is_enabled(REQUEST_START.level, REQUEST_START.keywords);
        (self.session.begin_activity(), start_enabled)
    }

    fn write_start(&self, activity: Uuid, enabled: bool, url: &Url, recorded: &RecordedRequest) {
        if enabled {
            let (version_major, version_minor) = version_parts(recorded.version);
            let path_and_query = match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            };
            let payload = RequestStartPayload {
                scheme: url.scheme().to_string(),
                host: url.host_str().unwrap_or_default().to_string(),
                port: url.port_or_known_default().map(i32::from).unwrap_or(-1),
                path_and_query,
                version_major,
                version_minor,
                version_policy: HttpVersionPolicy::RequestVersionOrLower,
            };
            self.http_source
                .write(activity, &REQUEST_START, payload.encode());
        }

        if self.diagnostics.is_enabled() {
            let payload = DiagnosticPayload::new(
                REQUEST_START_SHAPE,
                RequestStartData {
                    request: recorded.clone(),
                },
            );
            self.diagnostics.write(REQUEST_OUT_START, &payload);
        }
    }

    fn write_stop(&self, activity: Uuid, request: RecordedRequest, response: Option<RecordedResponse>) {
        let status = response
            .as_ref()
            .map(|r| i32::from(r.status.as_u16()))
            .unwrap_or(-1);
        self.http_source
            .write(activity, &REQUEST_STOP, vec![status.into()]);

        if self.diagnostics.is_enabled() {
            let payload =
                DiagnosticPayload::new(REQUEST_STOP_SHAPE, RequestStopData { request, response });
            self.diagnostics.write(REQUEST_OUT_STOP, &payload);
        }
    }
}
