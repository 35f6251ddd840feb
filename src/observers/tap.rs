//! Diagnostic tap: prints request/response lines from the HTTP handler
//! sub-stream of the diagnostic bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::diagnostics::exchange::{version_label, REQUEST_START_SHAPE, REQUEST_STOP_SHAPE};
use crate::diagnostics::{
    AccessorError, BusObserver, DiagnosticBus, DiagnosticListener, DiagnosticObserver,
    DiagnosticPayload, FieldAccessor, PayloadShapes, HTTP_HANDLER_LISTENER, REQUEST_OUT_START,
    REQUEST_OUT_STOP,
};
use crate::instrumentation::Subscription;
use crate::observability::LineSink;

/// Accessors the tap needs, resolved once at startup.
#[derive(Debug, Clone, Copy)]
pub struct TapAccessors {
    request: FieldAccessor,
    response: FieldAccessor,
}

impl TapAccessors {
    /// Fails if the registered payload shapes do not expose the request and
    /// response fields.
    pub fn resolve(shapes: &PayloadShapes) -> Result<Self, AccessorError> {
        Ok(Self {
            request: shapes.accessor(REQUEST_START_SHAPE, "request")?,
            response: shapes.accessor(REQUEST_STOP_SHAPE, "response")?,
        })
    }
}

struct HttpHandlerTap {
    accessors: TapAccessors,
    sink: Arc<dyn LineSink>,
}

impl DiagnosticObserver for HttpHandlerTap {
    fn on_next(&self, key: &str, payload: &DiagnosticPayload) {
        match key {
            REQUEST_OUT_START => match self.accessors.request.get(payload) {
                Some(request) => self.sink.write_line(&format!(
                    "{} {} {} (UserAgent: {})",
                    request.method(),
                    request.uri(),
                    version_label(request.version()),
                    request.user_agent()
                )),
                None => tracing::debug!(key, shape = payload.shape(), "Start payload has no request"),
            },
            REQUEST_OUT_STOP => match self.accessors.response.get(payload) {
                Some(response) => {
                    let status = response.status().map(|s| s.as_u16()).unwrap_or_default();
                    self.sink
                        .write_line(&format!("{} {}", status, response.uri()));
                }
                None => tracing::debug!(key, shape = payload.shape(), "Stop payload has no response"),
            },
            _ => {}
        }
    }
}

/// Bus observer that subscribes to the HTTP handler listener once.
pub struct HttpRequestsObserver {
    handler: Arc<HttpHandlerTap>,
    subscription: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

impl HttpRequestsObserver {
    pub fn new(accessors: TapAccessors, sink: Arc<dyn LineSink>) -> Self {
        Self {
            handler: Arc::new(HttpHandlerTap { accessors, sink }),
            subscription: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.is_released())
    }

    /// Drop the sub-stream subscription. Listeners announced afterwards are
    /// not subscribed to.
    pub fn release(&self) {
        let subscription = {
            let mut slot = self
                .subscription
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.disposed.store(true, Ordering::Release);
            slot.take()
        };
        if let Some(subscription) = subscription {
            subscription.release();
        }
    }
}

impl BusObserver for HttpRequestsObserver {
    fn on_listener(&self, listener: &Arc<DiagnosticListener>) {
        if listener.name() != HTTP_HANDLER_LISTENER {
            return;
        }
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The bus may still announce from a snapshot taken before release.
        if slot.is_none() && !self.disposed.load(Ordering::Acquire) {
            *slot = Some(listener.subscribe(self.handler.clone()));
            tracing::debug!(listener = listener.name(), "Diagnostic tap subscribed");
        }
    }
}

impl Drop for HttpRequestsObserver {
    fn drop(&mut self) {
        self.release();
    }
}

/// An installed diagnostic tap. Uninstalled on drop.
pub struct DiagnosticTap {
    observer: Arc<HttpRequestsObserver>,
    bus_subscription: Subscription,
}

impl DiagnosticTap {
    /// Subscribe a new tap to the bus. The HTTP handler listener is picked up
    /// immediately if it already exists, otherwise as soon as it is created.
    pub fn install(bus: &DiagnosticBus, accessors: TapAccessors, sink: Arc<dyn LineSink>) -> Self {
        let observer = Arc::new(HttpRequestsObserver::new(accessors, sink));
        let bus_subscription = bus.subscribe(observer.clone());
        Self {
            observer,
            bus_subscription,
        }
    }

    /// Release the bus subscription and the sub-stream subscription.
    pub fn dispose(&self) {
        self.bus_subscription.release();
        self.observer.release();
    }

    pub fn is_subscribed(&self) -> bool {
        self.observer.is_subscribed()
    }
}

impl Drop for DiagnosticTap {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{RecordedRequest, RecordedResponse, RequestStartData, RequestStopData};
    use crate::observability::MemorySink;
    use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
    use reqwest::{Method, StatusCode, Version};

    fn request() -> RecordedRequest {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("tap-test/0.1"));
        RecordedRequest {
            method: Method::GET,
            uri: "https://example.com/todos/1".into(),
            version: Version::HTTP_11,
            headers,
        }
    }

    fn start_payload() -> DiagnosticPayload {
        DiagnosticPayload::new(REQUEST_START_SHAPE, RequestStartData { request: request() })
    }

    fn stop_payload(response: bool) -> DiagnosticPayload {
        DiagnosticPayload::new(
            REQUEST_STOP_SHAPE,
            RequestStopData {
                request: request(),
                response: response.then(|| RecordedResponse {
                    status: StatusCode::OK,
                    version: Version::HTTP_11,
                    headers: HeaderMap::new(),
                    request: request(),
                }),
            },
        )
    }

    fn accessors() -> TapAccessors {
        TapAccessors::resolve(&PayloadShapes::builtin()).unwrap()
    }

    #[test]
    fn test_start_then_stop_lines_in_order() {
        let bus = DiagnosticBus::new();
        let sink = MemorySink::new();
        let _tap = DiagnosticTap::install(&bus, accessors(), Arc::new(sink.clone()));
        let listener = bus.listener(HTTP_HANDLER_LISTENER);

        listener.write(REQUEST_OUT_START, &start_payload());
        listener.write(REQUEST_OUT_STOP, &stop_payload(true));

        assert_eq!(
            sink.lines(),
            vec![
                "GET https://example.com/todos/1 1.1 (UserAgent: tap-test/0.1)",
                "200 https://example.com/todos/1",
            ]
        );
    }

    #[test]
    fn test_other_listeners_and_keys_ignored() {
        let bus = DiagnosticBus::new();
        let other = bus.listener("Microsoft.AspNetCore");
        let sink = MemorySink::new();
        let tap = DiagnosticTap::install(&bus, accessors(), Arc::new(sink.clone()));
        assert!(!other.is_enabled());
        assert!(!tap.is_subscribed());

        let listener = bus.listener(HTTP_HANDLER_LISTENER);
        assert!(tap.is_subscribed());
        listener.write("HttpRequestOut.Exception", &start_payload());
        listener.write(REQUEST_OUT_STOP, &stop_payload(false));

        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_subscribes_only_once() {
        let bus = DiagnosticBus::new();
        let listener = bus.listener(HTTP_HANDLER_LISTENER);
        let observer = Arc::new(HttpRequestsObserver::new(accessors(), Arc::new(MemorySink::new())));

        observer.on_listener(&listener);
        observer.on_listener(&listener);

        assert_eq!(listener.subscriber_count(), 1);
    }

    #[test]
    fn test_dispose_mid_flight() {
        let bus = DiagnosticBus::new();
        let listener = bus.listener(HTTP_HANDLER_LISTENER);
        let sink = MemorySink::new();
        let tap = DiagnosticTap::install(&bus, accessors(), Arc::new(sink.clone()));

        listener.write(REQUEST_OUT_START, &start_payload());
        tap.dispose();
        tap.dispose();
        listener.write(REQUEST_OUT_STOP, &stop_payload(true));
        drop(tap);

        assert_eq!(sink.lines().len(), 1);
        assert!(!listener.is_enabled());
        assert_eq!(bus.observer_count(), 0);
    }

    struct DisposeOnAnnounce {
        tap: Mutex<Option<Arc<DiagnosticTap>>>,
    }

    impl BusObserver for DisposeOnAnnounce {
        fn on_listener(&self, _listener: &Arc<DiagnosticListener>) {
            if let Some(tap) = self.tap.lock().unwrap().as_ref() {
                tap.dispose();
            }
        }
    }

    #[test]
    fn test_no_subscription_after_dispose_during_announcement() {
        let bus = DiagnosticBus::new();
        let sink = MemorySink::new();
        let disposer = Arc::new(DisposeOnAnnounce {
            tap: Mutex::new(None),
        });
        let _disposer_sub = bus.subscribe(disposer.clone());
        let tap = Arc::new(DiagnosticTap::install(&bus, accessors(), Arc::new(sink.clone())));
        *disposer.tap.lock().unwrap() = Some(tap.clone());

        // Announced from a snapshot that still holds the tap.
        let listener = bus.listener(HTTP_HANDLER_LISTENER);
        listener.write(REQUEST_OUT_START, &start_payload());

        assert!(!tap.is_subscribed());
        assert_eq!(listener.subscriber_count(), 0);
        assert!(sink.lines().is_empty());
        disposer.tap.lock().unwrap().take();
    }

    #[test]
    fn test_missing_shape_fails_resolution() {
        let mut shapes = PayloadShapes::new();
        shapes.register(REQUEST_START_SHAPE, "request", |_| None);
        assert_eq!(
            TapAccessors::resolve(&shapes).unwrap_err(),
            AccessorError::UnknownShape(REQUEST_STOP_SHAPE.into())
        );
    }
}
