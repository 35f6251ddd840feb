//! Request correlator: times outbound calls from start/stop events.
//!
//! # Responsibilities
//! - Enable the HTTP client source and the task source (for activity ids)
//! - Remember the URL and start time of each in-flight request by activity id
//! - Print one line per start, and a timing line plus a stop line per stop
//!
//! # Design Decisions
//! - Records live in a `DashMap` keyed by activity id, so concurrent requests
//!   on different tasks never see each other's start time
//! - A stop without a start is still printed, just without timing
//! - Starts sweep records older than the stale bound so lost stops cannot
//!   grow the map without limit

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::instrumentation::http_events::{
    RequestStartPayload, HTTP_SOURCE, REQUEST_START, REQUEST_STOP,
};
use crate::instrumentation::{
    Enablement, EventKeywords, EventLevel, EventListener, EventWritten, InstrumentationSession,
    ListenerRegistration, TASKS_SOURCE,
};
use crate::observability::{metrics, LineSink};

/// In-flight request, created on start and consumed on stop.
#[derive(Debug, Clone)]
pub struct CorrelationRecord {
    pub url: String,
    pub host: String,
    pub started: Instant,
}

struct Correlator {
    active: AtomicBool,
    records: DashMap<Uuid, CorrelationRecord>,
    stale_after: Duration,
    sink: Arc<dyn LineSink>,
}

impl Correlator {
    fn on_start(&self, event: &EventWritten) {
        let start = match RequestStartPayload::decode(event) {
            Ok(start) => start,
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Undecodable request start payload");
                return;
            }
        };

        self.sweep(event.timestamp);

        let url = start.url();
        self.records.insert(
            event.activity_id,
            CorrelationRecord {
                url: url.clone(),
                host: start.host.clone(),
                started: event.timestamp,
            },
        );
        self.sink.write_line(&format!(
            "{} {} {} HTTP/{}.{}",
            event.activity_id, event.event_name, url, start.version_major, start.version_minor
        ));
    }

    fn on_stop(&self, event: &EventWritten) {
        match self.records.remove(&event.activity_id) {
            Some((_, record)) => {
                let elapsed = event.timestamp.saturating_duration_since(record.started);
                metrics::record_request_duration(&record.host, elapsed);
                self.sink.write_line(&format!(
                    "{} executed in {:.1}ms",
                    record.url,
                    elapsed.as_secs_f64() * 1000.0
                ));
            }
            None => {
                tracing::debug!(activity_id = %event.activity_id, "Request stop without matching start");
                metrics::record_orphan_stop();
            }
        }
        self.sink
            .write_line(&format!("{} {}", event.activity_id, event.event_name));
    }

    fn sweep(&self, now: Instant) {
        let before = self.records.len();
        self.records
            .retain(|_, r| now.saturating_duration_since(r.started) < self.stale_after);
        let swept = before.saturating_sub(self.records.len());
        if swept > 0 {
            tracing::debug!(swept, "Dropped stale correlation records");
            metrics::record_stale_records(swept);
        }
    }
}

impl EventListener for Correlator {
    fn on_source_created(&self, source: &str) -> Option<Enablement> {
        match source {
            HTTP_SOURCE => Some(Enablement::new(EventLevel::Informational, EventKeywords::ALL)),
            TASKS_SOURCE => Some(Enablement::new(
                EventLevel::LogAlways,
                EventKeywords::TASKS_FLOW_ACTIVITY_IDS,
            )),
            _ => None,
        }
    }

    fn on_event_written(&self, event: &EventWritten) {
        if !self.active.load(Ordering::Acquire) || event.source != HTTP_SOURCE {
            return;
        }
        match event.event_id {
            id if id == REQUEST_START.id => self.on_start(event),
            id if id == REQUEST_STOP.id => self.on_stop(event),
            _ => {}
        }
    }
}

/// An enabled request correlator. Disabled on drop.
pub struct HttpEventListener {
    correlator: Arc<Correlator>,
    registration: ListenerRegistration,
}

impl HttpEventListener {
    /// Register with the session and start correlating.
    pub fn enable(
        session: &InstrumentationSession,
        sink: Arc<dyn LineSink>,
        stale_after: Duration,
    ) -> Self {
        let correlator = Arc::new(Correlator {
            active: AtomicBool::new(true),
            records: DashMap::new(),
            stale_after,
            sink,
        });
        let registration = session.register(correlator.clone());
        tracing::debug!(listener_id = registration.id(), "Request correlator enabled");
        Self {
            correlator,
            registration,
        }
    }

    /// Stop receiving events and forget every in-flight record.
    pub fn disable(&self) {
        if self.correlator.active.swap(false, Ordering::AcqRel) {
            self.registration.release();
            self.correlator.records.clear();
            tracing::debug!(listener_id = self.registration.id(), "Request correlator disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.correlator.active.load(Ordering::Acquire)
    }

    /// Number of starts still waiting for a stop.
    pub fn in_flight(&self) -> usize {
        self.correlator.records.len()
    }
}

impl Drop for HttpEventListener {
    fn drop(&mut self) {
        self.disable();
    }
}
