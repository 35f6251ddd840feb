//! Explicitly owned instrumentation session.
//!
//! # Responsibilities
//! - Keep the set of named event sources
//! - Register listeners and tell them about every source (existing and new)
//! - Track per-listener enablement and dispatch written events
//! - Hand out activity ids once a listener asked for flow correlation
//!
//! # Design Decisions
//! - One session per process, passed to whoever needs to subscribe
//! - Listener lists are published as `arc-swap` snapshots so dispatch from
//!   worker threads never takes a lock
//! - Source creation and registration share one mutex so every listener sees
//!   every source exactly once

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use uuid::Uuid;

use crate::instrumentation::event::{
    Enablement, EventDescriptor, EventKeywords, EventLevel, EventWritten, PayloadValue,
};
use crate::instrumentation::subscription::Subscription;

/// Source the runtime uses to publish task-flow information. Enabling it with
/// [`EventKeywords::TASKS_FLOW_ACTIVITY_IDS`] turns on activity ids.
pub const TASKS_SOURCE: &str = "runtime.tasks";

/// Receives source announcements and events from a session.
///
/// Callbacks run synchronously on the producing thread and must not block.
pub trait EventListener: Send + Sync {
    /// Called once per source. Returning `Some` enables that source.
    fn on_source_created(&self, source: &str) -> Option<Enablement>;

    fn on_event_written(&self, event: &EventWritten);
}

struct Registration {
    id: u64,
    listener: Arc<dyn EventListener>,
    enabled: DashMap<String, Enablement>,
}

impl Registration {
    fn discover(&self, source: &str) {
        if let Some(enablement) = self.listener.on_source_created(source) {
            self.enabled.insert(source.to_string(), enablement);
        }
    }

    fn accepts(&self, source: &str, level: EventLevel, keywords: EventKeywords) -> bool {
        self.enabled
            .get(source)
            .map(|e| e.accepts(level, keywords))
            .unwrap_or(false)
    }
}

struct SessionInner {
    sources: Mutex<Vec<Arc<str>>>,
    registrations: ArcSwap<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
}

impl SessionInner {
    fn find(&self, id: u64) -> Option<Arc<Registration>> {
        self.registrations
            .load()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    fn unregister(&self, id: u64) {
        let _sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        self.registrations.rcu(|regs| {
            regs.iter()
                .filter(|r| r.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        tracing::debug!(listener_id = id, "Event listener unregistered");
    }

    fn flow_activity_ids(&self) -> bool {
        self.registrations.load().iter().any(|r| {
            r.enabled
                .get(TASKS_SOURCE)
                .is_some_and(|e| e.keywords.contains(EventKeywords::TASKS_FLOW_ACTIVITY_IDS))
        })
    }

    fn dispatch(&self, event: &EventWritten) {
        let regs = self.registrations.load_full();
        for reg in regs.iter() {
            if reg.accepts(&event.source, event.level, event.keywords) {
                reg.listener.on_event_written(event);
            }
        }
    }
}

/// Process-wide registry of event sources and listeners.
#[derive(Clone)]
pub struct InstrumentationSession {
    inner: Arc<SessionInner>,
}

impl InstrumentationSession {
    /// Create a session exposing the runtime task source.
    pub fn new() -> Self {
        let session = Self {
            inner: Arc::new(SessionInner {
                sources: Mutex::new(Vec::new()),
                registrations: ArcSwap::from_pointee(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        };
        session.source(TASKS_SOURCE);
        session
    }

    /// Get or create a named event source.
    ///
    /// A newly created source is announced to every registered listener.
    pub fn source(&self, name: &str) -> EventSource {
        let (name, announce) = {
            let mut sources = self
                .inner
                .sources
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match sources.iter().find(|s| &***s == name) {
                Some(existing) => (existing.clone(), None),
                None => {
                    let created: Arc<str> = Arc::from(name);
                    sources.push(created.clone());
                    (created, Some(self.inner.registrations.load_full()))
                }
            }
        };

        if let Some(regs) = announce {
            tracing::debug!(source = %name, listeners = regs.len(), "Event source created");
            for reg in regs.iter() {
                reg.discover(&name);
            }
        }

        EventSource {
            name,
            session: Arc::downgrade(&self.inner),
        }
    }

    /// Register a listener. Every existing source is announced to it before
    /// this returns.
    pub fn register(&self, listener: Arc<dyn EventListener>) -> ListenerRegistration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration {
            id,
            listener,
            enabled: DashMap::new(),
        });

        let existing = {
            let sources = self
                .inner
                .sources
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.registrations.rcu(|regs| {
                let mut next = Vec::clone(regs);
                next.push(registration.clone());
                next
            });
            sources.clone()
        };

        for source in &existing {
            registration.discover(source);
        }
        tracing::debug!(listener_id = id, sources = existing.len(), "Event listener registered");

        let weak = Arc::downgrade(&self.inner);
        ListenerRegistration {
            id,
            session: weak.clone(),
            subscription: Subscription::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.unregister(id);
                }
            }),
        }
    }

    /// A fresh activity id when flow correlation was requested, nil otherwise.
    pub fn begin_activity(&self) -> Uuid {
        if self.inner.flow_activity_ids() {
            Uuid::new_v4()
        } else {
            Uuid::nil()
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registrations.load().len()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.inner
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl Default for InstrumentationSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle a producer uses to write events into a session.
#[derive(Clone)]
pub struct EventSource {
    name: Arc<str>,
    session: Weak<SessionInner>,
}

impl EventSource {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any listener would receive an event with this level and keywords.
    pub fn is_enabled(&self, level: EventLevel, keywords: EventKeywords) -> bool {
        let Some(inner) = self.session.upgrade() else {
            return false;
        };
        let regs = inner.registrations.load();
        regs.iter().any(|r| r.accepts(&self.name, level, keywords))
    }

    /// Write an event stamped with the current time.
    pub fn write(&self, activity_id: Uuid, descriptor: &EventDescriptor, payload: Vec<PayloadValue>) {
        if !self.is_enabled(descriptor.level, descriptor.keywords) {
            return;
        }
        let event = EventWritten::new(&*self.name, descriptor)
            .with_activity(activity_id)
            .with_payload(payload);
        self.write_event(event);
    }

    /// Dispatch a fully built event. The event's source is overwritten with
    /// this source's name.
    pub fn write_event(&self, mut event: EventWritten) {
        let Some(inner) = self.session.upgrade() else {
            return;
        };
        if *event.source != *self.name {
            event.source = self.name.to_string();
        }
        inner.dispatch(&event);
    }
}

/// A listener's registration with a session.
pub struct ListenerRegistration {
    id: u64,
    session: Weak<SessionInner>,
    subscription: Subscription,
}

impl ListenerRegistration {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enable (or re-enable) a source for this listener. Enabling again
    /// replaces the previous level and keywords.
    pub fn enable_events(&self, source: &str, level: EventLevel, keywords: EventKeywords) {
        if let Some(reg) = self.session.upgrade().and_then(|inner| inner.find(self.id)) {
            reg.enabled
                .insert(source.to_string(), Enablement::new(level, keywords));
        }
    }

    pub fn disable_events(&self, source: &str) {
        if let Some(reg) = self.session.upgrade().and_then(|inner| inner.find(self.id)) {
            reg.enabled.remove(source);
        }
    }

    /// Unregister from the session. Safe to call more than once.
    pub fn release(&self) {
        self.subscription.release();
    }

    pub fn is_released(&self) -> bool {
        self.subscription.is_released()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const TICK: EventDescriptor = EventDescriptor {
        id: 1,
        name: "Tick",
        level: EventLevel::Informational,
        keywords: EventKeywords::NONE,
    };

    #[derive(Default)]
    struct Recorder {
        wanted: Vec<&'static str>,
        announced: Mutex<Vec<String>>,
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn wanting(sources: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                wanted: sources.to_vec(),
                ..Default::default()
            })
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventListener for Recorder {
        fn on_source_created(&self, source: &str) -> Option<Enablement> {
            self.announced.lock().unwrap().push(source.to_string());
            self.wanted
                .contains(&source)
                .then(|| Enablement::new(EventLevel::Informational, EventKeywords::ALL))
        }

        fn on_event_written(&self, event: &EventWritten) {
            self.events.lock().unwrap().push(event.to_string());
        }
    }

    #[test]
    fn test_sources_announced_before_and_after_register() {
        let session = InstrumentationSession::new();
        session.source("early");

        let recorder = Recorder::wanting(&[]);
        let _reg = session.register(recorder.clone());
        session.source("late");
        session.source("late");

        let announced = recorder.announced.lock().unwrap().clone();
        assert_eq!(announced, vec![TASKS_SOURCE, "early", "late"]);
    }

    #[test]
    fn test_only_enabled_sources_delivered() {
        let session = InstrumentationSession::new();
        let recorder = Recorder::wanting(&["wanted"]);
        let _reg = session.register(recorder.clone());

        session.source("wanted").write(Uuid::nil(), &TICK, vec![]);
        session.source("other").write(Uuid::nil(), &TICK, vec![]);

        assert_eq!(recorder.events(), vec!["wanted/Tick(1)"]);
    }

    #[test]
    fn test_enable_twice_is_idempotent() {
        let session = InstrumentationSession::new();
        let recorder = Recorder::wanting(&[]);
        let reg = session.register(recorder.clone());
        let source = session.source("http");

        reg.enable_events("http", EventLevel::Informational, EventKeywords::ALL);
        reg.enable_events("http", EventLevel::Informational, EventKeywords::ALL);
        source.write(Uuid::nil(), &TICK, vec![]);

        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn test_disable_events_stops_one_source() {
        let session = InstrumentationSession::new();
        let recorder = Recorder::wanting(&[]);
        let reg = session.register(recorder.clone());
        let http = session.source("http");
        let db = session.source("db");

        reg.enable_events("http", EventLevel::Informational, EventKeywords::ALL);
        reg.enable_events("db", EventLevel::Informational, EventKeywords::ALL);
        reg.disable_events("http");
        reg.disable_events("http");

        assert!(!http.is_enabled(EventLevel::Informational, EventKeywords::NONE));
        http.write(Uuid::nil(), &TICK, vec![]);
        db.write(Uuid::nil(), &TICK, vec![]);

        assert_eq!(recorder.events(), vec!["db/Tick(1)"]);
        assert_eq!(session.listener_count(), 1);
    }

    #[test]
    fn test_release_stops_delivery() {
        let session = InstrumentationSession::new();
        let recorder = Recorder::wanting(&["wanted"]);
        let reg = session.register(recorder.clone());
        let source = session.source("wanted");

        source.write(Uuid::nil(), &TICK, vec![]);
        reg.release();
        reg.release();
        source.write(Uuid::nil(), &TICK, vec![]);

        assert_eq!(recorder.events().len(), 1);
        assert_eq!(session.listener_count(), 0);
        assert!(!source.is_enabled(EventLevel::Informational, EventKeywords::NONE));
    }

    #[test]
    fn test_activity_ids_follow_flow_keyword() {
        let session = InstrumentationSession::new();
        assert!(session.begin_activity().is_nil());

        let recorder = Recorder::wanting(&[]);
        let reg = session.register(recorder);
        reg.enable_events(
            TASKS_SOURCE,
            EventLevel::LogAlways,
            EventKeywords::TASKS_FLOW_ACTIVITY_IDS,
        );

        let a = session.begin_activity();
        let b = session.begin_activity();
        assert!(!a.is_nil());
        assert_ne!(a, b);

        drop(reg);
        assert!(session.begin_activity().is_nil());
    }
}
