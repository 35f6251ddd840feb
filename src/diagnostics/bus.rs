//! Generic keyed diagnostic bus.
//!
//! # Responsibilities
//! - Own the set of named diagnostic listeners (sub-streams)
//! - Announce every listener, existing and future, to bus observers
//! - Deliver `(key, payload)` pairs to a listener's subscribers
//!
//! # Design Decisions
//! - The bus is an explicit object, not ambient global state
//! - Payloads are opaque (`Any`) and tagged with a versioned shape name
//! - Subscriber lists are `arc-swap` snapshots; writes never lock

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::instrumentation::Subscription;

/// Opaque payload tagged with the name of its shape.
#[derive(Clone)]
pub struct DiagnosticPayload {
    shape: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl DiagnosticPayload {
    pub fn new<T: Any + Send + Sync>(shape: &'static str, value: T) -> Self {
        Self {
            shape,
            value: Arc::new(value),
        }
    }

    pub fn shape(&self) -> &'static str {
        self.shape
    }

    pub fn value(&self) -> &(dyn Any + Send + Sync) {
        &*self.value
    }
}

impl fmt::Debug for DiagnosticPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticPayload")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Subscriber of one diagnostic listener.
pub trait DiagnosticObserver: Send + Sync {
    fn on_next(&self, key: &str, payload: &DiagnosticPayload);
}

/// Subscriber of the bus itself; told about every listener.
pub trait BusObserver: Send + Sync {
    fn on_listener(&self, listener: &Arc<DiagnosticListener>);
}

type Observers<T> = ArcSwap<Vec<(u64, Arc<T>)>>;

fn add<T: ?Sized>(list: &Observers<T>, id: u64, item: Arc<T>) {
    list.rcu(|items| {
        let mut next = Vec::clone(items);
        next.push((id, item.clone()));
        next
    });
}

fn remove<T: ?Sized>(list: &Observers<T>, id: u64) {
    list.rcu(|items| {
        items
            .iter()
            .filter(|(i, _)| *i != id)
            .cloned()
            .collect::<Vec<_>>()
    });
}

/// A named sub-stream on the bus.
pub struct DiagnosticListener {
    name: String,
    observers: Observers<dyn DiagnosticObserver>,
    next_id: AtomicU64,
}

impl DiagnosticListener {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            observers: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether anyone is subscribed. Producers check this before building
    /// payloads.
    pub fn is_enabled(&self) -> bool {
        !self.observers.load().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.load().len()
    }

    pub fn subscribe(self: &Arc<Self>, observer: Arc<dyn DiagnosticObserver>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        add(&self.observers, id, observer);
        tracing::debug!(listener = %self.name, subscriber_id = id, "Diagnostic subscriber added");

        let weak = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(listener) = weak.upgrade() {
                remove(&listener.observers, id);
                tracing::debug!(listener = %listener.name, subscriber_id = id, "Diagnostic subscriber removed");
            }
        })
    }

    pub fn write(&self, key: &str, payload: &DiagnosticPayload) {
        let observers = self.observers.load_full();
        for (_, observer) in observers.iter() {
            observer.on_next(key, payload);
        }
    }
}

impl fmt::Debug for DiagnosticListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticListener")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

struct BusInner {
    listeners: Mutex<Vec<Arc<DiagnosticListener>>>,
    observers: Observers<dyn BusObserver>,
    next_id: AtomicU64,
}

/// Multi-producer diagnostic bus.
#[derive(Clone)]
pub struct DiagnosticBus {
    inner: Arc<BusInner>,
}

impl DiagnosticBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(Vec::new()),
                observers: ArcSwap::from_pointee(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Get or create a named listener. A new listener is announced to every
    /// bus observer.
    pub fn listener(&self, name: &str) -> Arc<DiagnosticListener> {
        let (listener, announce) = {
            let mut listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match listeners.iter().find(|l| l.name == name) {
                Some(existing) => (existing.clone(), None),
                None => {
                    let created = Arc::new(DiagnosticListener::new(name));
                    listeners.push(created.clone());
                    (created, Some(self.inner.observers.load_full()))
                }
            }
        };

        if let Some(observers) = announce {
            tracing::debug!(listener = %name, observers = observers.len(), "Diagnostic listener created");
            for (_, observer) in observers.iter() {
                observer.on_listener(&listener);
            }
        }
        listener
    }

    /// Subscribe to the bus. Existing listeners are announced before this
    /// returns.
    pub fn subscribe(&self, observer: Arc<dyn BusObserver>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let existing = {
            let listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            add(&self.inner.observers, id, observer.clone());
            listeners.clone()
        };

        for listener in &existing {
            observer.on_listener(listener);
        }

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let _listeners = inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
                remove(&inner.observers, id);
            }
        })
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.load().len()
    }
}

impl Default for DiagnosticBus {
    fn default() -> Self {
        Self::new()
    }
}
