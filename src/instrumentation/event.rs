//! Event levels, keywords, payload values and the written-event record.

use std::fmt;
use std::ops::BitOr;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// Verbosity of an event. Lower is more severe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventLevel {
    LogAlways = 0,
    Critical = 1,
    Error = 2,
    Warning = 3,
    Informational = 4,
    Verbose = 5,
}

/// Bit set selecting event categories within a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventKeywords(pub u64);

impl EventKeywords {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u64::MAX);

    /// Makes the session attach activity ids to events so start/stop pairs
    /// can be correlated across tasks.
    pub const TASKS_FLOW_ACTIVITY_IDS: Self = Self(0x80);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for EventKeywords {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// What a listener asked to receive from one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enablement {
    pub level: EventLevel,
    pub keywords: EventKeywords,
}

impl Enablement {
    pub fn new(level: EventLevel, keywords: EventKeywords) -> Self {
        Self { level, keywords }
    }

    /// Whether an event with the given level and keywords passes this enablement.
    pub fn accepts(&self, level: EventLevel, keywords: EventKeywords) -> bool {
        let level_ok = self.level == EventLevel::LogAlways
            || level == EventLevel::LogAlways
            || level <= self.level;
        let keywords_ok = keywords.is_empty() || self.keywords.intersects(keywords);
        level_ok && keywords_ok
    }
}

/// Static description of an event a source can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDescriptor {
    pub id: u32,
    pub name: &'static str,
    pub level: EventLevel,
    pub keywords: EventKeywords,
}

/// How the client may deviate from the requested HTTP version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersionPolicy {
    RequestVersionOrLower,
    RequestVersionOrHigher,
    RequestVersionExact,
}

/// One positional payload field.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Str(String),
    I32(i32),
    U8(u8),
    VersionPolicy(HttpVersionPolicy),
}

impl PayloadValue {
    fn kind(&self) -> &'static str {
        match self {
            PayloadValue::Str(_) => "string",
            PayloadValue::I32(_) => "i32",
            PayloadValue::U8(_) => "u8",
            PayloadValue::VersionPolicy(_) => "version policy",
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Str(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Str(value)
    }
}

impl From<i32> for PayloadValue {
    fn from(value: i32) -> Self {
        PayloadValue::I32(value)
    }
}

impl From<u8> for PayloadValue {
    fn from(value: u8) -> Self {
        PayloadValue::U8(value)
    }
}

impl From<HttpVersionPolicy> for PayloadValue {
    fn from(value: HttpVersionPolicy) -> Self {
        PayloadValue::VersionPolicy(value)
    }
}

/// Errors raised while reading positional payload fields.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("payload has no field at index {0}")]
    Missing(usize),

    #[error("payload field {index} is a {actual}, expected {expected}")]
    WrongType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
}

/// An event as delivered to listeners.
#[derive(Debug, Clone)]
pub struct EventWritten {
    pub source: String,
    pub event_id: u32,
    pub event_name: &'static str,
    pub level: EventLevel,
    pub keywords: EventKeywords,
    pub activity_id: Uuid,
    pub payload: Vec<PayloadValue>,
    pub timestamp: Instant,
}

impl EventWritten {
    pub fn new(source: impl Into<String>, descriptor: &EventDescriptor) -> Self {
        Self {
            source: source.into(),
            event_id: descriptor.id,
            event_name: descriptor.name,
            level: descriptor.level,
            keywords: descriptor.keywords,
            activity_id: Uuid::nil(),
            payload: Vec::new(),
            timestamp: Instant::now(),
        }
    }

    pub fn with_activity(mut self, activity_id: Uuid) -> Self {
        self.activity_id = activity_id;
        self
    }

    pub fn with_payload(mut self, payload: Vec<PayloadValue>) -> Self {
        self.payload = payload;
        self
    }

    pub fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn field(&self, index: usize) -> Result<&PayloadValue, PayloadError> {
        self.payload.get(index).ok_or(PayloadError::Missing(index))
    }

    pub fn str_at(&self, index: usize) -> Result<&str, PayloadError> {
        match self.field(index)? {
            PayloadValue::Str(s) => Ok(s),
            other => Err(wrong_type(index, "string", other)),
        }
    }

    pub fn i32_at(&self, index: usize) -> Result<i32, PayloadError> {
        match self.field(index)? {
            PayloadValue::I32(v) => Ok(*v),
            other => Err(wrong_type(index, "i32", other)),
        }
    }

    pub fn u8_at(&self, index: usize) -> Result<u8, PayloadError> {
        match self.field(index)? {
            PayloadValue::U8(v) => Ok(*v),
            other => Err(wrong_type(index, "u8", other)),
        }
    }

    pub fn version_policy_at(&self, index: usize) -> Result<HttpVersionPolicy, PayloadError> {
        match self.field(index)? {
            PayloadValue::VersionPolicy(p) => Ok(*p),
            other => Err(wrong_type(index, "version policy", other)),
        }
    }
}

fn wrong_type(index: usize, expected: &'static str, actual: &PayloadValue) -> PayloadError {
    PayloadError::WrongType {
        index,
        expected,
        actual: actual.kind(),
    }
}

impl fmt::Display for EventWritten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}({})", self.source, self.event_name, self.event_id)
    }
}
