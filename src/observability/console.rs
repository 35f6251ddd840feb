//! Destinations for observer output lines.

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::OutputMode;

/// Receives one formatted observer line at a time. Implementations must not
/// block for long; they are called from event callbacks.
pub trait LineSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Prints lines to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl LineSink for ConsoleSink {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Emits lines as `info` events on the `http_observers::events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LineSink for TracingSink {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "http_observers::events", "{}", line);
    }
}

/// Keeps lines in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

pub fn sink_for(mode: OutputMode) -> Arc<dyn LineSink> {
    match mode {
        OutputMode::Console => Arc::new(ConsoleSink),
        OutputMode::Tracing => Arc::new(TracingSink),
    }
}
