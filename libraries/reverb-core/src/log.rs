//! Injected logging sink
//!
//! Every pipeline and engine instance receives a [`SharedLogSink`] at
//! construction. Soft failures (a skipped pre-delay, a failed resample) are
//! only visible through this sink, so it is part of the public contract rather
//! than a debugging aid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Fatal,
    Error,
    Warning,
    Info,
    /// Application-level chatter, most verbose
    App,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::App => "APP",
        };
        f.write_str(label)
    }
}

/// Destination for structured log records
pub trait LogSink: Send + Sync {
    /// Record a message at `level`
    fn log(&self, level: LogLevel, message: &str);
}

/// Shared handle to a sink
pub type SharedLogSink = Arc<dyn LogSink>;

/// Sink that forwards to `tracing`
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    verbosity: LogLevel,
}

impl TracingSink {
    /// Forward everything up to and including `verbosity`
    pub fn new(verbosity: LogLevel) -> Self {
        Self { verbosity }
    }

    /// Wrap in an `Arc` for injection
    pub fn shared(verbosity: LogLevel) -> SharedLogSink {
        Arc::new(Self::new(verbosity))
    }

    /// Current threshold
    pub fn verbosity(&self) -> LogLevel {
        self.verbosity
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        if level > self.verbosity {
            return;
        }
        match level {
            LogLevel::Fatal => tracing::error!(fatal = true, "{}", message),
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::App => tracing::debug!(target: "reverb::app", "{}", message),
        }
    }
}

/// A recorded log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Sink that keeps every entry in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sink behind an `Arc`
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Copy of all entries so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether an entry at `level` contains `needle`
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    /// Number of entries at `level`
    pub fn count(&self, level: LogLevel) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.level == level)
            .count()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                level,
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Fatal < LogLevel::Error);
        assert!(LogLevel::Info < LogLevel::App);
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.log(LogLevel::Error, "Skipping pre-delay step");
        sink.log(LogLevel::Info, "IR rebuilt");

        assert!(sink.contains(LogLevel::Error, "pre-delay"));
        assert!(!sink.contains(LogLevel::Info, "pre-delay"));
        assert_eq!(sink.count(LogLevel::Info), 1);

        sink.clear();
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_tracing_sink_accepts_all_levels() {
        let sink = TracingSink::new(LogLevel::App);
        for level in [
            LogLevel::Fatal,
            LogLevel::Error,
            LogLevel::Warning,
            LogLevel::Info,
            LogLevel::App,
        ] {
            sink.log(level, "message");
        }
        assert_eq!(sink.verbosity(), LogLevel::App);
    }
}
