// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logger handle with global and per-facility filtering

use super::entry::LogEntry;
use super::sink::{LogSink, MemorySink, StderrJsonSink, StderrSink};
use super::{Facility, Severity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Logger handle for writing log entries
///
/// This is a lightweight handle that can be cloned and passed to every
/// scope. Clones share the sink and the filtering state.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<Mutex<Box<dyn LogSink>>>,
    /// Global minimum log level (default: Info)
    global_min_level: Arc<AtomicU8>,
    /// Per-facility minimum log levels
    facility_min_levels: Arc<RwLock<HashMap<Facility, Severity>>>,
}

impl Logger {
    /// Create a logger writing to an arbitrary sink
    pub fn with_sink(sink: Box<dyn LogSink>, level: Severity) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            global_min_level: Arc::new(AtomicU8::new(level as u8)),
            facility_min_levels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Plain-text logger on stderr
    pub fn stderr(level: Severity) -> Self {
        Self::with_sink(Box::new(StderrSink::new()), level)
    }

    /// JSON-lines logger on stderr
    pub fn stderr_json(level: Severity) -> Self {
        Self::with_sink(Box::new(StderrJsonSink), level)
    }

    /// Logger capturing everything (Debug and above) in memory
    pub fn memory() -> (Self, MemorySink) {
        let sink = MemorySink::new();
        (
            Self::with_sink(Box::new(sink.clone()), Severity::Debug),
            sink,
        )
    }

    /// Check if a log message should be written based on severity filtering
    #[inline]
    fn should_log(&self, severity: Severity, facility: Facility) -> bool {
        // Facility-specific level overrides the global one
        if let Ok(levels) = self.facility_min_levels.read() {
            if let Some(&min_level) = levels.get(&facility) {
                return severity <= min_level;
            }
        }

        let global_min = self.global_min_level.load(Ordering::Relaxed);
        (severity as u8) <= global_min
    }

    fn emit(&self, entry: LogEntry) {
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        sink.write_entry(&entry);
        if entry.severity <= Severity::Warning {
            sink.flush();
        }
    }

    /// Write a log entry
    #[inline]
    pub fn log(&self, severity: Severity, facility: Facility, message: &str) {
        if !self.should_log(severity, facility) {
            return;
        }
        self.emit(LogEntry::new(severity, facility, message));
    }

    /// Write a log entry with key-value pairs
    pub fn log_kv(
        &self,
        severity: Severity,
        facility: Facility,
        message: &str,
        kvs: &[(&str, &str)],
    ) {
        if !self.should_log(severity, facility) {
            return;
        }

        let mut entry = LogEntry::new(severity, facility, message);
        for (key, value) in kvs {
            entry.add_kv(key, value);
        }
        self.emit(entry);
    }

    #[inline]
    pub fn critical(&self, facility: Facility, message: &str) {
        self.log(Severity::Critical, facility, message);
    }

    #[inline]
    pub fn error(&self, facility: Facility, message: &str) {
        self.log(Severity::Error, facility, message);
    }

    #[inline]
    pub fn warning(&self, facility: Facility, message: &str) {
        self.log(Severity::Warning, facility, message);
    }

    #[inline]
    pub fn notice(&self, facility: Facility, message: &str) {
        self.log(Severity::Notice, facility, message);
    }

    #[inline]
    pub fn info(&self, facility: Facility, message: &str) {
        self.log(Severity::Info, facility, message);
    }

    #[inline]
    pub fn debug(&self, facility: Facility, message: &str) {
        self.log(Severity::Debug, facility, message);
    }

    /// Set the global minimum log level
    pub fn set_global_level(&self, level: Severity) {
        self.global_min_level.store(level as u8, Ordering::Relaxed);
    }

    /// Get the global minimum log level
    pub fn global_level(&self) -> Severity {
        Severity::from_u8(self.global_min_level.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Set the minimum log level for a specific facility
    pub fn set_facility_level(&self, facility: Facility, level: Severity) {
        if let Ok(mut levels) = self.facility_min_levels.write() {
            levels.insert(facility, level);
        }
    }

    /// Clear the facility-specific log level (fall back to global)
    pub fn clear_facility_level(&self, facility: Facility) {
        if let Ok(mut levels) = self.facility_min_levels.write() {
            levels.remove(&facility);
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::stderr(Severity::Info)
    }
}
