// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log sinks - where rendered entries end up

use super::entry::LogEntry;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Output sink for log entries
pub trait LogSink: Send {
    /// Write a log entry to the sink
    fn write_entry(&mut self, entry: &LogEntry);

    /// Flush any buffered output
    fn flush(&mut self);
}

/// Standard error sink, plain text
pub struct StderrSink {
    stderr: std::io::Stderr,
}

impl StderrSink {
    pub fn new() -> Self {
        Self {
            stderr: std::io::stderr(),
        }
    }
}

impl Default for StderrSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for StderrSink {
    fn write_entry(&mut self, entry: &LogEntry) {
        let _ = writeln!(self.stderr, "{}", entry.render());
    }

    fn flush(&mut self) {
        let _ = self.stderr.flush();
    }
}

/// Standard error sink, one JSON object per line
#[derive(Default)]
pub struct StderrJsonSink;

impl StderrJsonSink {
    fn to_json(entry: &LogEntry) -> serde_json::Value {
        let mut value = serde_json::json!({
            "timestamp": entry.timestamp.to_rfc3339(),
            "level": entry.severity.as_str(),
            "facility": entry.facility.as_str(),
            "message": entry.message,
        });
        if !entry.kvs.is_empty() {
            let context: serde_json::Map<String, serde_json::Value> = entry
                .kvs
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            value["context"] = serde_json::Value::Object(context);
        }
        value
    }
}

impl LogSink for StderrJsonSink {
    fn write_entry(&mut self, entry: &LogEntry) {
        eprintln!("{}", Self::to_json(entry));
    }

    fn flush(&mut self) {}
}

/// In-memory sink; clones share the same buffer so tests can inspect output
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Rendered lines containing `needle`
    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.entries()
            .iter()
            .map(LogEntry::render)
            .filter(|line| line.contains(needle))
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write_entry(&mut self, entry: &LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }

    fn flush(&mut self) {}
}
