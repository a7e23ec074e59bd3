// SPDX-License-Identifier: Apache-2.0 OR MIT
// Structured logging for the harness
//
// Every component logs through a cloned `Logger` handle tagged with a
// `Facility`. Filtering is global with per-facility overrides; output goes to
// a pluggable `LogSink`.

mod entry;
mod facility;
mod logger;
#[macro_use]
mod macros;
mod severity;
mod sink;

pub use entry::LogEntry;
pub use facility::Facility;
pub use logger::Logger;
pub use severity::Severity;
pub use sink::{LogSink, MemorySink, StderrJsonSink, StderrSink};
