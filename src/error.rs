// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Harness error taxonomy.
//!
//! Scope acquisition fails fast with the first fatal error. Scope release
//! collects per-entry failures and reports them once ([`HarnessError::Restore`],
//! [`HarnessError::Remove`]). Verification reports every mismatching predicate.

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::switch::{EntryId, SwitchError};
use crate::TableId;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// One entry that could not be put back during restoration or removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub entry: EntryId,
    pub reason: String,
}

/// Aggregated per-entry failures
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryFailures(pub Vec<EntryFailure>);

impl fmt::Display for EntryFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} ({})", failure.entry, failure.reason)?;
        }
        Ok(())
    }
}

/// Expected vs last-observed delta for one predicate
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeltaMismatch {
    pub predicate: String,
    pub expected: String,
    /// `None` when the predicate was never sampled after the baseline
    pub observed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MismatchReport(pub Vec<DeltaMismatch>);

impl fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for mismatch in &self.0 {
            match mismatch.observed {
                Some(observed) => writeln!(
                    f,
                    "  {}: expected delta {}, observed {}",
                    mismatch.predicate, mismatch.expected, observed
                )?,
                None => writeln!(
                    f,
                    "  {}: expected delta {}, never observed",
                    mismatch.predicate, mismatch.expected
                )?,
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("rule '{rule_id}' referenced by {subscriber} not found")]
    Resolution { subscriber: String, rule_id: String },

    #[error("failed to install {entry} into {table}: {reason}")]
    Install {
        table: TableId,
        entry: EntryId,
        reason: String,
    },

    #[error("failed to remove {} entries from {table}: {failures}", .failures.0.len())]
    Remove {
        table: TableId,
        failures: EntryFailures,
    },

    #[error("switch unreachable during {operation} on {table}: {reason}")]
    Communication {
        table: TableId,
        operation: &'static str,
        reason: String,
    },

    #[error("restoring {table} failed for {} entries: {failures}", .failures.0.len())]
    Restore {
        table: TableId,
        failures: EntryFailures,
    },

    #[error("flow verification failed after {polls} polls:\n{mismatches}")]
    VerificationMismatch {
        polls: u32,
        mismatches: MismatchReport,
    },

    #[error("reference to {name} was never delivered")]
    ControllerUnavailable { name: String },

    #[error("failed to start {name} worker: {reason}")]
    WorkerSpawn { name: String, reason: String },

    #[error("settle failed: {0}")]
    Settle(String),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HarnessError {
    /// Map a switch failure raised while mutating `table`
    pub(crate) fn from_switch(
        err: SwitchError,
        table: TableId,
        entry: &EntryId,
        operation: &'static str,
    ) -> Self {
        match err {
            SwitchError::Unreachable(reason) => HarnessError::Communication {
                table,
                operation,
                reason,
            },
            SwitchError::Rejected { entry, reason } => HarnessError::Install {
                table,
                entry,
                reason,
            },
            SwitchError::UnknownEntry(entry_ref) => HarnessError::Install {
                table,
                entry: entry.clone(),
                reason: format!("no such entry {}", entry_ref),
            },
        }
    }

    /// Map a switch failure raised while removing `entry` from `table`
    pub(crate) fn from_switch_removal(
        err: SwitchError,
        table: TableId,
        entry: &EntryId,
        operation: &'static str,
    ) -> Self {
        match err {
            SwitchError::Unreachable(reason) => HarnessError::Communication {
                table,
                operation,
                reason,
            },
            other => HarnessError::Remove {
                table,
                failures: EntryFailures(vec![EntryFailure {
                    entry: entry.clone(),
                    reason: other.to_string(),
                }]),
            },
        }
    }

    /// Map a switch failure raised by a read
    pub(crate) fn from_query(err: SwitchError, table: TableId) -> Self {
        HarnessError::Communication {
            table,
            operation: "query",
            reason: err.to_string(),
        }
    }
}
