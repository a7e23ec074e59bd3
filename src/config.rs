// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Harness configuration (JSON5 file format).
//!
//! ```json5
//! {
//!     // Bridge the test run owns; a per-run suffix is appended at startup
//!     bridge_name: "testing_br",
//!     table: 5,              // table under test
//!     classifier_table: 0,   // where isolation forward entries live
//!     verify: { max_polls: 20, poll_interval_ms: 100 },
//!     settle_timeout_ms: 2000,
//!     fallback_priority: 0,
//!     on_install_rejected: "skip",
//!     log_level: "info",
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::logging::Severity;
use crate::validation::{validate_interface_name, MAX_INTERFACE_NAME_LEN};
use crate::TableId;

/// What a subscriber context does when the switch rejects a rule's entries
///
/// The switch, not the harness, decides whether a match is installable
/// (e.g. an unparsable address). `Skip` treats a rejection like an unresolved
/// rule: logged, dropped, and the fallback entry still goes in. `Fail`
/// aborts acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectPolicy {
    #[default]
    Skip,
    Fail,
}

/// Poll loop budget of the verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl VerifyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_polls: default_max_polls(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_bridge_name")]
    pub bridge_name: String,

    /// Table under test (enforcement table)
    #[serde(default = "default_table")]
    pub table: TableId,

    /// Table holding the forward entries that steer subscriber traffic
    #[serde(default)]
    pub classifier_table: TableId,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,

    /// Priority of each subscriber's fallback drop entry
    #[serde(default)]
    pub fallback_priority: u16,

    #[serde(default)]
    pub on_install_rejected: RejectPolicy,

    #[serde(default)]
    pub log_level: Severity,
}

fn default_bridge_name() -> String {
    "testing_br".to_string()
}

fn default_table() -> TableId {
    TableId(5)
}

fn default_max_polls() -> u32 {
    20
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_settle_timeout_ms() -> u64 {
    2000
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            bridge_name: default_bridge_name(),
            table: default_table(),
            classifier_table: TableId::default(),
            verify: VerifyConfig::default(),
            settle_timeout_ms: default_settle_timeout_ms(),
            fallback_priority: 0,
            on_install_rejected: RejectPolicy::default(),
            log_level: Severity::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration (pretty JSON, which JSON5 reads back)
    pub fn to_json5(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json5())
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_interface_name(&self.bridge_name).map_err(|reason| {
            ConfigError::InvalidBridgeName {
                name: self.bridge_name.clone(),
                reason,
            }
        })?;

        if self.table == self.classifier_table {
            return Err(ConfigError::TableConflict { table: self.table });
        }
        if self.verify.max_polls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "verify.max_polls",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.verify.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "verify.poll_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.settle_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "settle_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    /// Bridge name unique to this run: the configured prefix plus random hex,
    /// cut to the interface-name limit.
    pub fn ephemeral_bridge_name(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        let prefix: String = self
            .bridge_name
            .chars()
            .take(MAX_INTERFACE_NAME_LEN.saturating_sub(7))
            .collect();
        format!("{}_{}", prefix, suffix)
            .chars()
            .take(MAX_INTERFACE_NAME_LEN)
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(std::path::PathBuf, String),
    ParseError(String),
    InvalidBridgeName { name: String, reason: String },
    TableConflict { table: TableId },
    InvalidValue { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, msg) => {
                write!(
                    f,
                    "failed to read config file '{}': {}",
                    path.display(),
                    msg
                )
            }
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::InvalidBridgeName { name, reason } => {
                write!(f, "invalid bridge name '{}': {}", name, reason)
            }
            ConfigError::TableConflict { table } => write!(
                f,
                "{} cannot be both the table under test and the classifier table",
                table
            ),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
