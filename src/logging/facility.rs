// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging facilities (component identifiers)

use serde::{Deserialize, Serialize};

/// Logging facility - identifies which component generated the log message
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facility {
    /// Harness wiring, capability handoff, scenario runner
    Harness = 0,
    /// Subscriber rule resolution and installation
    Subscriber = 1,
    /// Table snapshot, replacement and restoration
    Isolation = 2,
    /// Baseline capture and delta polling
    Verifier = 3,
    /// Flow statistics queries
    Query = 4,
    /// Simulated switch worker
    Switch = 5,
    /// Test fixtures
    Test = 6,
}

impl Facility {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Facility::Harness => "Harness",
            Facility::Subscriber => "Subscriber",
            Facility::Isolation => "Isolation",
            Facility::Verifier => "Verifier",
            Facility::Query => "Query",
            Facility::Switch => "Switch",
            Facility::Test => "Test",
        }
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
