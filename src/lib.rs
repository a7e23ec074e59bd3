// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Verification harness for software-defined forwarding tables.
//!
//! A test composes three kinds of scopes, innermost last:
//!
//! 1. [`isolation::TableIsolator`] swaps a table's contents for a known rule
//!    set and restores the original entries when released.
//! 2. [`subscriber::SubscriberContext`] installs the entries implied by one
//!    subscriber's policy rules and removes exactly those entries on release.
//! 3. [`verifier::FlowVerifier`] samples per-predicate packet counters before
//!    traffic flows, then polls until the observed deltas match.
//!
//! Every scope is an RAII guard, so release happens on every exit path,
//! including panics inside the protected region.

use serde::{Deserialize, Serialize};
use std::fmt;

#[macro_use]
pub mod logging;

pub mod config;
pub mod error;
pub mod handoff;
pub mod harness;
pub mod isolation;
pub mod packet;
pub mod policy_convert;
pub mod query;
pub mod scenario;
pub mod sim;
pub mod subscriber;
pub mod switch;
pub mod validation;
pub mod verifier;

pub use error::{HarnessError, Result};

/// Numeric identifier of a switch table
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TableId(pub u8);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {}", self.0)
    }
}

/// Traffic direction relative to the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Subscriber is the packet source
    Uplink,
    /// Subscriber is the packet destination
    Downlink,
    #[default]
    Unspecified,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Uplink => "uplink",
            Direction::Downlink => "downlink",
            Direction::Unspecified => "unspecified",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowAction {
    Permit,
    Deny,
}

/// Protocol-level predicate of a policy rule
///
/// Addresses are kept as text: a malformed value is carried through to the
/// switch, which decides whether the entry can be installed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,
    #[serde(default)]
    pub direction: Direction,
}

impl FlowMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ipv4_src(mut self, addr: impl Into<String>) -> Self {
        self.ipv4_src = Some(addr.into());
        self
    }

    pub fn ipv4_dst(mut self, addr: impl Into<String>) -> Self {
        self.ipv4_dst = Some(addr.into());
        self
    }

    pub fn ip_proto(mut self, proto: u8) -> Self {
        self.ip_proto = Some(proto);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// One match + action pair of a policy rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowDescription {
    #[serde(rename = "match")]
    pub flow_match: FlowMatch,
    pub action: FlowAction,
}

impl FlowDescription {
    pub fn permit(flow_match: FlowMatch) -> Self {
        Self {
            flow_match,
            action: FlowAction::Permit,
        }
    }

    pub fn deny(flow_match: FlowMatch) -> Self {
        Self {
            flow_match,
            action: FlowAction::Deny,
        }
    }
}

/// A named, prioritised list of flow descriptions
///
/// Priority and matches are passed to the switch as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub priority: u16,
    pub flow_list: Vec<FlowDescription>,
}

impl PolicyRule {
    pub fn new(id: impl Into<String>, priority: u16, flow_list: Vec<FlowDescription>) -> Self {
        Self {
            id: id.into(),
            priority,
            flow_list,
        }
    }
}
