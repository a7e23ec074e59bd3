// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Capability interfaces the harness consumes, and the switch-native entry
//! types that cross them.
//!
//! The harness never touches switch state directly; every install, removal
//! and statistics read goes through [`SwitchController`]. Concrete transports
//! (an OpenFlow channel, the in-process [`crate::sim`] switch) implement these
//! traits.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::packet::{parse_ipv4_prefix, Packet};
use crate::{Direction, FlowMatch, PolicyRule, TableId};

/// Identity of an installed entry, unique within its table
///
/// Entries are scoped by their owner (a subscriber id, an isolation request
/// set) so concurrent owners never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<scope>/<name>`
    pub fn scoped(scope: &str, name: &str) -> Self {
        Self(format!("{}/{}", scope, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner part of a scoped id
    pub fn scope(&self) -> Option<&str> {
        self.0.split_once('/').map(|(scope, _)| scope)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an entry for removal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    pub table: TableId,
    pub id: EntryId,
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.id)
    }
}

/// Switch-native match; also used as the filter predicate of stat queries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SwitchMatch {
    /// Subscriber metadata tag set by the classifier stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,
}

impl SwitchMatch {
    /// Wildcard match
    pub fn any() -> Self {
        Self::default()
    }

    pub fn for_subscriber(imsi: &str) -> Self {
        Self {
            subscriber: Some(imsi.to_string()),
            ..Self::default()
        }
    }

    /// True when every field this predicate sets is present in `entry` with
    /// an equal value (non-strict OpenFlow-style selection).
    pub fn selects(&self, entry: &SwitchMatch) -> bool {
        fn field<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
            match want {
                None => true,
                Some(w) => have.as_ref() == Some(w),
            }
        }
        fn addr(want: &Option<String>, have: &Option<String>) -> bool {
            match (want, have) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(w), Some(h)) => match (parse_ipv4_prefix(w), parse_ipv4_prefix(h)) {
                    (Some(w), Some(h)) => w == h,
                    _ => w == h,
                },
            }
        }

        field(&self.subscriber, &entry.subscriber)
            && field(&self.direction, &entry.direction)
            && field(&self.ip_proto, &entry.ip_proto)
            && addr(&self.ipv4_src, &entry.ipv4_src)
            && addr(&self.ipv4_dst, &entry.ipv4_dst)
    }

    pub fn is_wildcard(&self) -> bool {
        self == &Self::default()
    }
}

impl fmt::Display for SwitchMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(s) = &self.subscriber {
            parts.push(format!("subscriber={}", s));
        }
        if let Some(d) = &self.direction {
            parts.push(format!("direction={}", d));
        }
        if let Some(a) = &self.ipv4_src {
            parts.push(format!("ipv4_src={}", a));
        }
        if let Some(a) = &self.ipv4_dst {
            parts.push(format!("ipv4_dst={}", a));
        }
        if let Some(p) = &self.ip_proto {
            parts.push(format!("ip_proto={}", p));
        }
        if parts.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", parts.join(","))
        }
    }
}

/// What the switch does with a packet that hits an entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAction {
    /// Accept; processing ends in this table
    Permit,
    Drop,
    /// Tag the packet with subscriber metadata and continue in `goto`
    Classify {
        subscriber: String,
        direction: Direction,
        goto: TableId,
    },
}

/// One concrete (match, action, priority) record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowEntry {
    pub id: EntryId,
    pub table: TableId,
    pub priority: u16,
    #[serde(rename = "match")]
    pub matcher: SwitchMatch,
    pub action: EntryAction,
}

impl FlowEntry {
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef {
            table: self.table,
            id: self.id.clone(),
        }
    }
}

/// An entry plus its counters as reported by the switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStats {
    pub entry: FlowEntry,
    pub packets: u64,
    pub bytes: u64,
}

/// Failures reported by a switch capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error("switch unreachable: {0}")]
    Unreachable(String),

    #[error("entry {entry} rejected: {reason}")]
    Rejected { entry: EntryId, reason: String },

    #[error("no such entry {0}")]
    UnknownEntry(EntryRef),
}

/// Mutation and statistics access to a switch's tables
pub trait SwitchController: Send + Sync {
    /// Install all entries or none of them
    fn install_entries(&self, entries: &[FlowEntry]) -> Result<(), SwitchError>;

    /// Remove all referenced entries or none of them
    fn remove_entries(&self, entries: &[EntryRef]) -> Result<(), SwitchError>;

    /// Entries of `table` in lookup order, optionally filtered by `predicate`
    /// (see [`SwitchMatch::selects`])
    fn list_entries(
        &self,
        table: TableId,
        predicate: Option<&SwitchMatch>,
    ) -> Result<Vec<EntryStats>, SwitchError>;
}

/// Policy store lookup for static rule references
pub trait RuleLookup: Send + Sync {
    fn resolve(&self, rule_id: &str) -> Option<PolicyRule>;
}

/// Translation from a policy-level match to a switch-native match
pub trait MatchConverter: Send + Sync {
    fn to_switch_match(&self, flow_match: &FlowMatch) -> SwitchMatch;
}

/// Traffic source; fire-and-forget
pub trait PacketInjector: Send + Sync {
    fn send(&self, packet: &Packet, count: u32);
}
