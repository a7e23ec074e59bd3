// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Policy-level to switch-level translation, and an in-memory policy store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::switch::{MatchConverter, RuleLookup, SwitchMatch};
use crate::{Direction, FlowMatch, PolicyRule};

/// Field-for-field conversion; address text is passed through untouched so
/// the switch sees exactly what the policy said.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMatchConverter;

impl MatchConverter for DefaultMatchConverter {
    fn to_switch_match(&self, flow_match: &FlowMatch) -> SwitchMatch {
        SwitchMatch {
            subscriber: None,
            direction: match flow_match.direction {
                Direction::Unspecified => None,
                direction => Some(direction),
            },
            ipv4_src: flow_match.ipv4_src.clone(),
            ipv4_dst: flow_match.ipv4_dst.clone(),
            ip_proto: flow_match.ip_proto,
        }
    }
}

/// Shared rule dictionary keyed by rule id
///
/// Clones share storage, so a test can keep a handle and add rules after the
/// harness has been built.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleLookup {
    rules: Arc<RwLock<HashMap<String, PolicyRule>>>,
}

impl StaticRuleLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule; returns the previous rule with the same id
    pub fn insert(&self, rule: PolicyRule) -> Option<PolicyRule> {
        match self.rules.write() {
            Ok(mut rules) => rules.insert(rule.id.clone(), rule),
            Err(poisoned) => poisoned.into_inner().insert(rule.id.clone(), rule),
        }
    }

    pub fn remove(&self, rule_id: &str) -> Option<PolicyRule> {
        match self.rules.write() {
            Ok(mut rules) => rules.remove(rule_id),
            Err(poisoned) => poisoned.into_inner().remove(rule_id),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().map(|rules| rules.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<PolicyRule> for StaticRuleLookup {
    fn from_iter<I: IntoIterator<Item = PolicyRule>>(iter: I) -> Self {
        let lookup = Self::new();
        for rule in iter {
            lookup.insert(rule);
        }
        lookup
    }
}

impl RuleLookup for StaticRuleLookup {
    fn resolve(&self, rule_id: &str) -> Option<PolicyRule> {
        self.rules
            .read()
            .ok()
            .and_then(|rules| rules.get(rule_id).cloned())
    }
}
