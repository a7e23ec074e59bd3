// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Per-subscriber rule installation scope.
//!
//! A [`Subscriber`] is assembled with [`SubscriberBuilder`] and then frozen.
//! [`SubscriberContext::activate`] installs the entries its rules imply and
//! returns a [`SubscriberGuard`] that removes exactly those entries again.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::config::RejectPolicy;
use crate::error::{EntryFailure, EntryFailures, HarnessError};
use crate::logging::{Facility, Logger};
use crate::switch::{
    EntryAction, EntryId, EntryRef, FlowEntry, MatchConverter, RuleLookup, SwitchController,
    SwitchError, SwitchMatch,
};
use crate::{FlowAction, PolicyRule, Result, TableId};

/// Name of the per-subscriber entry that drops unmatched traffic
pub const FALLBACK_ENTRY: &str = "default-drop";

/// Immutable subscriber descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    imsi: String,
    ip: Ipv4Addr,
    #[serde(default)]
    static_rules: Vec<String>,
    #[serde(default)]
    dynamic_rules: Vec<PolicyRule>,
}

impl Subscriber {
    pub fn imsi(&self) -> &str {
        &self.imsi
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Rule ids to resolve through the policy store, in order
    pub fn static_rules(&self) -> &[String] {
        &self.static_rules
    }

    pub fn dynamic_rules(&self) -> &[PolicyRule] {
        &self.dynamic_rules
    }
}

/// Mutable builder; `build` freezes it
#[derive(Debug, Clone)]
pub struct SubscriberBuilder {
    imsi: String,
    ip: Ipv4Addr,
    static_rules: Vec<String>,
    dynamic_rules: Vec<PolicyRule>,
}

impl SubscriberBuilder {
    pub fn new(imsi: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self {
            imsi: imsi.into(),
            ip,
            static_rules: Vec::new(),
            dynamic_rules: Vec::new(),
        }
    }

    pub fn add_static_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.static_rules.push(rule_id.into());
        self
    }

    pub fn add_dynamic_rule(mut self, rule: PolicyRule) -> Self {
        self.dynamic_rules.push(rule);
        self
    }

    pub fn build(self) -> Subscriber {
        Subscriber {
            imsi: self.imsi,
            ip: self.ip,
            static_rules: self.static_rules,
            dynamic_rules: self.dynamic_rules,
        }
    }
}

/// Everything needed to install one subscriber's rules into one table
pub struct SubscriberContext {
    subscriber: Subscriber,
    table: TableId,
    switch: Arc<dyn SwitchController>,
    lookup: Arc<dyn RuleLookup>,
    converter: Arc<dyn MatchConverter>,
    reject_policy: RejectPolicy,
    fallback_priority: u16,
    logger: Logger,
}

impl SubscriberContext {
    pub fn new(
        subscriber: Subscriber,
        table: TableId,
        switch: Arc<dyn SwitchController>,
        lookup: Arc<dyn RuleLookup>,
        converter: Arc<dyn MatchConverter>,
    ) -> Self {
        Self {
            subscriber,
            table,
            switch,
            lookup,
            converter,
            reject_policy: RejectPolicy::default(),
            fallback_priority: 0,
            logger: Logger::default(),
        }
    }

    pub fn reject_policy(mut self, policy: RejectPolicy) -> Self {
        self.reject_policy = policy;
        self
    }

    pub fn fallback_priority(mut self, priority: u16) -> Self {
        self.fallback_priority = priority;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Static rules that resolve, then dynamic rules. Unresolved ids are
    /// logged and skipped.
    fn resolve_rules(&self) -> Vec<PolicyRule> {
        let imsi = self.subscriber.imsi();
        let mut rules = Vec::new();
        for rule_id in self.subscriber.static_rules() {
            match self.lookup.resolve(rule_id) {
                Some(rule) => rules.push(rule),
                None => {
                    let err = HarnessError::Resolution {
                        subscriber: imsi.to_string(),
                        rule_id: rule_id.clone(),
                    };
                    log_warning!(self.logger, Facility::Subscriber, "{}, skipping", err);
                }
            }
        }
        rules.extend(self.subscriber.dynamic_rules().iter().cloned());

        // Entry ids derive from rule ids; a repeated id would collide
        let mut seen = HashSet::new();
        rules.retain(|rule| {
            let first = seen.insert(rule.id.clone());
            if !first {
                log_warning!(
                    self.logger,
                    Facility::Subscriber,
                    "{} lists rule '{}' more than once, keeping the first",
                    imsi,
                    rule.id
                );
            }
            first
        });
        rules
    }

    /// Entries implied by one rule, scoped under the subscriber identity
    fn rule_entries(&self, rule: &PolicyRule) -> Vec<FlowEntry> {
        let imsi = self.subscriber.imsi();
        rule.flow_list
            .iter()
            .enumerate()
            .map(|(idx, flow)| {
                let mut matcher = self.converter.to_switch_match(&flow.flow_match);
                matcher.subscriber = Some(imsi.to_string());
                FlowEntry {
                    id: EntryId::scoped(imsi, &format!("{}#{}", rule.id, idx)),
                    table: self.table,
                    priority: rule.priority,
                    matcher,
                    action: match flow.action {
                        FlowAction::Permit => EntryAction::Permit,
                        FlowAction::Deny => EntryAction::Drop,
                    },
                }
            })
            .collect()
    }

    fn fallback_entry(&self) -> FlowEntry {
        let imsi = self.subscriber.imsi();
        FlowEntry {
            id: EntryId::scoped(imsi, FALLBACK_ENTRY),
            table: self.table,
            priority: self.fallback_priority,
            matcher: SwitchMatch::for_subscriber(imsi),
            action: EntryAction::Drop,
        }
    }

    /// Install the subscriber's entries.
    ///
    /// On a fatal error the entries installed so far are removed before the
    /// error is returned.
    pub fn activate(&self) -> Result<SubscriberGuard> {
        let imsi = self.subscriber.imsi();
        log_info!(
            self.logger,
            Facility::Subscriber,
            "activating {} ({}) on {}",
            imsi,
            self.subscriber.ip(),
            self.table
        );

        // Dropping the guard on an early return removes what it tracks
        let mut guard = SubscriberGuard {
            imsi: imsi.to_string(),
            table: self.table,
            switch: Arc::clone(&self.switch),
            installed: Vec::new(),
            released: false,
            logger: self.logger.clone(),
        };

        for rule in self.resolve_rules() {
            let entries = self.rule_entries(&rule);
            if entries.is_empty() {
                continue;
            }
            match self.switch.install_entries(&entries) {
                Ok(()) => guard.installed.extend(entries.iter().map(FlowEntry::entry_ref)),
                Err(SwitchError::Rejected { entry, reason })
                    if self.reject_policy == RejectPolicy::Skip =>
                {
                    log_warning!(
                        self.logger,
                        Facility::Subscriber,
                        "{} rule '{}' rejected at {}: {}, skipping",
                        imsi,
                        rule.id,
                        entry,
                        reason
                    );
                }
                Err(e) => {
                    log_error!(
                        self.logger,
                        Facility::Subscriber,
                        "{} rule '{}' install failed: {}",
                        imsi,
                        rule.id,
                        e
                    );
                    return Err(HarnessError::from_switch(
                        e,
                        self.table,
                        &entries[0].id,
                        "install",
                    ));
                }
            }
        }

        let fallback = self.fallback_entry();
        self.switch
            .install_entries(std::slice::from_ref(&fallback))
            .map_err(|e| {
                log_error!(
                    self.logger,
                    Facility::Subscriber,
                    "{} fallback entry failed: {}",
                    imsi,
                    e
                );
                HarnessError::from_switch(e, self.table, &fallback.id, "install")
            })?;
        guard.installed.push(fallback.entry_ref());

        log_info!(
            self.logger,
            Facility::Subscriber,
            "{} active with {} entries",
            imsi,
            guard.installed.len()
        );
        Ok(guard)
    }
}

/// Installed entries of one subscriber; removes them on release or drop
pub struct SubscriberGuard {
    imsi: String,
    table: TableId,
    switch: Arc<dyn SwitchController>,
    installed: Vec<EntryRef>,
    released: bool,
    logger: Logger,
}

impl SubscriberGuard {
    pub fn imsi(&self) -> &str {
        &self.imsi
    }

    pub fn installed_entries(&self) -> &[EntryRef] {
        &self.installed
    }

    /// Remove every tracked entry, reporting the ones that could not be removed
    pub fn release(mut self) -> Result<()> {
        self.remove_all()
    }

    fn remove_all(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut failures = Vec::new();
        for entry in self.installed.drain(..) {
            if let Err(e) = self.switch.remove_entries(std::slice::from_ref(&entry)) {
                failures.push(EntryFailure {
                    entry: entry.id,
                    reason: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            log_info!(self.logger, Facility::Subscriber, "{} released", self.imsi);
            Ok(())
        } else {
            let err = HarnessError::Remove {
                table: self.table,
                failures: EntryFailures(failures),
            };
            log_error!(self.logger, Facility::Subscriber, "{}: {}", self.imsi, err);
            Err(err)
        }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        // Errors were already logged by remove_all
        let _ = self.remove_all();
    }
}
