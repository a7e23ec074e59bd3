// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Table isolation scope.
//!
//! [`TableIsolator::activate`] snapshots a table, clears it (in
//! [`IsolationMode::Replace`]) and applies the caller's [`FlowRequest`]s. The
//! returned [`IsolationGuard`] puts the snapshot back when released or
//! dropped. Isolators that are alive at the same time must target different
//! tables; that is not checked.

use metrics::counter;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::error::{EntryFailure, EntryFailures, HarnessError};
use crate::logging::{Facility, Logger};
use crate::subscriber::Subscriber;
use crate::switch::{EntryAction, EntryId, EntryRef, FlowEntry, SwitchController, SwitchMatch};
use crate::{Direction, Result, TableId};

/// Priority of the classifier entries built by [`ForwardFlowArgsBuilder`]
pub const FORWARD_PRIORITY: u16 = 10;

/// One mutation applied while the table is isolated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowRequest {
    Install(FlowEntry),
    Remove(EntryRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationMode {
    /// Clear the table before applying requests
    #[default]
    Replace,
    /// Keep the existing entries and apply requests on top
    Overlay,
}

/// Entries of a table captured at scope entry, in lookup order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub table: TableId,
    pub entries: Vec<FlowEntry>,
}

impl TableSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct TableIsolator {
    table: TableId,
    requests: Vec<FlowRequest>,
    switch: Arc<dyn SwitchController>,
    mode: IsolationMode,
    logger: Logger,
}

impl TableIsolator {
    pub fn new(
        table: TableId,
        requests: Vec<FlowRequest>,
        switch: Arc<dyn SwitchController>,
    ) -> Self {
        Self {
            table,
            requests,
            switch,
            mode: IsolationMode::default(),
            logger: Logger::default(),
        }
    }

    pub fn mode(mut self, mode: IsolationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn requests(&self) -> &[FlowRequest] {
        &self.requests
    }

    pub fn activate(&self) -> Result<IsolationGuard> {
        let table = self.table;
        let snapshot = self
            .switch
            .list_entries(table, None)
            .map_err(|e| HarnessError::Communication {
                table,
                operation: "snapshot",
                reason: e.to_string(),
            })?;
        let snapshot = TableSnapshot {
            table,
            entries: snapshot.into_iter().map(|s| s.entry).collect(),
        };
        log_info!(
            self.logger,
            Facility::Isolation,
            "isolating {} ({:?}, {} entries captured, {} requests)",
            table,
            self.mode,
            snapshot.len(),
            self.requests.len()
        );

        // From here on any early return restores through the guard's Drop
        let guard = IsolationGuard {
            snapshot,
            switch: Arc::clone(&self.switch),
            restored: false,
            logger: self.logger.clone(),
        };

        if self.mode == IsolationMode::Replace && !guard.snapshot.is_empty() {
            let refs: Vec<EntryRef> = guard
                .snapshot
                .entries
                .iter()
                .map(FlowEntry::entry_ref)
                .collect();
            self.switch
                .remove_entries(&refs)
                .map_err(|e| HarnessError::from_switch_removal(e, table, &refs[0].id, "isolate"))?;
        }

        for request in &self.requests {
            self.apply(request)?;
        }
        Ok(guard)
    }

    fn apply(&self, request: &FlowRequest) -> Result<()> {
        match request {
            FlowRequest::Install(entry) => {
                if entry.table != self.table {
                    return Err(HarnessError::Install {
                        table: self.table,
                        entry: entry.id.clone(),
                        reason: format!("request targets {}", entry.table),
                    });
                }
                self.switch
                    .install_entries(std::slice::from_ref(entry))
                    .map_err(|e| HarnessError::from_switch(e, self.table, &entry.id, "install"))
            }
            FlowRequest::Remove(entry) => self
                .switch
                .remove_entries(std::slice::from_ref(entry))
                .map_err(|e| HarnessError::from_switch_removal(e, self.table, &entry.id, "remove")),
        }
    }
}

/// Isolated table; restores the snapshot on release or drop
pub struct IsolationGuard {
    snapshot: TableSnapshot,
    switch: Arc<dyn SwitchController>,
    restored: bool,
    logger: Logger,
}

impl IsolationGuard {
    pub fn snapshot(&self) -> &TableSnapshot {
        &self.snapshot
    }

    pub fn table(&self) -> TableId {
        self.snapshot.table
    }

    /// Put the captured entries back. Every entry is attempted; failures are
    /// reported together.
    pub fn restore(mut self) -> Result<()> {
        self.restore_once()
    }

    fn restore_once(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        let table = self.snapshot.table;
        let mut failures = Vec::new();

        match self.switch.list_entries(table, None) {
            Ok(current) => {
                for stats in current {
                    let entry = stats.entry.entry_ref();
                    if let Err(e) = self.switch.remove_entries(std::slice::from_ref(&entry)) {
                        failures.push(EntryFailure {
                            entry: entry.id,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => failures.push(EntryFailure {
                entry: EntryId::new("*"),
                reason: format!("listing {} failed: {}", table, e),
            }),
        }

        for entry in &self.snapshot.entries {
            if let Err(e) = self.switch.install_entries(std::slice::from_ref(entry)) {
                failures.push(EntryFailure {
                    entry: entry.id.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            log_info!(
                self.logger,
                Facility::Isolation,
                "{} restored ({} entries)",
                table,
                self.snapshot.len()
            );
            return Ok(());
        }

        counter!("table_restore_failures_total").increment(failures.len() as u64);
        let err = HarnessError::Restore {
            table,
            failures: EntryFailures(failures),
        };
        log_error!(self.logger, Facility::Isolation, "{}", err);
        Err(err)
    }
}

impl Drop for IsolationGuard {
    fn drop(&mut self) {
        let _ = self.restore_once();
    }
}

/// Builds the classifier requests that steer subscriber traffic into the
/// table under test: uplink by source address, downlink by destination.
#[derive(Debug, Clone)]
pub struct ForwardFlowArgsBuilder {
    subscribers: Vec<(String, Ipv4Addr)>,
    classifier_table: TableId,
    target_table: TableId,
    priority: u16,
}

impl ForwardFlowArgsBuilder {
    pub fn from_subscriber(subscriber: &Subscriber, target_table: TableId) -> Self {
        Self {
            subscribers: vec![(subscriber.imsi().to_string(), subscriber.ip())],
            classifier_table: TableId(0),
            target_table,
            priority: FORWARD_PRIORITY,
        }
    }

    pub fn with_subscriber(mut self, subscriber: &Subscriber) -> Self {
        self.subscribers
            .push((subscriber.imsi().to_string(), subscriber.ip()));
        self
    }

    pub fn classifier_table(mut self, table: TableId) -> Self {
        self.classifier_table = table;
        self
    }

    pub fn priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn classifier(&self) -> TableId {
        self.classifier_table
    }

    pub fn build_requests(&self) -> Vec<FlowRequest> {
        let mut requests = Vec::with_capacity(self.subscribers.len() * 2);
        for (imsi, ip) in &self.subscribers {
            let forward = |name: &str, matcher: SwitchMatch, direction: Direction| {
                FlowRequest::Install(FlowEntry {
                    id: EntryId::scoped(imsi, name),
                    table: self.classifier_table,
                    priority: self.priority,
                    matcher,
                    action: EntryAction::Classify {
                        subscriber: imsi.clone(),
                        direction,
                        goto: self.target_table,
                    },
                })
            };
            requests.push(forward(
                "fwd-ul",
                SwitchMatch {
                    ipv4_src: Some(ip.to_string()),
                    ..SwitchMatch::default()
                },
                Direction::Uplink,
            ));
            requests.push(forward(
                "fwd-dl",
                SwitchMatch {
                    ipv4_dst: Some(ip.to_string()),
                    ..SwitchMatch::default()
                },
                Direction::Downlink,
            ));
        }
        requests
    }

    /// Isolator over the classifier table carrying these requests
    pub fn isolator(&self, switch: Arc<dyn SwitchController>) -> TableIsolator {
        TableIsolator::new(self.classifier_table, self.build_requests(), switch)
    }
}
