// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Read-only packet counter queries against one switch table.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::HarnessError;
use crate::logging::{Facility, Logger};
use crate::switch::{EntryId, SwitchController, SwitchMatch};
use crate::{Result, TableId};

/// One entry's cumulative counters at the time of the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowStatEntry {
    pub entry_id: EntryId,
    #[serde(rename = "match")]
    pub matcher: SwitchMatch,
    pub packets: u64,
    pub bytes: u64,
}

/// Statistics query for a table, optionally narrowed by a match predicate
#[derive(Clone)]
pub struct FlowQuery {
    table: TableId,
    switch: Arc<dyn SwitchController>,
    predicate: Option<SwitchMatch>,
    logger: Logger,
}

impl FlowQuery {
    /// Query over every entry of `table`
    pub fn new(table: TableId, switch: Arc<dyn SwitchController>) -> Self {
        Self {
            table,
            switch,
            predicate: None,
            logger: Logger::default(),
        }
    }

    pub fn with_match(mut self, predicate: SwitchMatch) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn predicate(&self) -> Option<&SwitchMatch> {
        self.predicate.as_ref()
    }

    /// Human-readable predicate identity, e.g. `table 5 [ipv4_dst=45.10.0.0/24]`
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Current counters of every selected entry, in the switch's lookup order
    pub fn lookup(&self) -> Result<Vec<FlowStatEntry>> {
        let stats = self
            .switch
            .list_entries(self.table, self.predicate.as_ref())
            .map_err(|e| {
                log_error!(self.logger, Facility::Query, "{} failed: {}", self, e);
                HarnessError::from_query(e, self.table)
            })?;

        let entries: Vec<FlowStatEntry> = stats
            .into_iter()
            .map(|s| FlowStatEntry {
                entry_id: s.entry.id,
                matcher: s.entry.matcher,
                packets: s.packets,
                bytes: s.bytes,
            })
            .collect();
        log_debug!(
            self.logger,
            Facility::Query,
            "{} selected {} entries",
            self,
            entries.len()
        );
        Ok(entries)
    }

    /// Sum of packet counts over every selected entry
    pub fn packet_count(&self) -> Result<u64> {
        Ok(self.lookup()?.iter().map(|e| e.packets).sum())
    }

    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.lookup()?.len())
    }
}

impl fmt::Display for FlowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Some(predicate) => write!(f, "{} [{}]", self.table, predicate),
            None => write!(f, "{} [*]", self.table),
        }
    }
}

impl fmt::Debug for FlowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowQuery")
            .field("table", &self.table)
            .field("predicate", &self.predicate)
            .finish()
    }
}
