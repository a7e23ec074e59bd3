// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Table state of the simulated switch.
//!
//! Pure data: no threads, no locking. [`super::SimSwitch`] wraps it.

use ipnet::Ipv4Net;
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

use crate::packet::{parse_ipv4_prefix, Packet};
use crate::switch::{
    EntryAction, EntryId, EntryRef, EntryStats, FlowEntry, SwitchError, SwitchMatch,
};
use crate::{Direction, TableId};

/// Bound on `Classify` hops per packet, so a goto cycle cannot wedge the worker
const MAX_PIPELINE_HOPS: usize = 16;

#[derive(Debug, Clone)]
struct SimEntry {
    stats: EntryStats,
    seq: u64,
    src: Option<Ipv4Net>,
    dst: Option<Ipv4Net>,
}

/// Pipeline state of one packet as it walks the tables
#[derive(Debug, Clone, Copy)]
struct PacketContext<'a> {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ip_proto: u8,
    subscriber: Option<&'a str>,
    direction: Option<Direction>,
}

impl SimEntry {
    fn matches(&self, ctx: &PacketContext<'_>) -> bool {
        let m = &self.stats.entry.matcher;
        if let Some(subscriber) = &m.subscriber {
            if ctx.subscriber != Some(subscriber.as_str()) {
                return false;
            }
        }
        if let Some(direction) = m.direction {
            if ctx.direction != Some(direction) {
                return false;
            }
        }
        if let Some(proto) = m.ip_proto {
            if ctx.ip_proto != proto {
                return false;
            }
        }
        if let Some(src) = &self.src {
            if !src.contains(&ctx.src) {
                return false;
            }
        }
        if let Some(dst) = &self.dst {
            if !dst.contains(&ctx.dst) {
                return false;
            }
        }
        true
    }
}

/// Counters for packets no entry claimed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissCounters {
    /// Packets that matched nothing in some table
    pub table_miss: u64,
    /// Packets that exceeded the hop bound
    pub loops: u64,
}

#[derive(Debug, Clone)]
pub struct SimTables {
    ingress: TableId,
    tables: BTreeMap<TableId, Vec<SimEntry>>,
    next_seq: u64,
    misses: MissCounters,
}

fn parse_field(
    entry: &FlowEntry,
    field: &str,
    value: &Option<String>,
) -> Result<Option<Ipv4Net>, SwitchError> {
    match value {
        None => Ok(None),
        Some(text) => parse_ipv4_prefix(text).map(Some).ok_or_else(|| SwitchError::Rejected {
            entry: entry.id.clone(),
            reason: format!("{} '{}' is not an IPv4 address or prefix", field, text),
        }),
    }
}

impl SimTables {
    /// Empty switch whose pipeline starts at `ingress`
    pub fn new(ingress: TableId) -> Self {
        Self {
            ingress,
            tables: BTreeMap::new(),
            next_seq: 0,
            misses: MissCounters::default(),
        }
    }

    pub fn ingress(&self) -> TableId {
        self.ingress
    }

    pub fn misses(&self) -> MissCounters {
        self.misses
    }

    /// Install every entry or none: the batch is validated before anything
    /// is inserted.
    pub fn install(&mut self, entries: &[FlowEntry]) -> Result<(), SwitchError> {
        let mut batch_ids: HashSet<(TableId, &EntryId)> = HashSet::new();
        let mut staged = Vec::with_capacity(entries.len());

        for entry in entries {
            let src = parse_field(entry, "ipv4_src", &entry.matcher.ipv4_src)?;
            let dst = parse_field(entry, "ipv4_dst", &entry.matcher.ipv4_dst)?;

            if self.contains(&entry.entry_ref()) || !batch_ids.insert((entry.table, &entry.id)) {
                return Err(SwitchError::Rejected {
                    entry: entry.id.clone(),
                    reason: format!("duplicate entry id in {}", entry.table),
                });
            }
            staged.push((entry.clone(), src, dst));
        }

        for (entry, src, dst) in staged {
            let seq = self.next_seq;
            self.next_seq += 1;
            let table = self.tables.entry(entry.table).or_default();
            table.push(SimEntry {
                stats: EntryStats {
                    entry,
                    packets: 0,
                    bytes: 0,
                },
                seq,
                src,
                dst,
            });
            // Lookup order: highest priority first, then insertion order
            table.sort_by(|a, b| {
                b.stats
                    .entry
                    .priority
                    .cmp(&a.stats.entry.priority)
                    .then(a.seq.cmp(&b.seq))
            });
        }
        Ok(())
    }

    /// Remove every referenced entry or none of them
    pub fn remove(&mut self, refs: &[EntryRef]) -> Result<(), SwitchError> {
        if let Some(missing) = refs.iter().find(|r| !self.contains(r)) {
            return Err(SwitchError::UnknownEntry(missing.clone()));
        }
        for r in refs {
            if let Some(table) = self.tables.get_mut(&r.table) {
                table.retain(|e| e.stats.entry.id != r.id);
            }
        }
        Ok(())
    }

    pub fn contains(&self, entry: &EntryRef) -> bool {
        self.tables
            .get(&entry.table)
            .is_some_and(|t| t.iter().any(|e| e.stats.entry.id == entry.id))
    }

    /// Entries of `table` in lookup order, filtered by `predicate`
    pub fn list(&self, table: TableId, predicate: Option<&SwitchMatch>) -> Vec<EntryStats> {
        self.tables
            .get(&table)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| predicate.map_or(true, |p| p.selects(&e.stats.entry.matcher)))
                    .map(|e| e.stats.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn entry_count(&self, table: TableId) -> usize {
        self.tables.get(&table).map_or(0, Vec::len)
    }

    /// Run `count` copies of every packet the template expands to through
    /// the pipeline.
    pub fn process(&mut self, packet: &Packet, count: u32) {
        for _ in 0..count {
            for (src, dst) in packet.expand() {
                self.process_one(src, dst, packet.ip_proto, u64::from(packet.length));
            }
        }
    }

    fn process_one(&mut self, src: Ipv4Addr, dst: Ipv4Addr, ip_proto: u8, length: u64) {
        let mut table = self.ingress;
        let mut subscriber: Option<String> = None;
        let mut direction = None;

        for _ in 0..MAX_PIPELINE_HOPS {
            let ctx = PacketContext {
                src,
                dst,
                ip_proto,
                subscriber: subscriber.as_deref(),
                direction,
            };
            let hit = self
                .tables
                .get_mut(&table)
                .and_then(|entries| entries.iter_mut().find(|e| e.matches(&ctx)));

            let Some(hit) = hit else {
                self.misses.table_miss += 1;
                return;
            };
            hit.stats.packets += 1;
            hit.stats.bytes += length;

            match &hit.stats.entry.action {
                EntryAction::Permit | EntryAction::Drop => return,
                EntryAction::Classify {
                    subscriber: tag,
                    direction: dir,
                    goto,
                } => {
                    subscriber = Some(tag.clone());
                    direction = Some(*dir);
                    table = *goto;
                }
            }
        }
        self.misses.loops += 1;
    }
}
