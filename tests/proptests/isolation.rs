//! Property-Based Tests: Table Isolation
//!
//! Whatever a table holds before an isolation scope, and whatever the scope
//! does to it, the table holds the same entries in the same lookup order
//! afterwards.

#[cfg(test)]
mod tests {
    use flowtest_harness::isolation::{FlowRequest, IsolationMode, TableIsolator};
    use flowtest_harness::sim::SimSwitch;
    use flowtest_harness::switch::{EntryAction, EntryId, FlowEntry, SwitchController, SwitchMatch};
    use flowtest_harness::TableId;
    use proptest::prelude::*;
    use std::sync::Arc;

    const TABLE: TableId = TableId(0);

    fn entry(prefix: &str, index: usize, priority: u16, octet: Option<u8>) -> FlowEntry {
        FlowEntry {
            id: EntryId::new(format!("{}-{}", prefix, index)),
            table: TABLE,
            priority,
            matcher: SwitchMatch {
                ipv4_dst: octet.map(|o| format!("10.{}.0.0/16", o)),
                ..SwitchMatch::default()
            },
            action: EntryAction::Drop,
        }
    }

    fn entries(prefix: &'static str) -> impl Strategy<Value = Vec<FlowEntry>> {
        prop::collection::vec((0u16..8, prop::option::of(any::<u8>())), 0..12).prop_map(
            move |specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (priority, octet))| entry(prefix, i, priority, octet))
                    .collect()
            },
        )
    }

    proptest! {
        /// **Property:** restore returns the table to its exact prior contents.
        #[test]
        fn test_isolation_round_trip(
            existing in entries("bg"),
            installs in entries("req"),
            overlay in any::<bool>(),
            remove_first in any::<bool>(),
        ) {
            let switch = SimSwitch::detached(TABLE);
            switch.install_entries(&existing).unwrap();
            let before = switch.list_entries(TABLE, None).unwrap();

            let mut requests: Vec<FlowRequest> =
                installs.into_iter().map(FlowRequest::Install).collect();
            if overlay && remove_first && !existing.is_empty() {
                requests.push(FlowRequest::Remove(existing[0].entry_ref()));
            }
            let mode = if overlay { IsolationMode::Overlay } else { IsolationMode::Replace };

            let guard = TableIsolator::new(TABLE, requests, Arc::new(switch.clone()))
                .mode(mode)
                .activate()
                .unwrap();
            prop_assert_eq!(guard.snapshot().len(), existing.len());
            guard.restore().unwrap();

            let after = switch.list_entries(TABLE, None).unwrap();
            let strip = |stats: Vec<flowtest_harness::switch::EntryStats>| {
                stats.into_iter().map(|s| s.entry).collect::<Vec<_>>()
            };
            prop_assert_eq!(strip(before), strip(after));
        }
    }
}
