// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Table isolation against the threaded simulated switch: round-trip,
//! restoration on panic, and aggregated restore failures.

use anyhow::Result;
use flowtest_harness::isolation::{FlowRequest, IsolationMode, TableIsolator};
use flowtest_harness::switch::{
    EntryAction, EntryId, FlowEntry, SwitchController, SwitchMatch,
};
use flowtest_harness::{HarnessError, TableId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::common::{subscriber, SimFixture};

fn background(id: &str, table: TableId, priority: u16) -> FlowEntry {
    FlowEntry {
        id: EntryId::new(id),
        table,
        priority,
        matcher: SwitchMatch {
            ipv4_dst: Some("10.10.0.0/16".into()),
            ..SwitchMatch::default()
        },
        action: EntryAction::Drop,
    }
}

#[test]
fn test_isolation_round_trip_preserves_entries() -> Result<()> {
    let fx = SimFixture::start()?;
    let classifier = fx.classifier();
    fx.switch.install_entries(&[
        background("bg-low", classifier, 1),
        background("bg-high", classifier, 50),
        background("bg-mid", classifier, 20),
    ])?;
    let before = fx.switch.list_entries(classifier, None)?;

    let sub = subscriber("IMSI001010000000001", "192.168.128.74")?.build();
    {
        let guard = fx.harness.isolator(&[&sub]).unwrap().activate()?;
        assert_eq!(guard.snapshot().len(), 3);
        assert_eq!(
            fx.ids(classifier)?,
            vec!["IMSI001010000000001/fwd-ul", "IMSI001010000000001/fwd-dl"]
        );
    }

    let after = fx.switch.list_entries(classifier, None)?;
    let entries = |stats: &[flowtest_harness::switch::EntryStats]| {
        stats.iter().map(|s| s.entry.clone()).collect::<Vec<_>>()
    };
    assert_eq!(entries(&before), entries(&after));
    assert_eq!(fx.ids(classifier)?, vec!["bg-high", "bg-mid", "bg-low"]);
    Ok(())
}

#[test]
fn test_panic_inside_scope_still_restores() -> Result<()> {
    let fx = SimFixture::start()?;
    let classifier = fx.classifier();
    fx.switch
        .install_entries(&[background("bg", classifier, 1)])?;
    let sub = subscriber("IMSI001010000000001", "192.168.128.74")?.build();
    let isolator = fx.harness.isolator(&[&sub]).unwrap();
    let context = fx.harness.subscriber(sub.clone());

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _isolation = isolator.activate().unwrap();
        let _subscriber = context.activate().unwrap();
        panic!("test body failed");
    }));

    assert!(result.is_err());
    assert_eq!(fx.ids(classifier)?, vec!["bg"]);
    assert!(fx.ids(fx.table())?.is_empty());
    Ok(())
}

#[test]
fn test_restore_failures_are_reported_together() -> Result<()> {
    let fx = SimFixture::start()?;
    let classifier = fx.classifier();
    fx.switch.install_entries(&[
        background("a", classifier, 3),
        background("b", classifier, 2),
        background("c", classifier, 1),
    ])?;

    let isolator = TableIsolator::new(classifier, Vec::new(), Arc::new(fx.switch.clone()))
        .with_logger(fx.harness.logger().clone());
    let guard = isolator.activate()?;
    fx.switch.inject_install_fault(EntryId::new("a"));
    fx.switch.inject_install_fault(EntryId::new("b"));

    match guard.restore() {
        Err(HarnessError::Restore { table, failures }) => {
            assert_eq!(table, classifier);
            assert_eq!(failures.0.len(), 2);
        }
        other => panic!("expected restore failure, got {:?}", other.err()),
    }
    // Best effort: the entry without a fault is back
    assert_eq!(fx.ids(classifier)?, vec!["c"]);
    assert_eq!(fx.logs.lines_containing("restoring table 0 failed").len(), 1);
    Ok(())
}

#[test]
fn test_nested_isolators_on_disjoint_tables() -> Result<()> {
    let fx = SimFixture::start()?;
    let other = TableId(7);
    fx.switch.install_entries(&[
        background("outer", fx.classifier(), 1),
        background("inner", other, 1),
    ])?;

    let outer = TableIsolator::new(
        fx.classifier(),
        vec![FlowRequest::Install(background("outer-test", fx.classifier(), 5))],
        Arc::new(fx.switch.clone()),
    );
    let inner = TableIsolator::new(
        other,
        vec![FlowRequest::Install(background("inner-test", other, 5))],
        Arc::new(fx.switch.clone()),
    )
    .mode(IsolationMode::Overlay);

    {
        let _outer = outer.activate()?;
        let _inner = inner.activate()?;
        assert_eq!(fx.ids(fx.classifier())?, vec!["outer-test"]);
        assert_eq!(fx.ids(other)?, vec!["inner-test", "inner"]);
    }
    assert_eq!(fx.ids(fx.classifier())?, vec!["outer"]);
    assert_eq!(fx.ids(other)?, vec!["inner"]);
    Ok(())
}

#[test]
fn test_unreachable_switch_fails_isolation_entry() -> Result<()> {
    let fx = SimFixture::start()?;
    fx.switch.set_reachable(false);
    let sub = subscriber("IMSI001010000000001", "192.168.128.74")?.build();

    let err = fx.harness.isolator(&[&sub]).unwrap().activate().err().unwrap();
    assert!(matches!(
        err,
        HarnessError::Communication {
            operation: "snapshot",
            ..
        }
    ));
    Ok(())
}
