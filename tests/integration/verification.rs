// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Verifier behaviour with asynchronous traffic processing.

use anyhow::Result;
use flowtest_harness::config::{HarnessConfig, RejectPolicy, VerifyConfig};
use flowtest_harness::verifier::FlowTest;
use flowtest_harness::{Direction, FlowDescription, FlowMatch, HarnessError, PolicyRule};
use std::time::{Duration, Instant};

use crate::common::{fast_config, packet, subscriber, SimFixture};

#[test]
fn test_unmet_expectation_spends_whole_budget() -> Result<()> {
    let config = HarnessConfig {
        verify: VerifyConfig {
            max_polls: 4,
            poll_interval_ms: 20,
        },
        ..fast_config()
    };
    let fx = SimFixture::with_config(config)?;
    let sub = subscriber("IMSI001010000000001", "192.168.128.74")?.build();

    let traffic = packet("45.10.0.1", "192.168.128.74")?;

    let started = Instant::now();
    let verification = {
        let _isolation = fx.harness.isolator(&[&sub]).unwrap().activate()?;
        let _subscriber = fx.harness.subscriber(sub.clone()).activate()?;
        fx.harness
            .verifier(vec![FlowTest::new(fx.harness.query(), 10)], fx.settle())
            .observe(|| {
                fx.send(&traffic, 3);
                Ok(())
            })?
    };

    assert_eq!(verification.polls(), 4);
    assert!(started.elapsed() >= Duration::from_millis(60));
    match verification.verify() {
        Err(HarnessError::VerificationMismatch { polls, mismatches }) => {
            assert_eq!(polls, 4);
            assert_eq!(mismatches.0[0].predicate, "table 5 [*]");
            assert_eq!(mismatches.0[0].observed, Some(3));
        }
        other => panic!("expected mismatch, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_deltas_ignore_earlier_traffic() -> Result<()> {
    let fx = SimFixture::start()?;
    let sub = subscriber("IMSI001010000000001", "192.168.128.74")?.build();
    let traffic = packet("45.10.0.1", "192.168.128.74")?;

    let _isolation = fx.harness.isolator(&[&sub]).unwrap().activate()?;
    let _subscriber = fx.harness.subscriber(sub.clone()).activate()?;

    // Counters are already non-zero when the baseline is taken
    fx.send(&traffic, 100);
    fx.switch.wait_idle(Duration::from_secs(5))?;
    assert_eq!(fx.harness.query().packet_count()?, 100);

    let verification = fx
        .harness
        .verifier(vec![FlowTest::new(fx.harness.query(), 7)], fx.settle())
        .observe(|| {
            fx.send(&traffic, 7);
            Ok(())
        })?;
    assert_eq!(verification.observed(0), Some(7));
    verification.verify()?;
    Ok(())
}

#[test]
fn test_subscriber_without_rules_gets_fallback_entry() -> Result<()> {
    let fx = SimFixture::start()?;
    let sub = subscriber("IMSI001010000000001", "192.168.128.74")?
        .add_static_rule("never_provisioned")
        .build();

    let _isolation = fx.harness.isolator(&[&sub]).unwrap().activate()?;
    let guard = fx.harness.subscriber(sub.clone()).activate()?;
    assert_eq!(guard.installed_entries().len(), 1);
    assert_eq!(fx.ids(fx.table())?, vec!["IMSI001010000000001/default-drop"]);

    // All subscriber traffic lands on the fallback entry
    let traffic = packet("192.168.128.74", "1.2.3.0/30")?;
    let verification = fx
        .harness
        .verifier(vec![FlowTest::new(fx.harness.query(), 12)], fx.settle())
        .observe(|| {
            fx.send(&traffic, 3);
            Ok(())
        })?;
    verification.verify()?;
    Ok(())
}

#[test]
fn test_concurrent_subscribers_use_disjoint_entries() -> Result<()> {
    let fx = SimFixture::start()?;
    let rule = PolicyRule::new(
        "shared",
        4,
        vec![FlowDescription::permit(
            FlowMatch::new().direction(Direction::Uplink),
        )],
    );
    fx.lookup.insert(rule);
    let a = subscriber("IMSI001010000000001", "10.0.0.1")?
        .add_static_rule("shared")
        .build();
    let b = subscriber("IMSI001010000000002", "10.0.0.2")?
        .add_static_rule("shared")
        .build();

    let first = fx.harness.subscriber(a).activate()?;
    let second = fx.harness.subscriber(b).activate()?;
    assert_eq!(fx.harness.query().entry_count()?, 4);

    first.release()?;
    assert_eq!(
        fx.ids(fx.table())?,
        vec![
            "IMSI001010000000002/shared#0",
            "IMSI001010000000002/default-drop"
        ]
    );
    second.release()?;
    assert_eq!(fx.harness.query().entry_count()?, 0);
    Ok(())
}

#[test]
fn test_fail_policy_aborts_on_rejected_rule() -> Result<()> {
    let config = HarnessConfig {
        on_install_rejected: RejectPolicy::Fail,
        ..fast_config()
    };
    let fx = SimFixture::with_config(config)?;
    let sub = subscriber("IMSI001010000000001", "10.0.0.1")?
        .add_dynamic_rule(PolicyRule::new(
            "bad",
            2,
            vec![FlowDescription::permit(
                FlowMatch::new().ipv4_dst("45.10.0.0/99"),
            )],
        ))
        .build();

    let err = fx.harness.subscriber(sub).activate().err().unwrap();
    assert!(matches!(err, HarnessError::Install { .. }));
    assert_eq!(fx.harness.query().entry_count()?, 0);
    Ok(())
}
