// SPDX-License-Identifier: Apache-2.0 OR MIT
//! End-to-end scenarios: isolator, subscriber contexts and verifier composed
//! against a simulated switch with a worker thread.

use anyhow::{Context, Result};
use flowtest_harness::verifier::{FlowTest, SubTest};
use flowtest_harness::{Direction, FlowDescription, FlowMatch, PolicyRule};

use crate::common::{packet, refs, subscriber, tcp_packet, SimFixture};

#[test]
fn test_static_rule_prefix_fan_out() -> Result<()> {
    let fx = SimFixture::start()?;
    let rule_match = FlowMatch::new()
        .ipv4_dst("45.10.0.0/24")
        .direction(Direction::Uplink);
    fx.lookup.insert(PolicyRule::new(
        "simple_match",
        2,
        vec![FlowDescription::permit(rule_match.clone())],
    ));

    let sub = subscriber("IMSI010000000088888", "192.168.128.74")?
        .add_static_rule("simple_match")
        .build();
    let traffic = packet("45.10.0.0/20", "192.168.128.74")?;

    let verification = {
        let _isolation = fx
            .harness
            .isolator(&[&sub])
            .context("no isolator")?
            .activate()?;
        let _subscriber = fx.harness.subscriber(sub.clone()).activate()?;
        let region = fx
            .harness
            .verifier(
                vec![
                    FlowTest::new(fx.harness.query(), 4096),
                    FlowTest::new(fx.harness.query_matching(&rule_match), 256),
                ],
                fx.settle(),
            )
            .begin()?;
        fx.send(&traffic, 1);
        region.finish()?
    };

    assert_eq!(verification.observed(0), Some(4096));
    assert_eq!(verification.observed(1), Some(256));
    verification.verify()?;

    assert!(fx.ids(fx.table())?.is_empty());
    assert!(fx.ids(fx.classifier())?.is_empty());
    Ok(())
}

#[test]
fn test_malformed_rule_leaves_only_fallback_entry() -> Result<()> {
    let fx = SimFixture::start()?;
    fx.lookup.insert(PolicyRule::new(
        "invalid",
        2,
        vec![FlowDescription::permit(
            FlowMatch::new().ipv4_src("9999.0.0.0/24"),
        )],
    ));
    let sub = subscriber("IMSI000000000000001", "192.168.128.74")?
        .add_static_rule("invalid")
        .build();

    let before = fx.harness.query().entry_count()?;
    {
        let _isolation = fx
            .harness
            .isolator(&[&sub])
            .context("no isolator")?
            .activate()?;
        let guard = fx.harness.subscriber(sub.clone()).activate()?;
        let after = fx.harness.query().entry_count()?;

        assert_eq!(after - before, 1);
        assert_eq!(
            guard.installed_entries()[0].id.as_str(),
            "IMSI000000000000001/default-drop"
        );
    }
    assert_eq!(fx.harness.query().entry_count()?, before);
    assert_eq!(fx.logs.lines_containing("rejected").len(), 1);
    Ok(())
}

#[test]
fn test_two_rules_only_matching_rule_counts() -> Result<()> {
    let fx = SimFixture::start()?;
    let deny_match = FlowMatch::new()
        .ipv4_src("15.0.0.0/24")
        .direction(Direction::Downlink);
    let tcp_uplink = FlowMatch::new().ip_proto(6).direction(Direction::Uplink);
    fx.lookup.insert(PolicyRule::new(
        "match",
        2,
        vec![FlowDescription::deny(deny_match.clone())],
    ));
    fx.lookup.insert(PolicyRule::new(
        "no_match",
        2,
        vec![FlowDescription::permit(tcp_uplink.clone())],
    ));

    let sub = subscriber("IMSI208950000000001", "192.168.128.74")?
        .add_static_rule("match")
        .add_static_rule("no_match")
        .build();
    let traffic = packet("192.168.128.74", "15.0.0.8")?;
    let sent = 42;

    let verification = {
        let _isolation = fx
            .harness
            .isolator(&[&sub])
            .context("no isolator")?
            .activate()?;
        let _subscriber = fx.harness.subscriber(sub.clone()).activate()?;
        let region = fx
            .harness
            .verifier(
                vec![
                    FlowTest::new(fx.harness.query(), sent),
                    FlowTest::new(fx.harness.query_matching(&deny_match), sent),
                    FlowTest::new(fx.harness.query_matching(&tcp_uplink), 0),
                ],
                fx.settle(),
            )
            .begin()?;
        fx.send(&traffic, sent as u32);
        region.finish()?
    };

    verification.verify()?;
    Ok(())
}

#[test]
fn test_two_subscribers_do_not_interfere() -> Result<()> {
    let fx = SimFixture::start()?;
    let ip_match = FlowMatch::new()
        .ipv4_src("8.8.8.0/24")
        .direction(Direction::Downlink);
    let tcp_match = FlowMatch::new().ip_proto(6).direction(Direction::Downlink);
    fx.lookup.insert(PolicyRule::new(
        "t",
        2,
        vec![FlowDescription::permit(ip_match.clone())],
    ));

    let subscribers = vec![
        subscriber("IMSI208950001111111", "192.168.128.5")?
            .add_static_rule("t")
            .build(),
        subscriber("IMSI911500451242001", "192.168.128.100")?
            .add_dynamic_rule(PolicyRule::new(
                "qqq",
                2,
                vec![FlowDescription::deny(tcp_match.clone())],
            ))
            .build(),
    ];
    let s1_sent = 29;
    let s2_sent = 18;
    let s1_packet = packet("192.168.128.5", "8.8.8.8")?;
    let s2_packet = tcp_packet("192.168.128.100", "15.0.0.8")?;

    let s1 = SubTest::new(
        "ip",
        vec![FlowTest::new(fx.harness.query_matching(&ip_match), s1_sent)],
    );
    let s2 = SubTest::new(
        "tcp",
        vec![FlowTest::new(fx.harness.query_matching(&tcp_match), s2_sent)],
    );

    let verification = {
        let _isolation = fx
            .harness
            .isolator(&refs(&subscribers))
            .context("no isolator")?
            .activate()?;
        let _first = fx.harness.subscriber(subscribers[0].clone()).activate()?;
        let _second = fx.harness.subscriber(subscribers[1].clone()).activate()?;

        let region = fx
            .harness
            .verifier(
                vec![FlowTest::new(fx.harness.query(), s1_sent + s2_sent)],
                fx.settle(),
            )
            .with_subtest(s1)
            .with_subtest(s2)
            .begin()?;
        fx.send(&s1_packet, s1_sent as u32);
        fx.send(&s2_packet, s2_sent as u32);
        region.finish()?
    };

    assert_eq!(verification.observed(0), Some(47));
    assert_eq!(verification.observed(1), Some(29));
    assert_eq!(verification.observed(2), Some(18));
    verification.verify()?;
    Ok(())
}
