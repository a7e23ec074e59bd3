//! Property-Based Tests: Aggregation Across Subscribers
//!
//! With several subscribers active at once, the whole-table delta is the sum
//! of what each subscriber received, and every subscriber's own predicate
//! sees exactly its own traffic.

#[cfg(test)]
mod tests {
    use flowtest_harness::config::{HarnessConfig, VerifyConfig};
    use flowtest_harness::harness::Harness;
    use flowtest_harness::logging::Logger;
    use flowtest_harness::packet::PacketBuilder;
    use flowtest_harness::policy_convert::{DefaultMatchConverter, StaticRuleLookup};
    use flowtest_harness::sim::SimSwitch;
    use flowtest_harness::subscriber::{Subscriber, SubscriberBuilder};
    use flowtest_harness::switch::{PacketInjector, SwitchMatch};
    use flowtest_harness::verifier::FlowTest;
    use flowtest_harness::{Direction, FlowDescription, FlowMatch, PolicyRule};
    use proptest::prelude::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn subscriber(index: usize) -> Subscriber {
        SubscriberBuilder::new(
            format!("IMSI0010100000000{:02}", index),
            Ipv4Addr::new(192, 168, 128, 10 + index as u8),
        )
        .add_dynamic_rule(PolicyRule::new(
            format!("rule{}", index),
            2,
            vec![FlowDescription::permit(
                FlowMatch::new().direction(Direction::Downlink),
            )],
        ))
        .build()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// **Property:** total delta == sum of per-subscriber deltas.
        #[test]
        fn test_aggregate_consistency(counts in prop::collection::vec(0u32..20, 1..5)) {
            let config = HarnessConfig {
                verify: VerifyConfig { max_polls: 1, poll_interval_ms: 1 },
                ..HarnessConfig::default()
            };
            let switch = SimSwitch::detached(config.classifier_table);
            let harness = Harness::new(
                config,
                Arc::new(switch.clone()),
                Arc::new(StaticRuleLookup::new()),
                Arc::new(DefaultMatchConverter),
            )
            .with_logger(Logger::memory().0);

            let subscribers: Vec<Subscriber> = (0..counts.len()).map(subscriber).collect();
            let sub_refs: Vec<&Subscriber> = subscribers.iter().collect();
            let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();

            let mut tests = vec![FlowTest::new(harness.query(), total)];
            for (sub, &count) in subscribers.iter().zip(&counts) {
                tests.push(FlowTest::new(
                    harness.query_switch_match(SwitchMatch::for_subscriber(sub.imsi())),
                    u64::from(count),
                ));
            }

            let verification = {
                let _isolation = harness.isolator(&sub_refs).unwrap().activate().unwrap();
                let _contexts: Vec<_> = subscribers
                    .iter()
                    .map(|s| harness.subscriber(s.clone()).activate().unwrap())
                    .collect();
                harness
                    .verifier(tests, || Ok(()))
                    .observe(|| {
                        for (sub, &count) in subscribers.iter().zip(&counts) {
                            let packet = PacketBuilder::udp()
                                .set_ip_layer(sub.ip().to_string(), "8.8.8.8")
                                .build()?;
                            switch.send(&packet, count);
                        }
                        Ok(())
                    })
                    .unwrap()
            };

            prop_assert!(verification.passed(), "{:?}", verification.outcomes());
            let per_subscriber: i64 = (1..=counts.len())
                .map(|i| verification.observed(i).unwrap_or(0))
                .sum();
            prop_assert_eq!(verification.observed(0), Some(per_subscriber));
        }
    }
}
