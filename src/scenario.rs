// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Declarative test scenarios (JSON5).
//!
//! ```json5
//! {
//!     name: "static rule, /20 into /24",
//!     rules: [
//!         { id: "simple_match", priority: 2,
//!           flow_list: [{ match: { ipv4_dst: "45.10.0.0/24", direction: "uplink" },
//!                         action: "permit" }] },
//!     ],
//!     subscribers: [
//!         { imsi: "IMSI010000000088888", ip: "192.168.128.74", static_rules: ["simple_match"] },
//!     ],
//!     traffic: [ { dst: "45.10.0.0/20", src: "192.168.128.74", count: 1 } ],
//!     expectations: [
//!         { packets: 4096 },                                              // whole table
//!         { match: { ipv4_dst: "45.10.0.0/24", direction: "uplink" }, packets: 256 },
//!     ],
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::config::HarnessConfig;
use crate::harness::Harness;
use crate::logging::{Facility, Logger};
use crate::packet::{Packet, PacketBuilder};
use crate::policy_convert::{DefaultMatchConverter, StaticRuleLookup};
use crate::sim::SimSwitch;
use crate::subscriber::Subscriber;
use crate::switch::PacketInjector;
use crate::validation::{validate_imsi, validate_subscriber_ip, ValidationResult};
use crate::verifier::{FlowTest, PredicateOutcome};
use crate::{FlowMatch, HarnessError, PolicyRule, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSpec {
    pub dst: String,
    pub src: String,
    #[serde(default)]
    pub ip_proto: u8,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

impl TrafficSpec {
    pub fn packet(&self) -> Result<Packet> {
        PacketBuilder::ip()
            .set_ip_layer(self.dst.as_str(), self.src.as_str())
            .set_proto(self.ip_proto)
            .build()
    }
}

/// Expected packet delta; no `match` means the whole table under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationSpec {
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub flow_match: Option<FlowMatch>,
    pub packets: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Contents of the policy store
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    pub subscribers: Vec<Subscriber>,
    #[serde(default)]
    pub traffic: Vec<TrafficSpec>,
    #[serde(default)]
    pub expectations: Vec<ExpectationSpec>,
    /// Entries the subscriber scopes should add to the table under test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_entries_added: Option<usize>,
}

impl Scenario {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::InvalidScenario(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        json5::from_str(content).map_err(|e| HarnessError::InvalidScenario(e.to_string()))
    }

    /// Harness inputs only; rule contents are left for the switch to judge
    pub fn validate(&self) -> ValidationResult {
        if self.subscribers.is_empty() {
            return Err("scenario has no subscribers".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for sub in &self.subscribers {
            validate_imsi(sub.imsi())?;
            validate_subscriber_ip(sub.ip(), sub.imsi())?;
            if !seen.insert(sub.imsi()) {
                return Err(format!("subscriber {} listed twice", sub.imsi()));
            }
        }
        for (i, traffic) in self.traffic.iter().enumerate() {
            traffic
                .packet()
                .map_err(|e| format!("traffic[{}]: {}", i, e))?;
        }
        Ok(())
    }
}

/// Machine-readable outcome of one scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub passed: bool,
    pub polls: u32,
    pub predicates: Vec<PredicateOutcome>,
    pub entries_added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_entries_added: Option<usize>,
    /// Scope exits that failed; any entry fails the run
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_errors: Vec<String>,
}

/// Run a scenario against `switch`, composing isolator, subscriber contexts
/// and verifier. Returns a report; only setup and verification failures are
/// errors. Every scope is exited even when an earlier exit fails, and the
/// failures land in [`ScenarioReport::cleanup_errors`].
pub fn run_scenario(
    scenario: &Scenario,
    config: &HarnessConfig,
    switch: &SimSwitch,
    logger: &Logger,
) -> Result<ScenarioReport> {
    scenario.validate().map_err(HarnessError::InvalidScenario)?;
    let lookup: StaticRuleLookup = scenario.rules.iter().cloned().collect();
    let harness = Harness::new(
        config.clone(),
        Arc::new(switch.clone()),
        Arc::new(lookup),
        Arc::new(DefaultMatchConverter),
    )
    .with_logger(logger.clone());

    let packets = scenario
        .traffic
        .iter()
        .map(|t| Ok((t.packet()?, t.count)))
        .collect::<Result<Vec<_>>>()?;
    let tests = scenario
        .expectations
        .iter()
        .map(|e| {
            let query = match &e.flow_match {
                Some(m) => harness.query_matching(m),
                None => harness.query(),
            };
            FlowTest::new(query, e.packets)
        })
        .collect();

    log_notice!(
        logger,
        Facility::Harness,
        "scenario '{}': {} subscribers, {} traffic specs, {} expectations",
        scenario.name,
        scenario.subscribers.len(),
        packets.len(),
        scenario.expectations.len()
    );

    let subscribers: Vec<&Subscriber> = scenario.subscribers.iter().collect();
    let entries_before = harness.query().entry_count()?;

    let isolation = match harness.isolator(&subscribers) {
        Some(isolator) => Some(isolator.activate()?),
        None => None,
    };
    let mut contexts = Vec::with_capacity(subscribers.len());
    for sub in &subscribers {
        contexts.push(harness.subscriber((*sub).clone()).activate()?);
    }
    let entries_added = harness
        .query()
        .entry_count()?
        .saturating_sub(entries_before);

    let settle_switch = switch.clone();
    let settle_timeout = config.settle_timeout();
    let region = harness
        .verifier(tests, move || settle_switch.wait_idle(settle_timeout))
        .begin()?;
    for (packet, count) in &packets {
        switch.send(packet, *count);
    }
    let verification = region.finish();

    let mut cleanup_errors = Vec::new();
    for context in contexts.into_iter().rev() {
        if let Err(e) = context.release() {
            cleanup_errors.push(e.to_string());
        }
    }
    if let Some(isolation) = isolation {
        if let Err(e) = isolation.restore() {
            cleanup_errors.push(e.to_string());
        }
    }
    let verification = verification?;

    let entries_ok = scenario
        .expect_entries_added
        .map_or(true, |expected| expected == entries_added);
    let report = ScenarioReport {
        scenario: scenario.name.clone(),
        passed: verification.passed() && entries_ok && cleanup_errors.is_empty(),
        polls: verification.polls(),
        predicates: verification.outcomes().to_vec(),
        entries_added,
        expected_entries_added: scenario.expect_entries_added,
        cleanup_errors,
    };
    log_notice!(
        logger,
        Facility::Harness,
        "scenario '{}' {}",
        report.scenario,
        if report.passed { "passed" } else { "FAILED" }
    );
    Ok(report)
}
