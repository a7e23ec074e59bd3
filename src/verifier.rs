// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Packet counter delta verification.
//!
//! ```ignore
//! let region = FlowVerifier::new(tests, move || switch.wait_idle(timeout)).begin()?;
//! injector.send(&packet, 1);
//! let verification = region.finish()?;   // settle once, then poll
//! // ... outer scopes release here ...
//! verification.verify()?;
//! ```
//!
//! Every predicate is re-sampled on every tick; the loop ends as soon as all
//! deltas match or the poll budget is spent.

use metrics::counter;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::VerifyConfig;
use crate::error::{DeltaMismatch, HarnessError, MismatchReport};
use crate::logging::{Facility, Logger};
use crate::query::FlowQuery;
use crate::Result;

type Comparator = Arc<dyn Fn(i64) -> bool + Send + Sync>;
type Settle = Box<dyn FnOnce() -> Result<()> + Send>;

/// Condition on one predicate's packet delta
#[derive(Clone)]
pub enum Expectation {
    Exactly(u64),
    AtLeast(u64),
    Custom { description: String, check: Comparator },
}

impl Expectation {
    pub fn check(&self, delta: i64) -> bool {
        match self {
            Expectation::Exactly(n) => i64::try_from(*n).is_ok_and(|n| n == delta),
            Expectation::AtLeast(n) => i64::try_from(*n).is_ok_and(|n| delta >= n),
            Expectation::Custom { check, .. } => check(delta),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Exactly(n) => write!(f, "== {}", n),
            Expectation::AtLeast(n) => write!(f, ">= {}", n),
            Expectation::Custom { description, .. } => write!(f, "{}", description),
        }
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expectation({})", self)
    }
}

/// A query and the packet increase it should observe
#[derive(Debug, Clone)]
pub struct FlowTest {
    pub query: FlowQuery,
    pub expectation: Expectation,
}

impl FlowTest {
    pub fn new(query: FlowQuery, expected: u64) -> Self {
        Self {
            query,
            expectation: Expectation::Exactly(expected),
        }
    }

    pub fn at_least(query: FlowQuery, minimum: u64) -> Self {
        Self {
            query,
            expectation: Expectation::AtLeast(minimum),
        }
    }

    pub fn matching<F>(query: FlowQuery, description: impl Into<String>, check: F) -> Self
    where
        F: Fn(i64) -> bool + Send + Sync + 'static,
    {
        Self {
            query,
            expectation: Expectation::Custom {
                description: description.into(),
                check: Arc::new(check),
            },
        }
    }
}

/// A named group of tests; flattened into the verifier's list
#[derive(Debug, Clone, Default)]
pub struct SubTest {
    pub name: String,
    pub tests: Vec<FlowTest>,
}

impl SubTest {
    pub fn new(name: impl Into<String>, tests: Vec<FlowTest>) -> Self {
        Self {
            name: name.into(),
            tests,
        }
    }
}

/// Poll budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    pub max_polls: u32,
    pub poll_interval: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        VerifyOptions::from(&VerifyConfig::default())
    }
}

impl From<&VerifyConfig> for VerifyOptions {
    fn from(config: &VerifyConfig) -> Self {
        Self {
            max_polls: config.max_polls,
            poll_interval: config.poll_interval(),
        }
    }
}

/// Packet counts of every predicate at one instant, by test index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowStatSnapshot {
    counts: Vec<(String, u64)>,
}

impl FlowStatSnapshot {
    fn take(tests: &[FlowTest]) -> Result<Self> {
        let counts = tests
            .iter()
            .map(|t| Ok((t.query.label(), t.query.packet_count()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { counts })
    }

    pub fn count(&self, index: usize) -> Option<u64> {
        self.counts.get(index).map(|(_, count)| *count)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.counts.get(index).map(|(label, _)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

pub struct FlowVerifier {
    tests: Vec<FlowTest>,
    settle: Settle,
    options: VerifyOptions,
    logger: Logger,
}

impl FlowVerifier {
    pub fn new<S>(tests: Vec<FlowTest>, settle: S) -> Self
    where
        S: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            tests,
            settle: Box::new(settle),
            options: VerifyOptions::default(),
            logger: Logger::default(),
        }
    }

    pub fn with_subtest(mut self, group: SubTest) -> Self {
        self.tests.extend(group.tests);
        self
    }

    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn tests(&self) -> &[FlowTest] {
        &self.tests
    }

    /// Take the baseline and open the verification region
    pub fn begin(self) -> Result<VerificationRegion> {
        let baseline = FlowStatSnapshot::take(&self.tests)?;
        for (label, count) in &baseline.counts {
            log_debug!(self.logger, Facility::Verifier, "baseline {} = {}", label, count);
        }
        Ok(VerificationRegion {
            tests: self.tests,
            settle: Some(self.settle),
            options: self.options,
            logger: self.logger,
            baseline,
            finished: false,
        })
    }

    /// `begin`, run `traffic`, `finish`
    pub fn observe<F>(self, traffic: F) -> Result<Verification>
    where
        F: FnOnce() -> Result<()>,
    {
        let region = self.begin()?;
        traffic()?;
        region.finish()
    }
}

/// Open verification region; traffic is injected while it is alive
pub struct VerificationRegion {
    tests: Vec<FlowTest>,
    settle: Option<Settle>,
    options: VerifyOptions,
    logger: Logger,
    baseline: FlowStatSnapshot,
    finished: bool,
}

impl VerificationRegion {
    pub fn baseline(&self) -> &FlowStatSnapshot {
        &self.baseline
    }

    /// Settle once, then poll until every delta matches or the budget runs out.
    ///
    /// A mismatch is not an error here; it is reported by
    /// [`Verification::verify`]. Settle and query failures are.
    pub fn finish(mut self) -> Result<Verification> {
        self.finished = true;
        if let Some(settle) = self.settle.take() {
            settle().map_err(|e| match e {
                HarnessError::Settle(_) => e,
                other => HarnessError::Settle(other.to_string()),
            })?;
        }

        let max_polls = self.options.max_polls.max(1);
        let mut observed: Vec<Option<i64>> = vec![None; self.tests.len()];
        let mut polls = 0;

        while polls < max_polls {
            if polls > 0 {
                thread::sleep(self.options.poll_interval);
            }
            polls += 1;
            counter!("flow_verifier_polls_total").increment(1);

            // No short-circuit: every comparator sees this tick's sample
            let mut all_match = true;
            for (index, test) in self.tests.iter().enumerate() {
                let count = test.query.packet_count()?;
                let base = self.baseline.count(index).unwrap_or(0);
                let delta = count as i64 - base as i64;
                observed[index] = Some(delta);
                all_match &= test.expectation.check(delta);
            }
            log_debug!(
                self.logger,
                Facility::Verifier,
                "poll {}/{}: {:?}",
                polls,
                max_polls,
                observed
            );
            if all_match {
                break;
            }
        }

        let outcomes: Vec<PredicateOutcome> = self
            .tests
            .iter()
            .zip(&observed)
            .map(|(test, observed)| PredicateOutcome {
                predicate: test.query.label(),
                expected: test.expectation.to_string(),
                observed: *observed,
                passed: observed.is_some_and(|d| test.expectation.check(d)),
            })
            .collect();

        let failed = outcomes.iter().filter(|o| !o.passed).count();
        if failed == 0 {
            log_info!(
                self.logger,
                Facility::Verifier,
                "{} predicates matched after {} polls",
                outcomes.len(),
                polls
            );
        } else {
            counter!("flow_verifier_mismatches_total").increment(failed as u64);
            log_warning!(
                self.logger,
                Facility::Verifier,
                "{} of {} predicates still mismatched after {} polls",
                failed,
                outcomes.len(),
                polls
            );
        }
        Ok(Verification { polls, outcomes })
    }
}

impl Drop for VerificationRegion {
    fn drop(&mut self) {
        if !self.finished {
            log_warning!(
                self.logger,
                Facility::Verifier,
                "region left without finish, skipping settle and {} predicates",
                self.tests.len()
            );
        }
    }
}

/// Result for one predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredicateOutcome {
    pub predicate: String,
    pub expected: String,
    pub observed: Option<i64>,
    pub passed: bool,
}

/// Outcome of a finished region, reported after the outer scopes have exited
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    polls: u32,
    outcomes: Vec<PredicateOutcome>,
}

impl Verification {
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn outcomes(&self) -> &[PredicateOutcome] {
        &self.outcomes
    }

    /// Last observed delta of the predicate at `index`
    pub fn observed(&self, index: usize) -> Option<i64> {
        self.outcomes.get(index).and_then(|o| o.observed)
    }

    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn verify(self) -> Result<()> {
        if self.passed() {
            return Ok(());
        }
        let mismatches = self
            .outcomes
            .into_iter()
            .filter(|o| !o.passed)
            .map(|o| DeltaMismatch {
                predicate: o.predicate,
                expected: o.expected,
                observed: o.observed,
            })
            .collect();
        Err(HarnessError::VerificationMismatch {
            polls: self.polls,
            mismatches: MismatchReport(mismatches),
        })
    }
}
