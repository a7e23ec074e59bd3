// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Wiring of configuration, capabilities and logging into ready-to-use scopes.

use metrics::describe_counter;
use std::sync::Arc;

use crate::config::HarnessConfig;
use crate::isolation::{ForwardFlowArgsBuilder, TableIsolator};
use crate::logging::Logger;
use crate::query::FlowQuery;
use crate::subscriber::{Subscriber, SubscriberContext};
use crate::switch::{MatchConverter, RuleLookup, SwitchController, SwitchMatch};
use crate::verifier::{FlowTest, FlowVerifier, VerifyOptions};
use crate::{FlowMatch, Result};

/// Register descriptions of the counters this crate records
pub fn describe_metrics() {
    describe_counter!("flow_verifier_polls_total", "Verification poll ticks");
    describe_counter!(
        "flow_verifier_mismatches_total",
        "Predicates still mismatched when the poll budget ran out"
    );
    describe_counter!(
        "table_restore_failures_total",
        "Entries that could not be restored after table isolation"
    );
}

/// Shared capabilities for one test run
#[derive(Clone)]
pub struct Harness {
    config: HarnessConfig,
    switch: Arc<dyn SwitchController>,
    lookup: Arc<dyn RuleLookup>,
    converter: Arc<dyn MatchConverter>,
    logger: Logger,
}

impl Harness {
    pub fn new(
        config: HarnessConfig,
        switch: Arc<dyn SwitchController>,
        lookup: Arc<dyn RuleLookup>,
        converter: Arc<dyn MatchConverter>,
    ) -> Self {
        describe_metrics();
        let logger = Logger::stderr(config.log_level);
        Self {
            config,
            switch,
            lookup,
            converter,
            logger,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn switch(&self) -> Arc<dyn SwitchController> {
        Arc::clone(&self.switch)
    }

    /// Subscriber scope on the table under test
    pub fn subscriber(&self, subscriber: Subscriber) -> SubscriberContext {
        SubscriberContext::new(
            subscriber,
            self.config.table,
            Arc::clone(&self.switch),
            Arc::clone(&self.lookup),
            Arc::clone(&self.converter),
        )
        .reject_policy(self.config.on_install_rejected)
        .fallback_priority(self.config.fallback_priority)
        .with_logger(self.logger.clone())
    }

    /// One isolator over the classifier table steering every listed
    /// subscriber into the table under test
    pub fn isolator(&self, subscribers: &[&Subscriber]) -> Option<TableIsolator> {
        let (first, rest) = subscribers.split_first()?;
        let args = rest.iter().fold(
            ForwardFlowArgsBuilder::from_subscriber(first, self.config.table)
                .classifier_table(self.config.classifier_table),
            |args, sub| args.with_subscriber(sub),
        );
        Some(args.isolator(self.switch()).with_logger(self.logger.clone()))
    }

    /// Query over the whole table under test
    pub fn query(&self) -> FlowQuery {
        FlowQuery::new(self.config.table, self.switch()).with_logger(self.logger.clone())
    }

    /// Query over the table under test narrowed by a policy-level match
    pub fn query_matching(&self, flow_match: &FlowMatch) -> FlowQuery {
        self.query_switch_match(self.converter.to_switch_match(flow_match))
    }

    pub fn query_switch_match(&self, predicate: SwitchMatch) -> FlowQuery {
        self.query().with_match(predicate)
    }

    pub fn verifier<S>(&self, tests: Vec<FlowTest>, settle: S) -> FlowVerifier
    where
        S: FnOnce() -> Result<()> + Send + 'static,
    {
        FlowVerifier::new(tests, settle)
            .with_options(VerifyOptions::from(&self.config.verify))
            .with_logger(self.logger.clone())
    }
}
