// SPDX-License-Identifier: Apache-2.0 OR MIT
// Integration test utilities
//
// Every test gets its own simulated switch with a worker thread, a fresh
// policy store and an in-memory log sink. Nothing here needs privileges.

use anyhow::{Context, Result};
use flowtest_harness::config::{HarnessConfig, VerifyConfig};
use flowtest_harness::harness::Harness;
use flowtest_harness::logging::{Logger, MemorySink};
use flowtest_harness::packet::{Packet, PacketBuilder};
use flowtest_harness::policy_convert::{DefaultMatchConverter, StaticRuleLookup};
use flowtest_harness::sim::{SimRuntime, SimSwitch};
use flowtest_harness::subscriber::{Subscriber, SubscriberBuilder};
use flowtest_harness::switch::{PacketInjector, SwitchController};
use flowtest_harness::TableId;
use std::sync::Arc;

/// Config with a short poll budget so failing tests fail fast
pub fn fast_config() -> HarnessConfig {
    HarnessConfig {
        verify: VerifyConfig {
            max_polls: 5,
            poll_interval_ms: 10,
        },
        ..HarnessConfig::default()
    }
}

/// Running simulated switch plus a harness wired to it
pub struct SimFixture {
    pub config: HarnessConfig,
    pub switch: SimSwitch,
    pub lookup: StaticRuleLookup,
    pub harness: Harness,
    pub logs: MemorySink,
    runtime: Option<SimRuntime>,
}

impl SimFixture {
    pub fn start() -> Result<Self> {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: HarnessConfig) -> Result<Self> {
        let (logger, logs) = Logger::memory();
        let runtime = SimSwitch::start(config.classifier_table, logger.clone())
            .context("Failed to start simulated switch")?;
        let switch = runtime.handle();
        let lookup = StaticRuleLookup::new();
        let harness = Harness::new(
            config.clone(),
            Arc::new(switch.clone()),
            Arc::new(lookup.clone()),
            Arc::new(DefaultMatchConverter),
        )
        .with_logger(logger);

        Ok(Self {
            config,
            switch,
            lookup,
            harness,
            logs,
            runtime: Some(runtime),
        })
    }

    /// Settle closure for a verifier: wait until the worker drained its queue
    pub fn settle(&self) -> impl FnOnce() -> flowtest_harness::Result<()> + Send + 'static {
        let switch = self.switch.clone();
        let timeout = self.config.settle_timeout();
        move || switch.wait_idle(timeout)
    }

    pub fn send(&self, packet: &Packet, count: u32) {
        self.switch.send(packet, count);
    }

    pub fn table(&self) -> TableId {
        self.config.table
    }

    pub fn classifier(&self) -> TableId {
        self.config.classifier_table
    }

    /// Entry ids of `table` in lookup order
    pub fn ids(&self, table: TableId) -> Result<Vec<String>> {
        Ok(self
            .switch
            .list_entries(table, None)?
            .into_iter()
            .map(|s| s.entry.id.to_string())
            .collect())
    }
}

impl Drop for SimFixture {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.stop();
        }
    }
}

pub fn subscriber(imsi: &str, ip: &str) -> Result<SubscriberBuilder> {
    Ok(SubscriberBuilder::new(imsi, ip.parse()?))
}

/// Plain IP packet template from `src` to `dst`
pub fn packet(dst: &str, src: &str) -> Result<Packet> {
    Ok(PacketBuilder::ip().set_ip_layer(dst, src).build()?)
}

pub fn tcp_packet(dst: &str, src: &str) -> Result<Packet> {
    Ok(PacketBuilder::tcp().set_ip_layer(dst, src).build()?)
}

pub fn refs(subscribers: &[Subscriber]) -> Vec<&Subscriber> {
    subscribers.iter().collect()
}
