// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Simulated switch runtime: a cloneable handle plus a worker thread that
//! processes injected traffic.
//!
//! Controller operations (install, remove, list) are synchronous and
//! acknowledged before they return. Injected packets are queued and counted
//! later by the worker, so a test must settle ([`SimSwitch::wait_idle`])
//! before the counters are final.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::table::{MissCounters, SimTables};
use crate::handoff::reference_channel;
use crate::logging::{Facility, Logger};
use crate::packet::Packet;
use crate::switch::{
    EntryId, EntryRef, EntryStats, FlowEntry, PacketInjector, SwitchController, SwitchError,
    SwitchMatch,
};
use crate::{HarnessError, Result, TableId};

const IDLE_POLL: Duration = Duration::from_millis(2);

enum SimCommand {
    Inject { packet: Packet, count: u32 },
    Shutdown,
}

/// Handle to a simulated switch; clones share the same tables
#[derive(Clone)]
pub struct SimSwitch {
    tables: Arc<Mutex<SimTables>>,
    reachable: Arc<AtomicBool>,
    /// Injected batches not yet processed
    pending: Arc<AtomicU64>,
    install_faults: Arc<Mutex<HashSet<EntryId>>>,
    remove_faults: Arc<Mutex<HashSet<EntryId>>>,
    /// `None` for a detached switch, which processes traffic on the caller
    commands: Option<mpsc::UnboundedSender<SimCommand>>,
    logger: Logger,
}

impl SimSwitch {
    fn with_parts(
        ingress: TableId,
        commands: Option<mpsc::UnboundedSender<SimCommand>>,
        logger: Logger,
    ) -> Self {
        Self {
            tables: Arc::new(Mutex::new(SimTables::new(ingress))),
            reachable: Arc::new(AtomicBool::new(true)),
            pending: Arc::new(AtomicU64::new(0)),
            install_faults: Arc::new(Mutex::new(HashSet::new())),
            remove_faults: Arc::new(Mutex::new(HashSet::new())),
            commands,
            logger,
        }
    }

    /// Switch without a worker thread: `send` counts packets before it returns
    pub fn detached(ingress: TableId) -> Self {
        Self::with_parts(ingress, None, Logger::default())
    }

    /// Start the worker thread and wait for it to hand back the switch handle
    pub fn start(ingress: TableId, logger: Logger) -> Result<SimRuntime> {
        let (handle_tx, handle_rx) = reference_channel::<SimSwitch>("simulated switch");
        let worker_logger = logger.clone();

        let worker = thread::Builder::new()
            .name("sim-switch".to_string())
            .spawn(move || {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let switch = SimSwitch::with_parts(ingress, Some(tx), worker_logger.clone());
                let tables = Arc::clone(&switch.tables);
                let pending = Arc::clone(&switch.pending);
                if !handle_tx.fulfill(switch) {
                    return;
                }
                log_debug!(worker_logger, Facility::Switch, "worker started, ingress {}", ingress);

                while let Some(command) = rx.blocking_recv() {
                    match command {
                        SimCommand::Inject { packet, count } => {
                            lock(&tables).process(&packet, count);
                            pending.fetch_sub(1, Ordering::AcqRel);
                        }
                        SimCommand::Shutdown => break,
                    }
                }
                log_debug!(worker_logger, Facility::Switch, "worker stopped");
            })
            .map_err(spawn_error)?;

        let handle = handle_rx.wait()?;
        Ok(SimRuntime {
            handle,
            worker: Some(worker),
        })
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Simulate a controller channel outage; controller calls fail with
    /// [`SwitchError::Unreachable`] until restored. Traffic still flows.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Reject every future install batch containing `entry`
    pub fn inject_install_fault(&self, entry: EntryId) {
        lock(&self.install_faults).insert(entry);
    }

    /// Reject every future removal batch containing `entry`
    pub fn inject_remove_fault(&self, entry: EntryId) {
        lock(&self.remove_faults).insert(entry);
    }

    pub fn clear_faults(&self) {
        lock(&self.install_faults).clear();
        lock(&self.remove_faults).clear();
    }

    /// Block until every injected batch has been counted
    pub fn wait_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self.pending.load(Ordering::Acquire);
            if pending == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(HarnessError::Settle(format!(
                    "{} traffic batches still queued after {:?}",
                    pending, timeout
                )));
            }
            thread::sleep(IDLE_POLL);
        }
    }

    pub fn misses(&self) -> MissCounters {
        lock(&self.tables).misses()
    }

    fn check_reachable(&self) -> std::result::Result<(), SwitchError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SwitchError::Unreachable(
                "controller channel is down".to_string(),
            ))
        }
    }
}

fn spawn_error(err: std::io::Error) -> HarnessError {
    HarnessError::WorkerSpawn {
        name: "simulated switch".to_string(),
        reason: err.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SwitchController for SimSwitch {
    fn install_entries(&self, entries: &[FlowEntry]) -> std::result::Result<(), SwitchError> {
        self.check_reachable()?;
        {
            let faults = lock(&self.install_faults);
            if let Some(entry) = entries.iter().find(|e| faults.contains(&e.id)) {
                return Err(SwitchError::Rejected {
                    entry: entry.id.clone(),
                    reason: "injected install fault".to_string(),
                });
            }
        }
        lock(&self.tables).install(entries)?;
        for entry in entries {
            log_debug!(
                self.logger,
                Facility::Switch,
                "installed {} prio {} [{}]",
                entry.entry_ref(),
                entry.priority,
                entry.matcher
            );
        }
        Ok(())
    }

    fn remove_entries(&self, entries: &[EntryRef]) -> std::result::Result<(), SwitchError> {
        self.check_reachable()?;
        {
            let faults = lock(&self.remove_faults);
            if let Some(entry) = entries.iter().find(|e| faults.contains(&e.id)) {
                return Err(SwitchError::Rejected {
                    entry: entry.id.clone(),
                    reason: "injected remove fault".to_string(),
                });
            }
        }
        lock(&self.tables).remove(entries)?;
        for entry in entries {
            log_debug!(self.logger, Facility::Switch, "removed {}", entry);
        }
        Ok(())
    }

    fn list_entries(
        &self,
        table: TableId,
        predicate: Option<&SwitchMatch>,
    ) -> std::result::Result<Vec<EntryStats>, SwitchError> {
        self.check_reachable()?;
        Ok(lock(&self.tables).list(table, predicate))
    }
}

impl PacketInjector for SimSwitch {
    fn send(&self, packet: &Packet, count: u32) {
        let Some(commands) = &self.commands else {
            lock(&self.tables).process(packet, count);
            return;
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        let command = SimCommand::Inject {
            packet: packet.clone(),
            count,
        };
        if commands.send(command).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            log_warning!(
                self.logger,
                Facility::Switch,
                "worker gone, dropped {} x {} packets",
                count,
                packet.fan_out()
            );
        }
    }
}

/// Owner of the worker thread; stops it on [`SimRuntime::stop`] or drop
pub struct SimRuntime {
    handle: SimSwitch,
    worker: Option<JoinHandle<()>>,
}

impl SimRuntime {
    pub fn handle(&self) -> SimSwitch {
        self.handle.clone()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Some(commands) = &self.handle.commands {
                let _ = commands.send(SimCommand::Shutdown);
            }
            if worker.join().is_err() {
                log_error!(self.handle.logger, Facility::Switch, "switch worker panicked");
            }
        }
    }
}

impl Drop for SimRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
