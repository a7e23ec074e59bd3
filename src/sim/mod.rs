// SPDX-License-Identifier: Apache-2.0 OR MIT
//! In-process simulated switch.
//!
//! Implements [`crate::switch::SwitchController`] and
//! [`crate::switch::PacketInjector`] so the harness, the scenario runner and
//! the test suite run without a controller process.

mod runtime;
mod table;

pub use runtime::{SimRuntime, SimSwitch};
pub use table::{MissCounters, SimTables};
