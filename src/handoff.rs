// SPDX-License-Identifier: Apache-2.0 OR MIT
//! One-shot delivery of a capability handle from the thread that creates it
//! to the thread that uses it.
//!
//! A controller (or the simulated switch) starts on its own worker thread and
//! publishes its handle exactly once; the test thread blocks until it arrives.

use tokio::sync::oneshot;

use crate::{HarnessError, Result};

/// Producer side; consumed by [`ReferenceSender::fulfill`]
#[derive(Debug)]
pub struct ReferenceSender<T> {
    name: String,
    tx: oneshot::Sender<T>,
}

/// Consumer side; consumed by [`ControllerReference::wait`]
#[derive(Debug)]
pub struct ControllerReference<T> {
    name: String,
    rx: oneshot::Receiver<T>,
}

/// Create a fresh handoff channel for the capability called `name`
pub fn reference_channel<T>(name: &str) -> (ReferenceSender<T>, ControllerReference<T>) {
    let (tx, rx) = oneshot::channel();
    (
        ReferenceSender {
            name: name.to_string(),
            tx,
        },
        ControllerReference {
            name: name.to_string(),
            rx,
        },
    )
}

impl<T> ReferenceSender<T> {
    /// Publish the handle. Returns false if the consumer already went away.
    pub fn fulfill(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> ControllerReference<T> {
    /// Block the calling thread until the handle is delivered.
    ///
    /// Fails with [`HarnessError::ControllerUnavailable`] if the producer was
    /// dropped without fulfilling. Must not be called from inside an async
    /// runtime.
    pub fn wait(self) -> Result<T> {
        self.rx
            .blocking_recv()
            .map_err(|_| HarnessError::ControllerUnavailable { name: self.name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
