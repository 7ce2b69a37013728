//! Mock implementations for testing
//!
//! [`MockBus`] records every transmission it receives and can be told to
//! fail or to stall, so dispatcher and concurrency tests can run without a
//! panel attached. Clones share one log: keep a clone before handing the
//! bus to the engine and inspect it afterwards.

#![cfg(any(test, feature = "std"))]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use std::vec::Vec;

use crate::dsi::{Descriptor, TransmissionSpeed};
use crate::transport::{BusTransport, TransportError};

/// One recorded call to [`BusTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    /// Descriptors in the order they were handed over.
    pub descriptors: Vec<Descriptor>,
    /// Link mode requested for the burst.
    pub speed: TransmissionSpeed,
}

#[derive(Debug, Default)]
struct BusInner {
    log: Vec<Transmission>,
    fail_next: Option<TransportError>,
    fail_always: Option<TransportError>,
    failed_sends: usize,
}

/// Recording bus transport.
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    inner: Arc<Mutex<BusInner>>,
    delay: Option<Duration>,
}

impl MockBus {
    /// Create a bus with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every send, holding the caller's locks.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next send with `err`, then recover.
    pub fn fail_next(&self, err: TransportError) {
        self.lock().fail_next = Some(err);
    }

    /// Fail every send with `err` until cleared with `None`.
    pub fn fail_always(&self, err: Option<TransportError>) {
        self.lock().fail_always = err;
    }

    /// Snapshot of all successful transmissions.
    pub fn transmissions(&self) -> Vec<Transmission> {
        self.lock().log.clone()
    }

    /// Number of successful transmissions.
    pub fn sent_count(&self) -> usize {
        self.lock().log.len()
    }

    /// Number of sends that were failed on request.
    pub fn failed_count(&self) -> usize {
        self.lock().failed_sends
    }

    /// All descriptors sent so far, flattened in order.
    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.lock()
            .log
            .iter()
            .flat_map(|t| t.descriptors.iter().cloned())
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.log.clear();
        inner.failed_sends = 0;
    }
}

impl BusTransport for MockBus {
    fn send(
        &mut self,
        descriptors: &[Descriptor],
        speed: TransmissionSpeed,
    ) -> Result<usize, TransportError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut inner = self.lock();
        if let Some(err) = inner.fail_next.take().or(inner.fail_always) {
            inner.failed_sends = inner.failed_sends.saturating_add(1);
            return Err(err);
        }

        let bytes = descriptors
            .iter()
            .fold(0usize, |acc, d| acc.saturating_add(d.len()));
        inner.log.push(Transmission {
            descriptors: descriptors.to_vec(),
            speed,
        });
        Ok(bytes)
    }
}
