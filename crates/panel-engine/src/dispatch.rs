//! Transaction dispatcher
//!
//! Serialises every send on a panel behind one transmission lock. The lock
//! guards the whole [`Channel`]: the bus, the fragment buffers the
//! interpreter rewrites, and the runtime state. A transaction is built and
//! sent in one critical section, which may span several bus bursts.
//!
//! On top of the lock sits exclusive mode. A privileged caller (image
//! upload, checksum verification) takes an [`ExclusiveGuard`]; ordinary
//! senders arriving while it is held wait until it drops, unless every
//! fragment they send is on the guard's permit list. Entering waits for a
//! previous holder, raises the flag, then gives senders already admitted a
//! bounded time to finish.
//!
//! Hardware absence never blocks or fails the caller: a missing backend,
//! detached or unpowered panel, or empty transaction is reported as
//! [`Outcome::Skipped`], and a transport failure as [`Outcome::Dropped`].

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use panel_platform::{BusTransport, TransportError};

use crate::assembler::Transaction;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::fragment::{FragmentId, FragmentRegistry};
use crate::state::PanelRuntimeState;

/// Fragments exclusive mode can let through.
pub const MAX_PERMITS: usize = 8;

/// Fragment identifiers allowed past exclusive mode.
pub type Permits = heapless::Vec<FragmentId, MAX_PERMITS>;

/// Why a transaction was not sent. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    /// No transport attached yet.
    NotRegistered,
    /// Panel logically disconnected.
    Detached,
    /// Panel powered down.
    PoweredDown,
    /// Nothing to send.
    Empty,
    /// The fragment is not configured for this revision.
    NotConfigured(FragmentId),
}

/// Result of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The transport accepted this many bytes.
    Sent(usize),
    /// Policy no-op.
    Skipped(SkipCause),
    /// The transport failed; the transaction is gone.
    Dropped(TransportError),
}

impl Outcome {
    /// `true` if the transaction reached the bus.
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Whatever sits behind the transmission lock.
pub trait Channel {
    /// Send `transaction`, applying the channel's guard checks.
    fn transmit(&mut self, transaction: &Transaction) -> Outcome;
}

/// Panel-side channel: bus, command buffers and live state.
#[derive(Debug)]
pub struct PanelChannel<B> {
    /// Transport, once the display backend registered one.
    pub bus: Option<B>,
    /// Loaded fragments; mutable payloads are rewritten here.
    pub registry: FragmentRegistry,
    /// Live state.
    pub state: PanelRuntimeState,
}

impl<B> PanelChannel<B> {
    /// Channel with no transport attached.
    pub fn new(registry: FragmentRegistry, state: PanelRuntimeState) -> Self {
        Self {
            bus: None,
            registry,
            state,
        }
    }

    fn guard(&self, transaction: &Transaction) -> Option<SkipCause> {
        if self.bus.is_none() {
            Some(SkipCause::NotRegistered)
        } else if !self.state.link.attached {
            Some(SkipCause::Detached)
        } else if !self.state.link.powered {
            Some(SkipCause::PoweredDown)
        } else if transaction.is_empty() {
            Some(SkipCause::Empty)
        } else {
            None
        }
    }
}

impl<B: BusTransport> Channel for PanelChannel<B> {
    fn transmit(&mut self, transaction: &Transaction) -> Outcome {
        if let Some(cause) = self.guard(transaction) {
            match cause {
                SkipCause::Empty => tracing::debug!("nothing to send"),
                _ => tracing::warn!(?cause, "transaction skipped"),
            }
            return Outcome::Skipped(cause);
        }
        let Some(bus) = self.bus.as_mut() else {
            return Outcome::Skipped(SkipCause::NotRegistered);
        };
        match bus.send(transaction.descriptors(), transaction.speed()) {
            Ok(bytes) => {
                tracing::debug!(
                    bytes,
                    descriptors = transaction.len(),
                    fragments = transaction.fragment_count(),
                    "transaction sent"
                );
                Outcome::Sent(bytes)
            }
            Err(err) => {
                tracing::warn!(%err, descriptors = transaction.len(), "transaction dropped");
                Outcome::Dropped(err)
            }
        }
    }
}

#[derive(Debug, Default)]
struct Gate {
    exclusive: bool,
    permits: Permits,
    in_flight: usize,
}

impl Gate {
    fn admits(&self, fragments: &[FragmentId]) -> bool {
        !self.exclusive
            || (!fragments.is_empty() && fragments.iter().all(|id| self.permits.contains(id)))
    }
}

/// Transmission lock plus exclusive mode.
#[derive(Debug)]
pub struct Dispatcher<C> {
    channel: Mutex<C>,
    gate: Mutex<Gate>,
    cond: Condvar,
    retry_budget: u32,
    poll_interval: Duration,
}

impl<C: Channel> Dispatcher<C> {
    /// Wrap `channel` with the drain budget from `config`.
    pub fn new(channel: C, config: &EngineConfig) -> Self {
        Self {
            channel: Mutex::new(channel),
            gate: Mutex::new(Gate::default()),
            cond: Condvar::new(),
            retry_budget: config.retry_budget,
            poll_interval: config.poll_interval(),
        }
    }

    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_channel(&self) -> MutexGuard<'_, C> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the channel without sending. Waits out exclusive mode.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        self.with_admitted(&[], f)
    }

    /// Like [`with`](Self::with), admitted past exclusive mode when every
    /// fragment in `fragments` is permitted.
    pub fn with_admitted<R>(&self, fragments: &[FragmentId], f: impl FnOnce(&mut C) -> R) -> R {
        let _admission = self.admit(fragments);
        f(&mut *self.lock_channel())
    }

    /// Build a transaction under the lock and send it.
    ///
    /// `fragments` names what the transaction carries; it decides whether
    /// exclusive mode lets the call through.
    pub fn dispatch<F>(&self, fragments: &[FragmentId], build: F) -> Result<Outcome, EngineError>
    where
        F: FnOnce(&mut C) -> Result<Transaction, EngineError>,
    {
        self.dispatch_with(fragments, build, |_, _| {})
    }

    /// [`dispatch`](Self::dispatch), then run `complete` with the outcome
    /// before the lock is released.
    pub fn dispatch_with<F, G>(
        &self,
        fragments: &[FragmentId],
        build: F,
        complete: G,
    ) -> Result<Outcome, EngineError>
    where
        F: FnOnce(&mut C) -> Result<Transaction, EngineError>,
        G: FnOnce(&mut C, &Outcome),
    {
        let _admission = self.admit(fragments);
        self.send_locked(build, complete)
    }

    fn send_locked<F, G>(&self, build: F, complete: G) -> Result<Outcome, EngineError>
    where
        F: FnOnce(&mut C) -> Result<Transaction, EngineError>,
        G: FnOnce(&mut C, &Outcome),
    {
        let mut channel = self.lock_channel();
        let transaction = build(&mut *channel)?;
        let outcome = channel.transmit(&transaction);
        complete(&mut *channel, &outcome);
        Ok(outcome)
    }

    /// Wait until the gate admits `fragments`, then count the caller in
    /// flight until the returned ticket drops.
    fn admit(&self, fragments: &[FragmentId]) -> Admission<'_, C> {
        let gate = self.gate();
        let mut gate = self
            .cond
            .wait_while(gate, |g| !g.admits(fragments))
            .unwrap_or_else(PoisonError::into_inner);
        gate.in_flight = gate.in_flight.saturating_add(1);
        Admission { dispatcher: self }
    }

    /// Enter exclusive mode, letting `permits` through to other senders.
    ///
    /// Blocks while another guard is held. Senders already admitted get
    /// `retry_budget` polls to finish; past that the guard is returned
    /// anyway, since the transmission lock still serialises the bus.
    pub fn enter_exclusive(&self, permits: &[FragmentId]) -> ExclusiveGuard<'_, C> {
        let gate = self.gate();
        let mut gate = self
            .cond
            .wait_while(gate, |g| g.exclusive)
            .unwrap_or_else(PoisonError::into_inner);
        gate.exclusive = true;
        gate.permits.clear();
        for &id in permits {
            if gate.permits.push(id).is_err() {
                tracing::warn!(fragment = id.name(), "permit list full");
                break;
            }
        }

        let mut polls = 0u32;
        while gate.in_flight > 0 {
            if polls >= self.retry_budget {
                tracing::warn!(in_flight = gate.in_flight, polls, "exclusive entry gave up draining");
                break;
            }
            let (next, _) = self
                .cond
                .wait_timeout(gate, self.poll_interval)
                .unwrap_or_else(PoisonError::into_inner);
            gate = next;
            polls = polls.saturating_add(1);
        }
        tracing::debug!(permits = gate.permits.len(), polls, "exclusive mode entered");
        drop(gate);
        ExclusiveGuard { dispatcher: self }
    }

    /// `true` while an [`ExclusiveGuard`] is held.
    pub fn is_exclusive(&self) -> bool {
        self.gate().exclusive
    }

    /// Senders admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.gate().in_flight
    }
}

/// In-flight ticket for an admitted sender.
struct Admission<'a, C> {
    dispatcher: &'a Dispatcher<C>,
}

impl<C> Drop for Admission<'_, C> {
    fn drop(&mut self) {
        let mut gate = self.dispatcher.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.in_flight = gate.in_flight.saturating_sub(1);
        drop(gate);
        self.dispatcher.cond.notify_all();
    }
}

/// Exclusive-mode token. Dropping it wakes every waiting sender.
#[derive(Debug)]
#[must_use = "exclusive mode ends when the guard drops"]
pub struct ExclusiveGuard<'a, C: Channel> {
    dispatcher: &'a Dispatcher<C>,
}

impl<C: Channel> ExclusiveGuard<'_, C> {
    /// Send as the exclusive holder, bypassing the gate.
    pub fn dispatch<F>(&self, build: F) -> Result<Outcome, EngineError>
    where
        F: FnOnce(&mut C) -> Result<Transaction, EngineError>,
    {
        self.dispatcher.send_locked(build, |_, _| {})
    }

    /// Run `f` on the channel as the exclusive holder.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut *self.dispatcher.lock_channel())
    }
}

impl<C: Channel> Drop for ExclusiveGuard<'_, C> {
    fn drop(&mut self) {
        let mut gate = self.dispatcher.gate();
        gate.exclusive = false;
        gate.permits.clear();
        drop(gate);
        self.dispatcher.cond.notify_all();
        tracing::debug!("exclusive mode released");
    }
}
