//! Cancellable single-slot deferred action
//!
//! A `DeferredAction` holds at most one armed countdown. When the countdown
//! elapses the background task hands its ticket to the owner's callback, and
//! the owner must `claim` that ticket (under the same lock that guards
//! `cancel`) before acting. Whichever of cancel and claim reaches the slot
//! first wins, so a cancelled action never runs and a claimed action can no
//! longer be cancelled.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Identifies one armed countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionTicket(u64);

/// Observable state of the action slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// No countdown pending
    Inactive,
    /// A countdown is running
    Armed,
}

struct Armed {
    ticket: ActionTicket,
    task: JoinHandle<()>,
}

/// Single-slot cancellable action
pub struct DeferredAction {
    /// Label used in log output
    name: &'static str,
    /// Runtime the countdown tasks are spawned on
    runtime: Handle,
    armed: Option<Armed>,
    next_ticket: u64,
}

impl DeferredAction {
    /// Create an inactive action whose countdowns run on `runtime`
    pub fn new(name: &'static str, runtime: Handle) -> Self {
        Self {
            name,
            runtime,
            armed: None,
            next_ticket: 0,
        }
    }

    pub fn state(&self) -> ActionState {
        if self.armed.is_some() {
            ActionState::Armed
        } else {
            ActionState::Inactive
        }
    }

    /// Start a countdown of `delay` unless one is already armed
    ///
    /// Returns the new ticket, or `None` if an action was already armed (the
    /// running countdown is left untouched). `on_fire` runs on the runtime
    /// once the delay elapses and must `claim` the ticket before acting.
    pub fn arm<F>(&mut self, delay: Duration, on_fire: F) -> Option<ActionTicket>
    where
        F: FnOnce(ActionTicket) + Send + 'static,
    {
        if self.armed.is_some() {
            trace!(action = self.name, "already armed");
            return None;
        }

        let ticket = ActionTicket(self.next_ticket);
        self.next_ticket += 1;

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(ticket);
        });

        debug!(action = self.name, ?ticket, delay_ms = delay.as_millis() as u64, "deferred action armed");
        self.armed = Some(Armed { ticket, task });
        Some(ticket)
    }

    /// Cancel the pending countdown, if any
    ///
    /// Returns true if a countdown was armed. An aborted countdown exits
    /// silently.
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.task.abort();
                debug!(action = self.name, ticket = ?armed.ticket, "deferred action cancelled");
                true
            }
            None => false,
        }
    }

    /// Claim a fired ticket
    ///
    /// Succeeds only if `ticket` is the live countdown; the slot returns to
    /// `Inactive`. Stale tickets (cancelled or superseded) are rejected.
    pub fn claim(&mut self, ticket: ActionTicket) -> bool {
        match &self.armed {
            Some(armed) if armed.ticket == ticket => {
                self.armed = None;
                debug!(action = self.name, ?ticket, "deferred action fired");
                true
            }
            _ => {
                trace!(action = self.name, ?ticket, "stale ticket ignored");
                false
            }
        }
    }
}

impl Drop for DeferredAction {
    fn drop(&mut self) {
        self.cancel();
    }
}
