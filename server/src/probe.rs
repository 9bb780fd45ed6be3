//! Cooperative waits on client acknowledgements.
//!
//! A [`Probe`] is polled once per tick on the simulation thread. Each poll first
//! checks the connection's [`CancellationToken`], then the predicate, then the
//! optional timeout, so a disconnect ends every outstanding wait on the next tick.

use crate::connection::ConnectionContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancelled once when the owning connection is torn down.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Pending,
    Satisfied,
    Disconnected,
    TimedOut,
}

/// What a client must report before a wait completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// The client answered a `RemoveItemOwner` request with `ItemOwner`.
    PingReceived,
    /// The client reports `slot` holding `item_id`.
    ItemChanged { slot: usize, item_id: i32 },
    /// The client is no longer holding the use button.
    UseItemReleased,
}

impl WaitCondition {
    pub fn is_met(&self, conn: &ConnectionContext) -> bool {
        match *self {
            WaitCondition::PingReceived => conn.ping_acknowledged,
            WaitCondition::ItemChanged { slot, item_id } => conn.inventory.get(slot).id == item_id,
            WaitCondition::UseItemReleased => conn.release_use_item,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    condition: WaitCondition,
    timeout_ticks: Option<u32>,
    waited_ticks: u32,
}

impl Probe {
    pub fn new(condition: WaitCondition) -> Self {
        Self {
            condition,
            timeout_ticks: None,
            waited_ticks: 0,
        }
    }

    pub fn with_timeout(condition: WaitCondition, timeout_ticks: u32) -> Self {
        Self {
            timeout_ticks: Some(timeout_ticks),
            ..Self::new(condition)
        }
    }

    pub fn condition(&self) -> WaitCondition {
        self.condition
    }

    pub fn waited_ticks(&self) -> u32 {
        self.waited_ticks
    }

    pub fn poll(&mut self, conn: &ConnectionContext) -> ProbeStatus {
        let condition = self.condition;
        self.poll_with(&conn.token, || condition.is_met(conn))
    }

    /// Single polling step shared by every wait.
    pub fn poll_with(
        &mut self,
        token: &CancellationToken,
        predicate: impl FnOnce() -> bool,
    ) -> ProbeStatus {
        if token.is_cancelled() {
            return ProbeStatus::Disconnected;
        }
        if predicate() {
            return ProbeStatus::Satisfied;
        }
        self.waited_ticks += 1;
        match self.timeout_ticks {
            Some(limit) if self.waited_ticks >= limit => ProbeStatus::TimedOut,
            _ => ProbeStatus::Pending,
        }
    }
}
