//! Inventory masking state machine.
//!
//! Clients only learn server-side item stats from item instances spawned into
//! the world. To apply overrides to items a player already carries, the server
//! takes every modified item out of the inventory, drops it back at the
//! player's feet with the overrides stamped on the instance, and waits for the
//! client to pick each one up again.
//!
//! ```text
//! Idle ──refresh──> LockedPending ──first drop──> Retrying ──all picked up──> AwaitingAck
//!                                                   │  ^                          │
//!                                        retry timer└──┘ (ceiling: force clear)──>│
//!                                                                                 v
//!                                                                             Converged
//! ```
//!
//! Every transition runs on the simulation loop. The retry timer only posts a
//! message back to that loop (see [`crate::scheduler`]).

use crate::catalog::Catalog;
use crate::config::Config;
use crate::connection::ConnectionContext;
use crate::inventory::diff_inventory;
use crate::outbox::Outbox;
use crate::probe::{Probe, ProbeStatus, WaitCondition};
use crate::scheduler::RetryScheduler;
use log::{debug, info, warn};
use shared::{ItemDeltas, ItemStack, Packet, FILLER_ITEM, INVENTORY_SIZE, MAX_WORLD_ITEMS};

/// World item index used for the convergence ping. Real drops never use it.
pub const PING_DROP_INDEX: u16 = MAX_WORLD_ITEMS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskingState {
    #[default]
    Idle,
    LockedPending,
    Retrying,
    AwaitingAck,
    Converged,
}

/// An item taken out of the inventory that must be dropped back to its owner.
#[derive(Debug, Clone)]
pub struct PendingDrop {
    /// Slot the item was taken from.
    pub slot: usize,
    pub item: ItemStack,
    pub deltas: ItemDeltas,
    probe: Probe,
}

impl PendingDrop {
    pub fn new(slot: usize, item: ItemStack, deltas: ItemDeltas) -> Self {
        Self {
            slot,
            item,
            deltas,
            probe: Probe::new(WaitCondition::ItemChanged {
                slot,
                item_id: item.id,
            }),
        }
    }

    /// Lookup key matching any pending drop of `item_id`.
    pub fn keyed(item_id: i32) -> Self {
        Self::new(0, ItemStack::new(item_id, 0, 0), ItemDeltas::default())
    }
}

/// Pending drops are interchangeable when they carry the same item id.
impl PartialEq for PendingDrop {
    fn eq(&self, other: &Self) -> bool {
        self.item.id == other.item.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A session is already in flight for this player.
    Busy,
    /// Nothing to mask; only the convergence ping was issued.
    Clean,
    /// This many slots were masked and dropped.
    Masked(usize),
}

/// Hands out world item indices for drops, wrapping before the ping index.
#[derive(Debug, Default)]
pub struct DropCursor {
    next: u16,
}

impl DropCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_index(&mut self) -> u16 {
        let index = self.next;
        self.next = (self.next + 1) % MAX_WORLD_ITEMS;
        index
    }
}

/// Shared collaborators a session needs for one transition.
pub struct MaskingEnv<'a, S: RetryScheduler + ?Sized> {
    pub catalog: &'a Catalog,
    pub config: &'a Config,
    pub scheduler: &'a mut S,
    pub drops: &'a mut DropCursor,
    pub out: &'a mut Outbox,
}

#[derive(Debug, Default)]
pub struct MaskingSession {
    state: MaskingState,
    pending: Vec<PendingDrop>,
    attempts: u32,
    ping: Option<Probe>,
    checked: bool,
    /// Empty slots filled with the filler item during masking.
    padded: Vec<usize>,
}

impl MaskingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MaskingState {
        self.state
    }

    pub fn pending(&self) -> &[PendingDrop] {
        &self.pending
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once a session has fully converged at least once.
    pub fn checked(&self) -> bool {
        self.checked
    }

    /// True while the session owns the player's inventory.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            MaskingState::LockedPending | MaskingState::Retrying | MaskingState::AwaitingAck
        )
    }

    /// True while drops are outstanding.
    pub fn lock_modifications(&self) -> bool {
        matches!(
            self.state,
            MaskingState::LockedPending | MaskingState::Retrying
        )
    }

    /// Rewrites `conn`'s inventory so that every modified item is redelivered
    /// through a world drop carrying its overrides.
    pub fn refresh<S: RetryScheduler + ?Sized>(
        &mut self,
        conn: &mut ConnectionContext,
        env: &mut MaskingEnv<'_, S>,
    ) -> RefreshOutcome {
        if self.is_busy() {
            debug!("Refresh for client {} rejected: session busy", conn.id);
            return RefreshOutcome::Busy;
        }
        self.reset();

        for (slot, item) in conn.inventory.iter() {
            env.out.send(conn.id, set_slot_packet(slot, *item));
        }

        let modified: Vec<_> = diff_inventory(&conn.inventory, env.catalog)
            .into_iter()
            .filter(|diff| diff.modified)
            .collect();

        let Some(highest) = modified.last().map(|diff| diff.slot) else {
            self.begin_ping(conn, env.out);
            return RefreshOutcome::Clean;
        };

        self.state = MaskingState::LockedPending;
        for slot in 0..=highest {
            let item = conn.inventory.get(slot);
            let replacement = if let Some(diff) = modified.iter().find(|d| d.slot == slot) {
                self.pending.push(PendingDrop::new(slot, item, diff.deltas));
                ItemStack::EMPTY
            } else if item.is_empty() {
                self.padded.push(slot);
                ItemStack::filler()
            } else {
                continue;
            };
            conn.inventory.set(slot, replacement);
            env.out.send(conn.id, set_slot_packet(slot, replacement));
        }

        info!(
            "Masking {} modified slot(s) for client {}",
            self.pending.len(),
            conn.id
        );

        let masked = self.pending.len();
        self.state = MaskingState::Retrying;
        env.scheduler
            .arm(conn.id, env.config.retry_interval(), conn.token.clone());
        self.drop_or_abandon(conn, env);

        RefreshOutcome::Masked(masked)
    }

    /// Timer entry point: redrops everything still pending. The drop that
    /// reaches the attempt ceiling also abandons the pending items.
    pub fn on_retry_timer<S: RetryScheduler + ?Sized>(
        &mut self,
        conn: &mut ConnectionContext,
        env: &mut MaskingEnv<'_, S>,
    ) {
        if self.state != MaskingState::Retrying {
            return;
        }
        if !conn.is_alive() {
            self.abort(conn.id, env.scheduler);
            return;
        }

        self.drop_or_abandon(conn, env);
    }

    /// Per-tick step: checks pickups and the convergence ping.
    pub fn poll<S: RetryScheduler + ?Sized>(
        &mut self,
        conn: &mut ConnectionContext,
        env: &mut MaskingEnv<'_, S>,
    ) {
        if self.state == MaskingState::Idle || self.state == MaskingState::Converged {
            return;
        }
        if !conn.is_alive() {
            self.abort(conn.id, env.scheduler);
            return;
        }

        match self.state {
            MaskingState::Retrying => {
                let mut picked_up = Vec::new();
                for pending in &mut self.pending {
                    if pending.probe.poll(conn) == ProbeStatus::Satisfied {
                        picked_up.push(pending.item.id);
                    }
                }
                for item_id in picked_up {
                    self.acknowledge(item_id);
                }

                if self.pending.is_empty() {
                    debug!("Client {} picked up every masked item", conn.id);
                    env.scheduler.disarm(conn.id);
                    self.begin_ping(conn, env.out);
                }
            }
            MaskingState::AwaitingAck => {
                let status = match self.ping.as_mut() {
                    Some(probe) => probe.poll(conn),
                    None => ProbeStatus::Satisfied,
                };
                match status {
                    ProbeStatus::Satisfied => self.converge(conn, env.out),
                    ProbeStatus::Disconnected => self.abort(conn.id, env.scheduler),
                    ProbeStatus::Pending | ProbeStatus::TimedOut => {}
                }
            }
            _ => {}
        }
    }

    /// Removes the first pending drop carrying `item_id`.
    pub fn acknowledge(&mut self, item_id: i32) -> bool {
        let key = PendingDrop::keyed(item_id);
        match self.pending.iter().position(|drop| *drop == key) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Tears the session down without sending anything.
    pub fn abort<S: RetryScheduler + ?Sized>(&mut self, client_id: u32, scheduler: &mut S) {
        if self.state != MaskingState::Idle {
            debug!("Masking session for client {} aborted", client_id);
        }
        scheduler.disarm(client_id);
        self.reset();
        self.state = MaskingState::Idle;
    }

    fn drop_or_abandon<S: RetryScheduler + ?Sized>(
        &mut self,
        conn: &mut ConnectionContext,
        env: &mut MaskingEnv<'_, S>,
    ) {
        self.drop_pending(conn, env);
        if self.attempts < env.config.max_drop_attempts {
            return;
        }

        warn!(
            "Client {} never picked up {} item(s) after {} attempts, abandoning them",
            conn.id,
            self.pending.len(),
            self.attempts
        );
        self.pending.clear();
        env.scheduler.disarm(conn.id);
        self.begin_ping(conn, env.out);
    }

    fn drop_pending<S: RetryScheduler + ?Sized>(
        &mut self,
        conn: &ConnectionContext,
        env: &mut MaskingEnv<'_, S>,
    ) {
        self.attempts += 1;
        for pending in &self.pending {
            env.out.send(
                conn.id,
                Packet::ItemDrop {
                    drop_index: env.drops.next_index(),
                    position: conn.position,
                    width: i16::MAX,
                    height: i16::MAX,
                    item: pending.item,
                    overrides: pending.deltas,
                },
            );
        }
    }

    fn begin_ping(&mut self, conn: &mut ConnectionContext, out: &mut Outbox) {
        conn.ping_acknowledged = false;
        out.send(
            conn.id,
            Packet::RemoveItemOwner {
                drop_index: PING_DROP_INDEX,
            },
        );
        self.ping = Some(Probe::new(WaitCondition::PingReceived));
        self.state = MaskingState::AwaitingAck;
    }

    fn converge(&mut self, conn: &mut ConnectionContext, out: &mut Outbox) {
        for &slot in &self.padded {
            if conn.inventory.get(slot).id == FILLER_ITEM {
                conn.inventory.set(slot, ItemStack::EMPTY);
            }
        }
        for slot in 0..INVENTORY_SIZE {
            out.send(conn.id, set_slot_packet(slot, conn.inventory.get(slot)));
        }

        self.reset();
        self.checked = true;
        self.state = MaskingState::Converged;
        info!("Inventory of client {} converged", conn.id);
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.padded.clear();
        self.attempts = 0;
        self.ping = None;
    }
}

fn set_slot_packet(slot: usize, item: ItemStack) -> Packet {
    Packet::SetInventorySlot {
        slot: slot as u8,
        item,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemBaseline, ItemOverride};
    use crate::scheduler::ManualScheduler;

    const SWORD: i32 = 757;
    const BOW: i32 = 3029;

    struct Harness {
        catalog: Catalog,
        config: Config,
        scheduler: ManualScheduler,
        drops: DropCursor,
        out: Outbox,
        conn: ConnectionContext,
        session: MaskingSession,
    }

    impl Harness {
        fn new() -> Self {
            let mut catalog = Catalog::new();
            catalog.insert_item(
                SWORD,
                ItemOverride {
                    damage: Some(120),
                    ..Default::default()
                },
            );
            catalog.insert_vanilla(
                SWORD,
                ItemBaseline {
                    damage: 190,
                    ..Default::default()
                },
            );
            catalog.insert_item(
                BOW,
                ItemOverride {
                    use_time: Some(30),
                    ..Default::default()
                },
            );

            Self {
                catalog,
                config: Config::default(),
                scheduler: ManualScheduler::new(),
                drops: DropCursor::new(),
                out: Outbox::new(),
                conn: ConnectionContext::new(1),
                session: MaskingSession::new(),
            }
        }

        fn refresh(&mut self) -> RefreshOutcome {
            let mut env = MaskingEnv {
                catalog: &self.catalog,
                config: &self.config,
                scheduler: &mut self.scheduler,
                drops: &mut self.drops,
                out: &mut self.out,
            };
            self.session.refresh(&mut self.conn, &mut env)
        }

        fn retry(&mut self) {
            let mut env = MaskingEnv {
                catalog: &self.catalog,
                config: &self.config,
                scheduler: &mut self.scheduler,
                drops: &mut self.drops,
                out: &mut self.out,
            };
            self.session.on_retry_timer(&mut self.conn, &mut env);
        }

        fn poll(&mut self) {
            let mut env = MaskingEnv {
                catalog: &self.catalog,
                config: &self.config,
                scheduler: &mut self.scheduler,
                drops: &mut self.drops,
                out: &mut self.out,
            };
            self.session.poll(&mut self.conn, &mut env);
        }

        fn item_drops(&self) -> usize {
            self.out
                .packets_for(1)
                .into_iter()
                .filter(|p| matches!(p, Packet::ItemDrop { .. }))
                .count()
        }

        fn fill_vanilla(&mut self) {
            for slot in 0..INVENTORY_SIZE {
                self.conn
                    .inventory
                    .set(slot, ItemStack::new(1000 + slot as i32, 0, 1));
            }
        }
    }

    #[test]
    fn test_masks_exactly_the_modified_slots() {
        let mut h = Harness::new();
        h.fill_vanilla();
        h.conn.inventory.set(5, ItemStack::new(SWORD, 81, 1));
        h.conn.inventory.set(40, ItemStack::new(BOW, 0, 1));
        let before = h.conn.inventory.clone();

        assert_eq!(h.refresh(), RefreshOutcome::Masked(2));
        assert_eq!(h.session.state(), MaskingState::Retrying);
        assert!(h.session.lock_modifications());
        assert!(h.scheduler.is_armed(1));

        for slot in 0..INVENTORY_SIZE {
            if slot == 5 || slot == 40 {
                assert!(h.conn.inventory.get(slot).is_empty());
            } else {
                assert_eq!(h.conn.inventory.get(slot), before.get(slot));
            }
        }

        // Full normalization, two masked slots and the first two drops
        assert_eq!(h.out.len(), INVENTORY_SIZE + 2 + 2);
        let drop = h
            .out
            .packets_for(1)
            .into_iter()
            .find_map(|p| match p {
                Packet::ItemDrop {
                    item,
                    overrides,
                    width,
                    ..
                } if item.id == SWORD => Some((*item, *overrides, *width)),
                _ => None,
            })
            .unwrap();
        assert_eq!(drop.0.prefix, 81);
        assert_eq!(drop.1.damage, Some(120));
        assert_eq!(drop.2, i16::MAX);
    }

    #[test]
    fn test_converges_only_after_every_pickup() {
        let mut h = Harness::new();
        h.fill_vanilla();
        h.conn.inventory.set(5, ItemStack::new(SWORD, 0, 1));
        h.conn.inventory.set(40, ItemStack::new(BOW, 0, 1));
        h.refresh();

        h.poll();
        assert_eq!(h.session.pending().len(), 2);

        h.conn.inventory.set(5, ItemStack::new(SWORD, 0, 1));
        h.poll();
        assert_eq!(h.session.pending().len(), 1);
        assert_eq!(h.session.state(), MaskingState::Retrying);

        h.conn.inventory.set(40, ItemStack::new(BOW, 0, 1));
        h.poll();
        assert_eq!(h.session.state(), MaskingState::AwaitingAck);
        assert!(!h.session.lock_modifications());
        assert!(h.session.is_busy());
        assert!(!h.scheduler.is_armed(1));
        assert!(!h.conn.ping_acknowledged);
        assert!(h.out.packets_for(1).contains(&&Packet::RemoveItemOwner {
            drop_index: PING_DROP_INDEX
        }));

        h.poll();
        assert_eq!(h.session.state(), MaskingState::AwaitingAck);

        h.conn.ping_acknowledged = true;
        h.poll();
        assert_eq!(h.session.state(), MaskingState::Converged);
        assert!(h.session.checked());
        assert!(h.session.pending().is_empty());
        assert!(!h.session.is_busy());
    }

    #[test]
    fn test_retry_ceiling_abandons_items() {
        let mut h = Harness::new();
        h.conn.inventory.set(5, ItemStack::new(SWORD, 0, 1));
        h.conn.inventory.set(40, ItemStack::new(BOW, 0, 1));
        h.refresh();

        for _ in 2..h.config.max_drop_attempts {
            h.retry();
            assert_eq!(h.session.state(), MaskingState::Retrying);
            assert_eq!(h.session.pending().len(), 2);
        }
        assert_eq!(h.session.attempts(), 9);
        assert_eq!(h.item_drops(), 18);

        // The tenth drop clears the session in the same step
        h.retry();
        assert_eq!(h.session.attempts(), 10);
        assert!(h.session.pending().is_empty());
        assert!(!h.scheduler.is_armed(1));
        assert_eq!(h.session.state(), MaskingState::AwaitingAck);
        assert_eq!(h.item_drops(), 20);

        // Stale timer messages after the force clear are ignored
        h.retry();
        assert_eq!(h.item_drops(), 20);
    }

    #[test]
    fn test_single_attempt_ceiling_clears_on_first_drop() {
        let mut h = Harness::new();
        h.config.max_drop_attempts = 1;
        h.conn.inventory.set(5, ItemStack::new(SWORD, 0, 1));

        assert_eq!(h.refresh(), RefreshOutcome::Masked(1));
        assert_eq!(h.item_drops(), 1);
        assert!(h.session.pending().is_empty());
        assert!(!h.scheduler.is_armed(1));
        assert_eq!(h.session.state(), MaskingState::AwaitingAck);
    }

    #[test]
    fn test_second_refresh_is_rejected_while_locked() {
        let mut h = Harness::new();
        h.conn.inventory.set(0, ItemStack::new(SWORD, 0, 1));
        h.refresh();
        let queued = h.out.len();

        assert_eq!(h.refresh(), RefreshOutcome::Busy);
        assert_eq!(h.out.len(), queued);
        assert_eq!(h.scheduler.arm_count(), 1);
    }

    #[test]
    fn test_redrop_keeps_pending_membership() {
        let mut h = Harness::new();
        h.conn.inventory.set(3, ItemStack::new(SWORD, 0, 1));
        h.refresh();

        h.retry();
        h.retry();
        assert_eq!(h.session.pending().len(), 1);
        assert_eq!(h.item_drops(), 3);
    }

    #[test]
    fn test_disconnect_aborts_silently() {
        let mut h = Harness::new();
        h.conn.inventory.set(3, ItemStack::new(SWORD, 0, 1));
        h.refresh();
        let queued = h.out.len();

        h.conn.token.cancel();
        h.poll();
        h.retry();

        assert_eq!(h.session.state(), MaskingState::Idle);
        assert!(h.session.pending().is_empty());
        assert!(!h.scheduler.is_armed(1));
        assert_eq!(h.out.len(), queued);
    }

    #[test]
    fn test_clean_inventory_only_pings() {
        let mut h = Harness::new();
        h.fill_vanilla();

        assert_eq!(h.refresh(), RefreshOutcome::Clean);
        assert_eq!(h.session.state(), MaskingState::AwaitingAck);
        assert_eq!(h.item_drops(), 0);
        assert_eq!(h.scheduler.arm_count(), 0);

        h.conn.ping_acknowledged = true;
        h.poll();
        assert_eq!(h.session.state(), MaskingState::Converged);

        // Converged sessions accept the next refresh
        assert_eq!(h.refresh(), RefreshOutcome::Clean);
    }

    #[test]
    fn test_padding_is_restored_on_convergence() {
        let mut h = Harness::new();
        h.conn.inventory.set(0, ItemStack::new(1, 0, 1));
        h.conn.inventory.set(2, ItemStack::new(2, 0, 1));
        h.conn.inventory.set(6, ItemStack::new(SWORD, 0, 1));
        h.refresh();

        for slot in [1, 3, 4, 5] {
            assert_eq!(h.conn.inventory.get(slot).id, FILLER_ITEM);
        }
        assert!(h.conn.inventory.get(6).is_empty());
        assert!(h.conn.inventory.get(7).is_empty());

        h.conn.inventory.set(6, ItemStack::new(SWORD, 0, 1));
        h.poll();
        h.conn.ping_acknowledged = true;
        h.poll();

        assert_eq!(h.session.state(), MaskingState::Converged);
        for slot in [1, 3, 4, 5] {
            assert!(h.conn.inventory.get(slot).is_empty());
        }
        assert_eq!(h.conn.inventory.get(6).id, SWORD);
    }

    #[test]
    fn test_acknowledge_matches_by_item_id() {
        let mut session = MaskingSession::new();
        session
            .pending
            .push(PendingDrop::new(2, ItemStack::new(SWORD, 1, 1), ItemDeltas::default()));
        session
            .pending
            .push(PendingDrop::new(9, ItemStack::new(SWORD, 2, 1), ItemDeltas::default()));

        assert!(session.acknowledge(SWORD));
        assert_eq!(session.pending().len(), 1);
        assert_eq!(session.pending()[0].slot, 9);
        assert!(!session.acknowledge(BOW));
    }

    #[test]
    fn test_drop_cursor_wraps_before_ping_index() {
        let mut cursor = DropCursor::new();
        let indices: Vec<u16> = (0..=MAX_WORLD_ITEMS).map(|_| cursor.next_index()).collect();
        assert_eq!(indices[0], 0);
        assert_eq!(indices[MAX_WORLD_ITEMS as usize - 1], MAX_WORLD_ITEMS - 1);
        assert_eq!(indices[MAX_WORLD_ITEMS as usize], 0);
        assert!(!indices.contains(&PING_DROP_INDEX));
    }
}
