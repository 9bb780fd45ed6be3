//! Authoritative game state: players, live projectiles and masking sessions.
//!
//! All mutation happens here, on the simulation loop. The network layer feeds
//! decoded client packets in, calls [`GameState::update`] once per tick and
//! flushes whatever the tick queued in the outbox.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::connection::ConnectionContext;
use crate::error::ProtocolError;
use crate::homing::{update_homing, HomingTarget};
use crate::inventory::Inventory;
use crate::masking::{DropCursor, MaskingEnv, MaskingSession, RefreshOutcome, PING_DROP_INDEX};
use crate::outbox::{Outbox, Outgoing};
use crate::probe::{Probe, ProbeStatus, WaitCondition};
use crate::projectile::{
    CombatEffects, LoggedEffects, Projectile, ProjectileSynchronizer, ProjectileTable,
    SpawnOutcome, SpawnRequest,
};
use crate::scheduler::RetryScheduler;
use log::{debug, info};
use shared::{ItemStack, Packet, ProjectileState, Vec2};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct PlayerState {
    pub conn: ConnectionContext,
    pub masking: MaskingSession,
    /// Refresh deferred until the player lets go of the use button.
    pending_refresh: Option<Probe>,
}

impl PlayerState {
    fn new(client_id: u32) -> Self {
        Self {
            conn: ConnectionContext::new(client_id),
            masking: MaskingSession::new(),
            pending_refresh: None,
        }
    }

    pub fn has_deferred_refresh(&self) -> bool {
        self.pending_refresh.is_some()
    }
}

pub struct GameState<S: RetryScheduler> {
    pub tick: u64,
    pub projectiles: ProjectileTable,
    players: BTreeMap<u32, PlayerState>,
    catalog: Arc<Catalog>,
    config: Config,
    scheduler: S,
    effects: Box<dyn CombatEffects + Send + Sync>,
    drops: DropCursor,
    outbox: Outbox,
}

impl<S: RetryScheduler> GameState<S> {
    pub fn new(catalog: Arc<Catalog>, config: Config, scheduler: S) -> Self {
        Self {
            tick: 0,
            projectiles: ProjectileTable::new(),
            players: BTreeMap::new(),
            catalog,
            config,
            scheduler,
            effects: Box::new(LoggedEffects),
            drops: DropCursor::new(),
            outbox: Outbox::new(),
        }
    }

    /// Replaces the combat-effects collaborator.
    pub fn with_effects(mut self, effects: Box<dyn CombatEffects + Send + Sync>) -> Self {
        self.effects = effects;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn player(&self, client_id: u32) -> Option<&PlayerState> {
        self.players.get(&client_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn add_player(&mut self, client_id: u32) {
        self.players.insert(client_id, PlayerState::new(client_id));
        info!("Added player {}", client_id);
    }

    /// Tears down a player's connection state. Every outstanding wait and
    /// timer for the player ends here.
    pub fn remove_player(&mut self, client_id: u32) -> bool {
        let Some(mut player) = self.players.remove(&client_id) else {
            return false;
        };
        player.conn.token.cancel();
        player.masking.abort(client_id, &mut self.scheduler);
        info!("Removed player {}", client_id);
        true
    }

    pub fn update_player(
        &mut self,
        client_id: u32,
        position: Vec2,
        velocity: Vec2,
        release_use_item: bool,
    ) -> Result<(), ProtocolError> {
        let player = self.player_mut(client_id)?;
        player.conn.position = position;
        player.conn.velocity = velocity;
        player.conn.release_use_item = release_use_item;
        Ok(())
    }

    /// Updates the PvP flag. Turning PvP on refreshes the player's inventory.
    pub fn set_hostile(&mut self, client_id: u32, hostile: bool) -> Result<(), ProtocolError> {
        let player = self.player_mut(client_id)?;
        let was_hostile = player.conn.hostile;
        player.conn.hostile = hostile;
        debug!("Client {} set PvP {}", client_id, hostile);

        if hostile && !was_hostile {
            self.request_refresh(client_id)?;
        }
        Ok(())
    }

    /// Starts an inventory refresh, or defers it while the use button is held.
    /// Returns `None` when nothing ran this call.
    pub fn request_refresh(
        &mut self,
        client_id: u32,
    ) -> Result<Option<RefreshOutcome>, ProtocolError> {
        if !self.config.enable_plugin {
            return Ok(None);
        }

        let timeout = self.config.release_wait_timeout_ticks();
        let tick = self.tick;
        let player = self
            .players
            .get_mut(&client_id)
            .ok_or(ProtocolError::UnknownClient(client_id))?;

        if player.masking.is_busy() {
            return Ok(Some(RefreshOutcome::Busy));
        }
        if !player.conn.release_use_item {
            debug!("Deferring refresh for client {} until use is released", client_id);
            player.pending_refresh = Some(Probe::with_timeout(WaitCondition::UseItemReleased, timeout));
            return Ok(None);
        }

        let mut env = MaskingEnv {
            catalog: &self.catalog,
            config: &self.config,
            scheduler: &mut self.scheduler,
            drops: &mut self.drops,
            out: &mut self.outbox,
        };
        Ok(run_refresh(player, tick, &mut env))
    }

    pub fn set_inventory_slot(
        &mut self,
        client_id: u32,
        slot: u8,
        item: ItemStack,
    ) -> Result<(), ProtocolError> {
        let slot = Inventory::check_slot(slot)?;
        let player = self.player_mut(client_id)?;
        player.conn.inventory.set(slot, item);
        Ok(())
    }

    /// Receive path of the convergence ping.
    pub fn acknowledge_ping(&mut self, client_id: u32, drop_index: u16) -> Result<(), ProtocolError> {
        let player = self.player_mut(client_id)?;
        if drop_index == PING_DROP_INDEX {
            player.conn.ping_acknowledged = true;
        }
        Ok(())
    }

    /// Handles a client's spawn announcement. The owner is always the sender.
    pub fn spawn_projectile(
        &mut self,
        client_id: u32,
        mut state: ProjectileState,
        source_item: i32,
    ) -> Result<SpawnOutcome, ProtocolError> {
        state.owner = client_id;
        let player = self
            .players
            .get_mut(&client_id)
            .ok_or(ProtocolError::UnknownClient(client_id))?;

        let request = SpawnRequest {
            state,
            source_item,
            attacker_hostile: player.conn.hostile,
        };
        let synchronizer = ProjectileSynchronizer::new(&self.catalog, &self.config);
        let outcome = synchronizer.intercept(
            &mut self.projectiles,
            &mut player.conn.provenance,
            self.effects.as_mut(),
            &mut self.outbox,
            &request,
        )?;

        if outcome == SpawnOutcome::PassThrough {
            let projectile = Projectile::from_state(&state, source_item);
            *self.projectiles.get_mut(state.identity as usize) = projectile;
            self.outbox.broadcast(projectile.packet(), Some(client_id));
        }
        Ok(outcome)
    }

    pub fn kill_projectile(&mut self, client_id: u32, identity: u16) -> Result<bool, ProtocolError> {
        let slot = ProjectileTable::check_identity(identity)?;
        let killed = self.projectiles.kill(slot, client_id);
        if killed {
            self.outbox
                .broadcast(Packet::KillProjectile { identity }, Some(client_id));
        }
        Ok(killed)
    }

    /// Retry timer callback for `client_id`'s masking session.
    pub fn retry_inventory(&mut self, client_id: u32) {
        let Some(player) = self.players.get_mut(&client_id) else {
            debug!("Stale retry timer for client {}", client_id);
            return;
        };
        let mut env = MaskingEnv {
            catalog: &self.catalog,
            config: &self.config,
            scheduler: &mut self.scheduler,
            drops: &mut self.drops,
            out: &mut self.outbox,
        };
        player.masking.on_retry_timer(&mut player.conn, &mut env);
    }

    /// Advances the simulation by one tick.
    pub fn update(&mut self) {
        self.tick += 1;
        self.projectiles.integrate();

        if self.config.enable_homing {
            let targets = self.homing_targets();
            update_homing(&mut self.projectiles, &self.catalog, &targets, &mut self.outbox);
        }

        let tick = self.tick;
        for player in self.players.values_mut() {
            let mut env = MaskingEnv {
                catalog: &self.catalog,
                config: &self.config,
                scheduler: &mut self.scheduler,
                drops: &mut self.drops,
                out: &mut self.outbox,
            };

            if let Some(probe) = player.pending_refresh.as_mut() {
                match probe.poll(&player.conn) {
                    ProbeStatus::Pending => {}
                    ProbeStatus::Disconnected => player.pending_refresh = None,
                    ProbeStatus::Satisfied | ProbeStatus::TimedOut => {
                        player.pending_refresh = None;
                        run_refresh(player, tick, &mut env);
                    }
                }
            }

            player.masking.poll(&mut player.conn, &mut env);
        }

        self.projectiles.sweep_inactive();
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        self.outbox.drain()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Live PvP players in ascending id order.
    fn homing_targets(&self) -> Vec<HomingTarget> {
        self.players
            .values()
            .filter(|player| player.conn.hostile && player.conn.is_alive())
            .map(|player| HomingTarget {
                id: player.conn.id,
                center: player.conn.center(),
            })
            .collect()
    }

    fn player_mut(&mut self, client_id: u32) -> Result<&mut PlayerState, ProtocolError> {
        self.players
            .get_mut(&client_id)
            .ok_or(ProtocolError::UnknownClient(client_id))
    }
}

fn run_refresh<S: RetryScheduler + ?Sized>(
    player: &mut PlayerState,
    tick: u64,
    env: &mut MaskingEnv<'_, S>,
) -> Option<RefreshOutcome> {
    if !player
        .conn
        .can_mod_inventory(tick, env.config.spawn_item_delay_ticks())
    {
        debug!("Refresh for client {} skipped: cooldown", player.conn.id);
        return None;
    }
    Some(player.masking.refresh(&mut player.conn, env))
}
