//! Live projectile table and the spawn synchronizer.
//!
//! Clients announce every projectile they fire. When the attacker is in PvP and
//! the catalog overrides the requested type, the synchronizer rewrites the
//! authoritative record and broadcasts a full replacement so that every client
//! converges on the server's version instead of its own prediction.

use crate::catalog::{is_projectile_type, Catalog, ProjectileOverride};
use crate::config::Config;
use crate::error::ProtocolError;
use crate::outbox::Outbox;
use log::debug;
use shared::{
    Packet, ProjectileState, Vec2, MAX_PROJECTILES, MAX_PROJECTILE_TYPES,
    PROJECTILE_LIFETIME_TICKS,
};

/// Authoritative record for one slot of the live table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Projectile {
    pub identity: u16,
    pub kind: i32,
    pub owner: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub damage: i32,
    pub knockback: f32,
    pub ai0: f32,
    pub source_item: i32,
    pub active: bool,
    pub time_left: u32,
}

impl Projectile {
    pub fn from_state(state: &ProjectileState, source_item: i32) -> Self {
        Self {
            identity: state.identity,
            kind: state.kind,
            owner: state.owner,
            position: state.position,
            velocity: state.velocity,
            damage: state.damage,
            knockback: state.knockback,
            ai0: state.ai0,
            source_item,
            active: true,
            time_left: PROJECTILE_LIFETIME_TICKS,
        }
    }

    pub fn state(&self) -> ProjectileState {
        ProjectileState {
            identity: self.identity,
            kind: self.kind,
            owner: self.owner,
            position: self.position,
            velocity: self.velocity,
            knockback: self.knockback,
            damage: self.damage,
            ai0: self.ai0,
        }
    }

    /// Full-state packet describing this projectile.
    pub fn packet(&self) -> Packet {
        Packet::ProjectileNew {
            state: self.state(),
            source_item: self.source_item,
        }
    }
}

/// Fixed-size table of projectile slots. Slots are reused, never freed.
#[derive(Debug, Clone)]
pub struct ProjectileTable {
    slots: Vec<Projectile>,
}

impl Default for ProjectileTable {
    fn default() -> Self {
        Self {
            slots: vec![Projectile::default(); MAX_PROJECTILES],
        }
    }
}

impl ProjectileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a projectile identity received from a client.
    pub fn check_identity(identity: u16) -> Result<usize, ProtocolError> {
        if (identity as usize) < MAX_PROJECTILES {
            Ok(identity as usize)
        } else {
            Err(ProtocolError::ProjectileIdentityOutOfRange(identity))
        }
    }

    pub fn get(&self, identity: usize) -> &Projectile {
        &self.slots[identity]
    }

    pub fn get_mut(&mut self, identity: usize) -> &mut Projectile {
        &mut self.slots[identity]
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Projectile> {
        self.slots.iter().filter(|p| p.active)
    }

    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = &mut Projectile> {
        self.slots.iter_mut().filter(|p| p.active)
    }

    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }

    /// Deactivates a slot if `owner` owns it. Returns true if a projectile was killed.
    pub fn kill(&mut self, identity: usize, owner: u32) -> bool {
        let projectile = &mut self.slots[identity];
        if projectile.active && projectile.owner == owner {
            projectile.active = false;
            true
        } else {
            false
        }
    }

    /// Advances every active projectile by one tick of its velocity.
    pub fn integrate(&mut self) {
        for projectile in self.iter_active_mut() {
            projectile.position = projectile.position.add(&projectile.velocity);
            projectile.time_left = projectile.time_left.saturating_sub(1);
            if projectile.time_left == 0 {
                projectile.active = false;
            }
        }
    }

    /// Resets every inactive slot to the zero record so stale overrides cannot
    /// leak into the next projectile that reuses the slot.
    pub fn sweep_inactive(&mut self) {
        for projectile in self.slots.iter_mut().filter(|p| !p.active) {
            *projectile = Projectile::default();
        }
    }
}

/// Weapon that produced the last projectile of a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectileSource {
    pub identity: u16,
    pub owner: u32,
    pub source_item: i32,
}

/// Per-attacker table mapping projectile type to its source weapon.
#[derive(Debug, Clone)]
pub struct ProjectileProvenance {
    sources: Vec<Option<ProjectileSource>>,
}

impl Default for ProjectileProvenance {
    fn default() -> Self {
        Self {
            sources: vec![None; MAX_PROJECTILE_TYPES],
        }
    }
}

impl ProjectileProvenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: i32, source: ProjectileSource) {
        self.sources[kind as usize] = Some(source);
    }

    pub fn source_of(&self, kind: i32) -> Option<&ProjectileSource> {
        if is_projectile_type(kind) {
            self.sources[kind as usize].as_ref()
        } else {
            None
        }
    }
}

/// Hook into the combat-effects collaborator.
pub trait CombatEffects {
    fn on_projectile_spawn(&mut self, attacker: u32, kind: i32, source: &ProjectileSource);
}

/// Default effects collaborator: records the spawn in the log only.
#[derive(Debug, Default)]
pub struct LoggedEffects;

impl CombatEffects for LoggedEffects {
    fn on_projectile_spawn(&mut self, attacker: u32, kind: i32, source: &ProjectileSource) {
        debug!(
            "Client {} spawned projectile type {} in slot {} with item {}",
            attacker, kind, source.identity, source.source_item
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub state: ProjectileState,
    pub source_item: i32,
    pub attacker_hostile: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// The slot already carries this projectile; the request is an in-flight update.
    Duplicate,
    /// No override applies; the host handles the spawn as usual.
    PassThrough,
    /// The authoritative record was rewritten and a replacement broadcast queued.
    Handled,
}

pub struct ProjectileSynchronizer<'a> {
    catalog: &'a Catalog,
    config: &'a Config,
}

impl<'a> ProjectileSynchronizer<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a Config) -> Self {
        Self { catalog, config }
    }

    pub fn intercept(
        &self,
        table: &mut ProjectileTable,
        provenance: &mut ProjectileProvenance,
        effects: &mut dyn CombatEffects,
        out: &mut Outbox,
        request: &SpawnRequest,
    ) -> Result<SpawnOutcome, ProtocolError> {
        let state = &request.state;
        let identity = ProjectileTable::check_identity(state.identity)?;
        if !is_projectile_type(state.kind) {
            return Err(ProtocolError::ProjectileTypeOutOfRange(state.kind));
        }

        if !self.config.enable_plugin {
            return Ok(SpawnOutcome::PassThrough);
        }

        let slot = table.get(identity);
        if slot.active && slot.kind == state.kind {
            return Ok(SpawnOutcome::Duplicate);
        }

        let (outcome, resulting_kind) = match self.override_for(request) {
            Some(record) => {
                let mut projectile = Projectile::from_state(state, request.source_item);
                projectile.kind = record.substitute.unwrap_or(state.kind);
                projectile.velocity = state.velocity.scale(record.velocity_multiplier);
                projectile.damage = record.damage.unwrap_or(state.damage);

                *table.get_mut(identity) = projectile;
                out.broadcast(projectile.packet(), None);

                debug!(
                    "Overrode projectile {} from client {}: type {} -> {}",
                    state.identity, state.owner, state.kind, projectile.kind
                );
                (SpawnOutcome::Handled, projectile.kind)
            }
            None => (SpawnOutcome::PassThrough, state.kind),
        };

        let source = ProjectileSource {
            identity: state.identity,
            owner: state.owner,
            source_item: request.source_item,
        };
        provenance.insert(resulting_kind, source);
        effects.on_projectile_spawn(state.owner, resulting_kind, &source);

        Ok(outcome)
    }

    fn override_for(&self, request: &SpawnRequest) -> Option<&'a ProjectileOverride> {
        if !request.attacker_hostile || !self.catalog.is_modified_projectile(request.state.kind) {
            return None;
        }
        self.catalog.projectile(request.state.kind)
    }
}
