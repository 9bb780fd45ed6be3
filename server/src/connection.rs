//! Typed per-connection state owned by the connection lifecycle.

use crate::inventory::Inventory;
use crate::probe::CancellationToken;
use crate::projectile::ProjectileProvenance;
use shared::{Vec2, PLAYER_HEIGHT, PLAYER_WIDTH};

#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub id: u32,
    /// Cancelled when the connection is torn down; ends every wait and timer.
    pub token: CancellationToken,
    /// PvP flag.
    pub hostile: bool,
    /// Top-left corner of the player's hitbox.
    pub position: Vec2,
    pub velocity: Vec2,
    pub release_use_item: bool,
    /// Cleared when a ping is sent, set by the `ItemOwner` receive path.
    pub ping_acknowledged: bool,
    pub inventory: Inventory,
    pub provenance: ProjectileProvenance,
    last_inventory_modified: Option<u64>,
}

impl ConnectionContext {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
            hostile: false,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            release_use_item: true,
            ping_acknowledged: true,
            inventory: Inventory::new(),
            provenance: ProjectileProvenance::new(),
            last_inventory_modified: None,
        }
    }

    pub fn center(&self) -> Vec2 {
        self.position
            .add(&Vec2::new(PLAYER_WIDTH / 2.0, PLAYER_HEIGHT / 2.0))
    }

    pub fn is_alive(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Rate limits inventory rewrites. Returns true and stamps `tick` when at
    /// least `delay_ticks` have passed since the last accepted call.
    pub fn can_mod_inventory(&mut self, tick: u64, delay_ticks: u64) -> bool {
        match self.last_inventory_modified {
            Some(last) if tick.saturating_sub(last) < delay_ticks => false,
            _ => {
                self.last_inventory_modified = Some(tick);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_offsets_hitbox() {
        let mut conn = ConnectionContext::new(3);
        conn.position = Vec2::new(100.0, 200.0);
        assert_eq!(conn.center(), Vec2::new(110.0, 221.0));
    }

    #[test]
    fn test_inventory_cooldown() {
        let mut conn = ConnectionContext::new(3);
        assert!(conn.can_mod_inventory(100, 15));
        assert!(!conn.can_mod_inventory(110, 15));
        assert!(conn.can_mod_inventory(115, 15));
    }

    #[test]
    fn test_alive_until_cancelled() {
        let conn = ConnectionContext::new(3);
        assert!(conn.is_alive());
        conn.token.cancel();
        assert!(!conn.is_alive());
    }
}
