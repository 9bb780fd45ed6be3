//! Per-tick homing of projectiles towards the nearest PvP target.

use crate::catalog::Catalog;
use crate::outbox::Outbox;
use crate::projectile::{Projectile, ProjectileTable};
use shared::{Vec2, PIXEL_TO_WORLD};

/// A connected, PvP-flagged player that projectiles may home onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomingTarget {
    pub id: u32,
    pub center: Vec2,
}

/// Nearest target within `max_distance` of `origin`, skipping `owner`.
/// Ties keep the earlier target in `targets`.
pub fn find_closest_target(
    targets: &[HomingTarget],
    origin: Vec2,
    owner: u32,
    max_distance: f32,
) -> Option<&HomingTarget> {
    let mut closest: Option<(&HomingTarget, f32)> = None;
    for target in targets.iter().filter(|t| t.id != owner) {
        let distance = origin.distance(&target.center);
        if distance > max_distance {
            continue;
        }
        if closest.map_or(true, |(_, best)| distance < best) {
            closest = Some((target, distance));
        }
    }
    closest.map(|(target, _)| target)
}

/// Rotates `velocity` towards the direction from `position` to `target` by at
/// most `max_turn` radians. Speed is preserved.
pub fn turn_towards(velocity: Vec2, position: Vec2, target: Vec2, max_turn: f32) -> Vec2 {
    let desired = target.sub(&position);
    if velocity.magnitude() == 0.0 || desired.magnitude() == 0.0 {
        return velocity;
    }

    let error = velocity.angle_to(&desired);
    let step = error.abs().min(max_turn.max(0.0));
    velocity.rotate(step.copysign(error))
}

/// Steers one projectile. Returns true if it was retargeted and resynced.
pub fn steer(
    projectile: &mut Projectile,
    catalog: &Catalog,
    targets: &[HomingTarget],
    out: &mut Outbox,
) -> bool {
    let Some(record) = catalog.projectile(projectile.kind) else {
        return false;
    };
    let Some(radius) = record.homing_radius.filter(|r| *r >= 0.0) else {
        return false;
    };

    let Some(target) = find_closest_target(
        targets,
        projectile.position,
        projectile.owner,
        radius * PIXEL_TO_WORLD,
    ) else {
        return false;
    };

    projectile.velocity = turn_towards(
        projectile.velocity,
        projectile.position,
        target.center,
        record.angular_velocity,
    );

    let packet = projectile.packet();
    for recipient in targets {
        out.send(recipient.id, packet.clone());
    }
    true
}

/// Runs homing for every active projectile. `targets` doubles as the set of
/// PvP connections that receive the resync.
pub fn update_homing(
    table: &mut ProjectileTable,
    catalog: &Catalog,
    targets: &[HomingTarget],
    out: &mut Outbox,
) -> usize {
    if targets.is_empty() {
        return 0;
    }
    let mut steered = 0;
    for projectile in table.iter_active_mut() {
        if steer(projectile, catalog, targets, out) {
            steered += 1;
        }
    }
    steered
}
