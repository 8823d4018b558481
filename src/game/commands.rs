//! Discrete world mutations queued by players and applied at tick start

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::combat::{Muzzle, Weapon, WeaponKind};
use super::entities::{normalize_heading, Movable, Ship};
use super::game_loop::GameContext;
use super::vector::Vector2;

/// Arena extents used to place the spawn ring
pub const ARENA_WIDTH: f32 = 100.0;
pub const ARENA_HEIGHT: f32 = 100.0;

/// A command targeting one ship (or player) by id.
///
/// Applying a command whose target does not exist is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Spawn the player's ship unless it already exists
    EnsurePlayer { player_id: Uuid },
    /// Thrust along the current heading (-1 = brake, 1 = full forward)
    Move { ship_id: Uuid, thrust: f32 },
    /// Rotate by a number of degrees
    Turn { ship_id: Uuid, degrees: f32 },
    /// Fire the weapon with this code, or the first equipped one
    Shoot {
        ship_id: Uuid,
        weapon: Option<String>,
    },
}

impl Command {
    pub fn apply(&self, ctx: &mut GameContext, now: DateTime<Utc>) {
        match self {
            Command::EnsurePlayer { player_id } => ensure_player(ctx, *player_id),
            Command::Move { ship_id, thrust } => {
                if let Some(ship) = ctx.ships.get_mut(ship_id) {
                    ship.apply_thrust(*thrust);
                }
            }
            Command::Turn { ship_id, degrees } => {
                if let Some(ship) = ctx.ships.get_mut(ship_id) {
                    ship.rotate(*degrees);
                }
            }
            Command::Shoot { ship_id, weapon } => shoot(ctx, *ship_id, weapon.as_deref(), now),
        }
    }
}

fn ensure_player(ctx: &mut GameContext, player_id: Uuid) {
    if ctx.ships.contains_key(&player_id) {
        return;
    }

    let (position, heading) = spawn_point(player_id);
    let mut ship = Ship::new(player_id, position).with_heading(heading);
    ship.equip(Weapon::rocket());

    info!(
        player_id = %player_id,
        x = position.x,
        y = position.y,
        "Spawned ship"
    );
    ctx.ships.insert(ship.id, ship);
}

fn shoot(ctx: &mut GameContext, ship_id: Uuid, code: Option<&str>, now: DateTime<Utc>) {
    let Some(ship) = ctx.ships.get_mut(&ship_id) else {
        return;
    };

    let muzzle = Muzzle::of(ship);
    let requested = code.and_then(WeaponKind::from_code);
    let slot = requested
        .and_then(|kind| ship.weapons.iter().position(|w| w.kind() == kind))
        .unwrap_or(0);

    let Some(weapon) = ship.weapons.get_mut(slot) else {
        return;
    };

    // A weapon that is not ready simply produces nothing this tick
    match weapon.fire(now, &muzzle) {
        Ok(projectile) => {
            ctx.projectiles.insert(projectile.id, projectile);
        }
        Err(e) => {
            debug!(ship_id = %ship_id, error = %e, "Shot rejected");
        }
    }
}

/// Deterministic spawn position and heading for a player.
///
/// Players are spread around a ring centred in the arena, with the nose
/// pointed at the centre. The same id always yields the same spawn.
pub fn spawn_point(player_id: Uuid) -> (Vector2, f32) {
    let mut h: i32 = 17;
    for b in player_id.as_bytes() {
        h = h.wrapping_mul(31).wrapping_add(i32::from(*b));
    }
    let t = (h & 0x7FFF_FFFF) as f32 / i32::MAX as f32;

    let center = Vector2::new(ARENA_WIDTH * 0.5, ARENA_HEIGHT * 0.5);
    let ring = ARENA_WIDTH.min(ARENA_HEIGHT) * 0.35;
    let angle = t * std::f32::consts::TAU;

    let position = center + Vector2::new(angle.cos(), angle.sin()) * ring;
    let to_center = center - position;
    let heading = normalize_heading(to_center.y.atan2(to_center.x).to_degrees());

    (position, heading)
}
