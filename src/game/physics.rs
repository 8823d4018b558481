//! Ship physics constants and circle collision math

use super::vector::Vector2;

/// Below this squared distance two centres are treated as coincident
pub const MIN_CONTACT_DISTANCE_SQ: f32 = 1e-6;

/// Hull constants shared by every ship
#[derive(Debug, Clone, Copy)]
pub struct ShipStats {
    /// Maximum speed in units per second
    pub max_speed: f32,
    /// Velocity gained per unit of thrust input
    pub thrust_power: f32,
    /// Maximum health
    pub max_health: f32,
    /// Ship hitbox radius
    pub hitbox_radius: f32,
}

impl ShipStats {
    pub const STANDARD: Self = Self {
        max_speed: 30.0,
        thrust_power: 3.0,
        max_health: 100.0,
        hitbox_radius: 18.0,
    };
}

impl Default for ShipStats {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Tuning for the per-tick system pipeline
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Broad-phase cell size (floored to the grid minimum)
    pub cell_size: f32,
    /// Fraction of closing speed returned along the contact normal
    pub restitution: f32,
    /// Velocity multiplier applied to both ships on contact
    pub collision_damping: f32,
    /// Velocity added to a ship hit by a projectile
    pub knockback_impulse: f32,
    /// Projectiles pass through the ship that fired them
    pub owner_immunity: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cell_size: 64.0,
            restitution: 0.2,
            collision_damping: 0.9,
            knockback_impulse: 20.0,
            owner_immunity: false,
        }
    }
}

/// Kinematic state of one participant in a collision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub position: Vector2,
    pub velocity: Vector2,
    pub radius: f32,
}

/// Check overlap between two circles (touching counts)
pub fn check_circle_collision(a: Vector2, radius_a: f32, b: Vector2, radius_b: f32) -> bool {
    let combined = radius_a + radius_b;
    a.distance_squared(b) <= combined * combined
}

/// Contact normal pointing from `from` to `to`, with a fixed fallback for coincident centres
pub fn contact_normal(from: Vector2, to: Vector2) -> Vector2 {
    let delta = to - from;
    let dist_sq = delta.length_squared();
    if dist_sq <= MIN_CONTACT_DISTANCE_SQ {
        return Vector2::new(1.0, 0.0);
    }
    delta * (1.0 / dist_sq.sqrt())
}

/// Resolve an overlapping ship pair.
///
/// Splits the penetration 50/50 along the contact normal, damps both
/// velocities, then exchanges a small elastic impulse proportional to the
/// closing speed. Returns `None` when the pair does not penetrate.
pub fn resolve_ship_collision(
    a: Body,
    b: Body,
    restitution: f32,
    damping: f32,
) -> Option<(Body, Body)> {
    let combined = a.radius + b.radius;
    let dist_sq = a.position.distance_squared(b.position);
    if dist_sq > combined * combined {
        return None;
    }

    let penetration = combined - dist_sq.sqrt();
    if penetration <= 0.0 {
        return None;
    }

    let normal = contact_normal(a.position, b.position);
    let correction = normal * (penetration * 0.5);

    let mut a = a;
    let mut b = b;
    a.position -= correction;
    b.position += correction;

    a.velocity *= damping;
    b.velocity *= damping;

    let impulse = (b.velocity.dot(normal) - a.velocity.dot(normal)) * restitution;
    a.velocity += normal * impulse;
    b.velocity -= normal * impulse;

    Some((a, b))
}
