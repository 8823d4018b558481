//! Simulation entities: ships and projectiles

use uuid::Uuid;

use super::combat::Weapon;
use super::physics::ShipStats;
use super::vector::Vector2;

/// Default hitbox radius for projectiles
pub const PROJECTILE_RADIUS: f32 = 2.0;

/// Lifetime given to projectiles created outside a weapon
pub const DEFAULT_PROJECTILE_LIFETIME: f32 = 5.0;

/// Shared kinematic behaviour of everything that moves through the world
pub trait Movable {
    fn position(&self) -> Vector2;
    fn set_position(&mut self, position: Vector2);
    fn velocity(&self) -> Vector2;
    /// Heading in degrees, always in [0, 360)
    fn heading(&self) -> f32;
    /// Accelerate along the current heading (-1..1)
    fn apply_thrust(&mut self, delta: f32);
    /// Rotate by `degrees`, keeping the heading normalized
    fn rotate(&mut self, degrees: f32);

    /// Advance position by one step of the current velocity
    fn integrate(&mut self, dt: f32) {
        let next = self.position() + self.velocity() * dt;
        self.set_position(next);
    }
}

/// Normalize any angle in degrees into [0, 360)
pub fn normalize_heading(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let h = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if h >= 360.0 {
        0.0
    } else {
        h
    }
}

/// A player's ship (authoritative)
#[derive(Debug)]
pub struct Ship {
    pub id: Uuid,
    pub player_id: Uuid,
    pub position: Vector2,
    pub velocity: Vector2,
    heading: f32,
    pub radius: f32,
    pub max_health: f32,
    pub health: f32,
    pub weapons: Vec<Weapon>,
    stats: ShipStats,
}

impl Ship {
    /// Create a ship for a player. The ship id is the player id, so a player
    /// can never own more than one ship in a world.
    pub fn new(player_id: Uuid, position: Vector2) -> Self {
        let stats = ShipStats::STANDARD;
        Self {
            id: player_id,
            player_id,
            position,
            velocity: Vector2::ZERO,
            heading: 0.0,
            radius: stats.hitbox_radius,
            max_health: stats.max_health,
            health: stats.max_health,
            weapons: Vec::new(),
            stats,
        }
    }

    pub fn with_heading(mut self, degrees: f32) -> Self {
        self.heading = normalize_heading(degrees);
        self
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn equip(&mut self, weapon: Weapon) {
        self.weapons.push(weapon);
    }

    pub fn stats(&self) -> &ShipStats {
        &self.stats
    }

    /// Reduce health by `damage`, flooring at zero. Returns the health actually removed.
    pub fn take_damage(&mut self, damage: f32) -> f32 {
        let before = self.health;
        self.health = (self.health - damage).max(0.0);
        before - self.health
    }
}

impl Movable for Ship {
    fn position(&self) -> Vector2 {
        self.position
    }

    fn set_position(&mut self, position: Vector2) {
        self.position = position;
    }

    fn velocity(&self) -> Vector2 {
        self.velocity
    }

    fn heading(&self) -> f32 {
        self.heading
    }

    fn apply_thrust(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        let direction = Vector2::from_heading(self.heading);
        self.velocity += direction * (self.stats.thrust_power * delta);
        self.velocity = self.velocity.clamp_magnitude(self.stats.max_speed);
    }

    fn rotate(&mut self, degrees: f32) {
        if !degrees.is_finite() {
            return;
        }
        self.heading = normalize_heading(self.heading + degrees);
    }
}

/// A projectile in flight. Velocity is fixed at spawn.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub owner_ship_id: Uuid,
    pub position: Vector2,
    velocity: Vector2,
    pub damage: f32,
    pub radius: f32,
    pub alive: bool,
    /// Seconds of flight left before the projectile expires
    pub lifetime_remaining: f32,
}

impl Projectile {
    pub fn new(owner_ship_id: Uuid, position: Vector2, velocity: Vector2, damage: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_ship_id,
            position,
            velocity,
            damage,
            radius: PROJECTILE_RADIUS,
            alive: true,
            lifetime_remaining: DEFAULT_PROJECTILE_LIFETIME,
        }
    }

    pub fn with_lifetime(mut self, seconds: f32) -> Self {
        self.lifetime_remaining = seconds;
        self
    }

    /// Burn `dt` seconds of lifetime, marking the projectile dead at expiry
    pub fn age(&mut self, dt: f32) {
        self.lifetime_remaining -= dt;
        if self.lifetime_remaining <= 0.0 {
            self.alive = false;
        }
    }
}

impl Movable for Projectile {
    fn position(&self) -> Vector2 {
        self.position
    }

    fn set_position(&mut self, position: Vector2) {
        self.position = position;
    }

    fn velocity(&self) -> Vector2 {
        self.velocity
    }

    fn heading(&self) -> f32 {
        if self.velocity.length_squared() <= f32::EPSILON {
            return 0.0;
        }
        normalize_heading(self.velocity.y.atan2(self.velocity.x).to_degrees())
    }

    // Projectiles fly ballistic; steering input is ignored.
    fn apply_thrust(&mut self, _delta: f32) {}

    fn rotate(&mut self, _degrees: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn heading_stays_in_range_for_any_turn_sequence() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut ship = Ship::new(Uuid::new_v4(), Vector2::ZERO);

        for _ in 0..5_000 {
            let delta = rng.gen_range(-1_000.0f32..1_000.0);
            ship.rotate(delta);
            let h = ship.heading();
            assert!((0.0..360.0).contains(&h), "heading {h} out of range");
        }

        ship.rotate(-1e-7);
        assert!((0.0..360.0).contains(&ship.heading()));
    }

    #[test]
    fn turning_wraps_around() {
        let mut ship = Ship::new(Uuid::new_v4(), Vector2::ZERO);
        ship.rotate(-90.0);
        assert!((ship.heading() - 270.0).abs() < 1e-4);
        ship.rotate(450.0);
        assert!(ship.heading().abs() < 1e-4);
    }

    #[test]
    fn thrust_never_exceeds_max_speed() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut ship = Ship::new(Uuid::new_v4(), Vector2::ZERO);
        let max = ship.stats().max_speed;

        for _ in 0..1_000 {
            if rng.gen_bool(0.2) {
                ship.rotate(rng.gen_range(0.0f32..360.0));
            }
            ship.apply_thrust(rng.gen_range(-1.0f32..=1.0) * 5.0);
            assert!(ship.velocity().length() <= max + 1e-3);
        }

        for _ in 0..100 {
            ship.apply_thrust(1.0);
        }
        assert!((ship.velocity().length() - max).abs() < 1e-3);
    }

    #[test]
    fn non_finite_steering_is_ignored() {
        let mut ship = Ship::new(Uuid::new_v4(), Vector2::ZERO).with_heading(30.0);
        ship.apply_thrust(1.0);
        let velocity = ship.velocity();

        ship.rotate(f32::INFINITY);
        ship.rotate(f32::NAN);
        ship.apply_thrust(f32::INFINITY);
        ship.apply_thrust(f32::NEG_INFINITY);
        ship.integrate(0.05);

        assert!((ship.heading() - 30.0).abs() < 1e-4);
        assert_eq!(ship.velocity(), velocity);
        assert!(ship.position().x.is_finite() && ship.position().y.is_finite());
        assert_eq!(normalize_heading(f32::NAN), 0.0);
    }

    #[test]
    fn projectile_ignores_steering_and_expires() {
        let mut p = Projectile::new(Uuid::new_v4(), Vector2::ZERO, Vector2::new(0.0, 5.0), 10.0)
            .with_lifetime(0.08);
        p.apply_thrust(1.0);
        p.rotate(45.0);
        assert_eq!(p.velocity(), Vector2::new(0.0, 5.0));
        assert!((p.heading() - 90.0).abs() < 1e-4);

        p.integrate(0.05);
        p.age(0.05);
        assert!(p.alive);
        assert!((p.position.y - 0.25).abs() < 1e-6);

        p.age(0.05);
        assert!(!p.alive);
    }

    #[test]
    fn damage_floors_at_zero() {
        let mut ship = Ship::new(Uuid::new_v4(), Vector2::ZERO);
        assert_eq!(ship.take_damage(30.0), 30.0);
        assert_eq!(ship.take_damage(500.0), 70.0);
        assert_eq!(ship.health, 0.0);
        assert!(!ship.is_alive());
    }
}
