//! Combat system - weapons, cooldowns, projectile spawning

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::{Movable, Projectile, Ship};
use super::vector::Vector2;

/// Weapon types a ship can equip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeaponKind {
    /// Fast, light, short cooldown
    Laser,
    /// Slow, heavy, long cooldown
    Rocket,
}

impl WeaponKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Laser => "LASER",
            Self::Rocket => "ROCKET",
        }
    }

    /// Case-insensitive lookup by wire code
    pub fn from_code(code: &str) -> Option<Self> {
        [Self::Laser, Self::Rocket]
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(code))
    }
}

/// Weapon stats per weapon type
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: f32,
    /// Projectile speed
    pub projectile_speed: f32,
    /// Cooldown between shots (milliseconds)
    pub cooldown_ms: i64,
    /// Projectile lifetime (seconds)
    pub projectile_lifetime: f32,
    /// Distance ahead of the ship centre where projectiles appear
    pub muzzle_offset: f32,
}

impl WeaponStats {
    pub fn for_kind(kind: WeaponKind) -> Self {
        match kind {
            WeaponKind::Laser => Self {
                damage: 10.0,
                projectile_speed: 20.0,
                cooldown_ms: 200,
                projectile_lifetime: 2.0,
                muzzle_offset: 1.5,
            },
            WeaponKind::Rocket => Self {
                damage: 40.0,
                projectile_speed: 8.0,
                cooldown_ms: 3_000,
                projectile_lifetime: 5.0,
                muzzle_offset: 2.0,
            },
        }
    }
}

/// Firing origin captured from a ship before its weapon is borrowed
#[derive(Debug, Clone, Copy)]
pub struct Muzzle {
    pub ship_id: Uuid,
    pub position: Vector2,
    pub heading: f32,
}

impl Muzzle {
    pub fn of(ship: &Ship) -> Self {
        Self {
            ship_id: ship.id,
            position: ship.position(),
            heading: ship.heading(),
        }
    }
}

/// How a weapon turns a trigger pull into a projectile
pub trait ProjectileStrategy: Send + Sync + fmt::Debug {
    fn create(&self, muzzle: &Muzzle) -> Projectile;
}

/// Spawns one projectile straight ahead of the ship's nose
#[derive(Debug, Clone, Copy)]
pub struct ForwardProjectileStrategy {
    muzzle_offset: f32,
    speed: f32,
    damage: f32,
    lifetime: f32,
}

impl ForwardProjectileStrategy {
    pub fn new(muzzle_offset: f32, speed: f32, damage: f32, lifetime: f32) -> Self {
        Self {
            muzzle_offset,
            speed,
            damage,
            lifetime,
        }
    }

    pub fn from_stats(stats: &WeaponStats) -> Self {
        Self::new(
            stats.muzzle_offset,
            stats.projectile_speed,
            stats.damage,
            stats.projectile_lifetime,
        )
    }
}

impl ProjectileStrategy for ForwardProjectileStrategy {
    fn create(&self, muzzle: &Muzzle) -> Projectile {
        let dir = Vector2::from_heading(muzzle.heading);
        let position = muzzle.position + dir * self.muzzle_offset;
        Projectile::new(muzzle.ship_id, position, dir * self.speed, self.damage)
            .with_lifetime(self.lifetime)
    }
}

/// Weapon errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeaponError {
    #[error("Weapon {code} is cooling down ({remaining_ms} ms left)")]
    Cooldown {
        code: &'static str,
        remaining_ms: i64,
    },
}

/// An equipped weapon instance. Cooldown state belongs to this instance only.
#[derive(Debug)]
pub struct Weapon {
    kind: WeaponKind,
    cooldown: Duration,
    last_fired: Option<DateTime<Utc>>,
    strategy: Box<dyn ProjectileStrategy>,
}

impl Weapon {
    pub fn new(kind: WeaponKind) -> Self {
        let stats = WeaponStats::for_kind(kind);
        Self::with_strategy(
            kind,
            Duration::milliseconds(stats.cooldown_ms),
            Box::new(ForwardProjectileStrategy::from_stats(&stats)),
        )
    }

    pub fn laser() -> Self {
        Self::new(WeaponKind::Laser)
    }

    pub fn rocket() -> Self {
        Self::new(WeaponKind::Rocket)
    }

    pub fn with_strategy(
        kind: WeaponKind,
        cooldown: Duration,
        strategy: Box<dyn ProjectileStrategy>,
    ) -> Self {
        Self {
            kind,
            cooldown,
            last_fired: None,
            strategy,
        }
    }

    pub fn kind(&self) -> WeaponKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.last_fired
    }

    pub fn can_fire(&self, now: DateTime<Utc>) -> bool {
        self.last_fired
            .map_or(true, |last| now - last >= self.cooldown)
    }

    /// Fire the weapon, advancing its last-fired time on success
    pub fn fire(&mut self, now: DateTime<Utc>, muzzle: &Muzzle) -> Result<Projectile, WeaponError> {
        if let Some(last) = self.last_fired {
            let elapsed = now - last;
            if elapsed < self.cooldown {
                return Err(WeaponError::Cooldown {
                    code: self.code(),
                    remaining_ms: (self.cooldown - elapsed).num_milliseconds(),
                });
            }
        }

        self.last_fired = Some(now);
        Ok(self.strategy.create(muzzle))
    }
}
