//! Simulation stages applied once per tick, in a fixed order:
//!
//! 1. `MovementSystem` integrates every movable
//! 2. `SpatialIndexSystem` rebuilds the broad-phase grid
//! 3. `ShipCollisionSystem` separates overlapping ship pairs
//! 4. `ProjectileCollisionSystem` runs the hit-handler chain for projectile hits
//! 5. `CleanupSystem` removes dead projectiles and ships

use std::collections::HashSet;

use uuid::Uuid;

use super::entities::{Movable, Projectile, Ship};
use super::game_loop::{GameContext, HitRecord};
use super::physics::{check_circle_collision, resolve_ship_collision, Body, SimConfig};
use super::spatial::SpatialHashGrid;
use super::vector::Vector2;

/// One stage of the per-tick pipeline
pub trait GameSystem: Send {
    fn name(&self) -> &'static str;
    fn update(&mut self, ctx: &mut GameContext, grid: &mut SpatialHashGrid, dt: f32);
}

/// Ordered list of stages sharing one broad-phase grid
pub struct SystemPipeline {
    grid: SpatialHashGrid,
    systems: Vec<Box<dyn GameSystem>>,
}

impl SystemPipeline {
    /// The production pipeline
    pub fn standard(config: &SimConfig) -> Self {
        Self::with_systems(
            SpatialHashGrid::new(config.cell_size),
            vec![
                Box::new(MovementSystem),
                Box::new(SpatialIndexSystem),
                Box::new(ShipCollisionSystem::new(
                    config.restitution,
                    config.collision_damping,
                )),
                Box::new(
                    ProjectileCollisionSystem::new(config.knockback_impulse)
                        .with_owner_immunity(config.owner_immunity),
                ),
                Box::new(CleanupSystem),
            ],
        )
    }

    pub fn with_systems(grid: SpatialHashGrid, systems: Vec<Box<dyn GameSystem>>) -> Self {
        Self { grid, systems }
    }

    pub fn run(&mut self, ctx: &mut GameContext, dt: f32) {
        for system in self.systems.iter_mut() {
            system.update(ctx, &mut self.grid, dt);
        }
    }

    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|s| s.name()).collect()
    }
}

// ============================================================================
// Movement
// ============================================================================

pub struct MovementSystem;

impl GameSystem for MovementSystem {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn update(&mut self, ctx: &mut GameContext, _grid: &mut SpatialHashGrid, dt: f32) {
        for ship in ctx.ships.values_mut() {
            ship.integrate(dt);
        }

        for projectile in ctx.projectiles.values_mut() {
            projectile.integrate(dt);
            projectile.age(dt);
        }
    }
}

// ============================================================================
// Spatial index
// ============================================================================

pub struct SpatialIndexSystem;

impl GameSystem for SpatialIndexSystem {
    fn name(&self) -> &'static str {
        "spatial_index"
    }

    fn update(&mut self, ctx: &mut GameContext, grid: &mut SpatialHashGrid, _dt: f32) {
        grid.clear();
        for ship in ctx.ships.values() {
            grid.insert_ship(ship.id, ship.position);
        }
        for projectile in ctx.projectiles.values().filter(|p| p.alive) {
            grid.insert_projectile(projectile.id, projectile.position);
        }
    }
}

// ============================================================================
// Ship vs ship
// ============================================================================

pub struct ShipCollisionSystem {
    restitution: f32,
    damping: f32,
}

impl ShipCollisionSystem {
    pub fn new(restitution: f32, damping: f32) -> Self {
        Self {
            restitution,
            damping,
        }
    }
}

fn body_of(ship: &Ship) -> Body {
    Body {
        position: ship.position,
        velocity: ship.velocity,
        radius: ship.radius,
    }
}

fn write_body(ctx: &mut GameContext, id: Uuid, body: Body) {
    if let Some(ship) = ctx.ships.get_mut(&id) {
        ship.position = body.position;
        ship.velocity = body.velocity;
    }
}

impl GameSystem for ShipCollisionSystem {
    fn name(&self) -> &'static str {
        "ship_collision"
    }

    fn update(&mut self, ctx: &mut GameContext, grid: &mut SpatialHashGrid, _dt: f32) {
        // Each unordered pair resolves at most once per tick
        let mut seen: HashSet<(Uuid, Uuid)> = HashSet::new();
        let ids: Vec<Uuid> = ctx.ships.keys().copied().collect();

        for a_id in ids {
            let Some(a_pos) = ctx.ships.get(&a_id).map(|s| s.position) else {
                continue;
            };
            let candidates: Vec<Uuid> = grid.ships_around(a_pos).collect();

            for b_id in candidates {
                if a_id == b_id {
                    continue;
                }
                let key = if a_id < b_id { (a_id, b_id) } else { (b_id, a_id) };
                if !seen.insert(key) {
                    continue;
                }

                let (Some(a), Some(b)) = (
                    ctx.ships.get(&a_id).map(body_of),
                    ctx.ships.get(&b_id).map(body_of),
                ) else {
                    continue;
                };

                if let Some((a, b)) = resolve_ship_collision(a, b, self.restitution, self.damping) {
                    write_body(ctx, a_id, a);
                    write_body(ctx, b_id, b);
                }
            }
        }
    }
}

// ============================================================================
// Projectile vs ship
// ============================================================================

/// Whether the hit chain keeps going after a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitFlow {
    Continue,
    Stop,
}

/// One step of projectile hit resolution
pub trait HitHandler: Send {
    fn handle(
        &mut self,
        projectile: &mut Projectile,
        ship: &mut Ship,
        hits: &mut Vec<HitRecord>,
    ) -> HitFlow;
}

/// Appends the hit to the tick's hit log
pub struct RecordHitHandler;

impl HitHandler for RecordHitHandler {
    fn handle(&mut self, p: &mut Projectile, s: &mut Ship, hits: &mut Vec<HitRecord>) -> HitFlow {
        hits.push(HitRecord {
            ship_id: s.id,
            projectile_id: p.id,
            damage: p.damage,
        });
        HitFlow::Continue
    }
}

pub struct ApplyDamageHandler;

impl HitHandler for ApplyDamageHandler {
    fn handle(&mut self, p: &mut Projectile, s: &mut Ship, _hits: &mut Vec<HitRecord>) -> HitFlow {
        s.take_damage(p.damage);
        HitFlow::Continue
    }
}

/// Pushes the ship away from the projectile along the contact normal
pub struct KnockbackHandler {
    impulse: f32,
}

impl KnockbackHandler {
    pub fn new(impulse: f32) -> Self {
        Self { impulse }
    }
}

impl HitHandler for KnockbackHandler {
    fn handle(&mut self, p: &mut Projectile, s: &mut Ship, _hits: &mut Vec<HitRecord>) -> HitFlow {
        let delta = s.position - p.position;
        let dist = delta.length_squared().max(1e-6).sqrt();
        let normal = Vector2::new(delta.x / dist, delta.y / dist);
        s.velocity += normal * self.impulse;
        HitFlow::Continue
    }
}

/// Marks the projectile dead and ends the chain
pub struct KillProjectileHandler;

impl HitHandler for KillProjectileHandler {
    fn handle(&mut self, p: &mut Projectile, _s: &mut Ship, _hits: &mut Vec<HitRecord>) -> HitFlow {
        p.alive = false;
        HitFlow::Stop
    }
}

pub struct ProjectileCollisionSystem {
    handlers: Vec<Box<dyn HitHandler>>,
    owner_immunity: bool,
}

impl ProjectileCollisionSystem {
    /// Default chain: record, damage, knockback, kill
    pub fn new(knockback_impulse: f32) -> Self {
        Self {
            handlers: vec![
                Box::new(RecordHitHandler),
                Box::new(ApplyDamageHandler),
                Box::new(KnockbackHandler::new(knockback_impulse)),
                Box::new(KillProjectileHandler),
            ],
            owner_immunity: false,
        }
    }

    /// Custom chain. An empty list falls back to the default chain.
    pub fn with_handlers(handlers: Vec<Box<dyn HitHandler>>) -> Self {
        if handlers.is_empty() {
            return Self::new(SimConfig::default().knockback_impulse);
        }
        Self {
            handlers,
            owner_immunity: false,
        }
    }

    /// Skip the ship that fired the projectile when looking for a target
    pub fn with_owner_immunity(mut self, enabled: bool) -> Self {
        self.owner_immunity = enabled;
        self
    }
}

impl GameSystem for ProjectileCollisionSystem {
    fn name(&self) -> &'static str {
        "projectile_collision"
    }

    fn update(&mut self, ctx: &mut GameContext, grid: &mut SpatialHashGrid, _dt: f32) {
        let GameContext {
            ships,
            projectiles,
            hits,
        } = ctx;

        for projectile in projectiles.values_mut() {
            if !projectile.alive {
                continue;
            }

            // First overlapping ship wins
            let target = grid.ships_around(projectile.position).find(|id| {
                !(self.owner_immunity && *id == projectile.owner_ship_id)
                    && ships.get(id).is_some_and(|s| {
                        check_circle_collision(
                            projectile.position,
                            projectile.radius,
                            s.position,
                            s.radius,
                        )
                    })
            });

            let Some(ship) = target.and_then(|id| ships.get_mut(&id)) else {
                continue;
            };

            for handler in self.handlers.iter_mut() {
                if handler.handle(projectile, ship, hits) == HitFlow::Stop {
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Cleanup
// ============================================================================

pub struct CleanupSystem;

impl GameSystem for CleanupSystem {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn update(&mut self, ctx: &mut GameContext, _grid: &mut SpatialHashGrid, _dt: f32) {
        ctx.projectiles.retain(|_, p| p.alive);
        ctx.ships.retain(|_, s| s.is_alive());
    }
}
