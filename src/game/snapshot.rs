//! Snapshot building and encoding

use bytes::Bytes;

use crate::util::time::unix_millis;
use crate::ws::protocol::{
    HitSnapshot, ProjectileSnapshot, ServerUpdate, ShipSnapshot, SnapshotMsg, WorldState,
};

use super::entities::{Movable, Projectile, Ship};
use super::game_loop::GameContext;

/// Serializes world state into one shared frame per tick
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    stats: SnapshotStats,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the world into wire DTOs
    pub fn build_state(ctx: &GameContext) -> WorldState {
        WorldState {
            ships: ctx
                .ships
                .values()
                .map(|s| (s.id, ship_snapshot(s)))
                .collect(),
            projectiles: ctx
                .projectiles
                .values()
                .map(|p| (p.id, projectile_snapshot(p)))
                .collect(),
            hits: ctx.hits.iter().map(HitSnapshot::from).collect(),
        }
    }

    /// Encode the world once. The returned payload is shared by every stream.
    pub fn encode(&mut self, tick: u64, ctx: &GameContext) -> Result<ServerUpdate, serde_json::Error> {
        let state = Self::build_state(ctx);
        let entities = state.ships.len() + state.projectiles.len();
        let update = encode_state(tick, state)?;
        self.stats.record(entities, update.payload.len());
        Ok(update)
    }

    /// Frame for a world that has not ticked yet
    pub fn encode_empty(tick: u64) -> Result<ServerUpdate, serde_json::Error> {
        encode_state(tick, WorldState::default())
    }

    pub fn stats(&self) -> &SnapshotStats {
        &self.stats
    }
}

fn encode_state(tick: u64, state: WorldState) -> Result<ServerUpdate, serde_json::Error> {
    let msg = SnapshotMsg {
        tick,
        server_time: unix_millis(),
        state,
    };
    let payload = serde_json::to_vec(&msg)?;
    Ok(ServerUpdate {
        tick,
        payload: Bytes::from(payload),
    })
}

fn ship_snapshot(ship: &Ship) -> ShipSnapshot {
    ShipSnapshot {
        id: ship.id,
        player_id: ship.player_id,
        x: ship.position.x,
        y: ship.position.y,
        vel_x: ship.velocity.x,
        vel_y: ship.velocity.y,
        heading: ship.heading(),
        radius: ship.radius,
        health: ship.health,
        max_health: ship.max_health,
        alive: ship.is_alive(),
        weapons: ship.weapons.iter().map(|w| w.code().to_string()).collect(),
    }
}

fn projectile_snapshot(p: &Projectile) -> ProjectileSnapshot {
    let velocity = p.velocity();
    ProjectileSnapshot {
        id: p.id,
        owner_ship_id: p.owner_ship_id,
        x: p.position.x,
        y: p.position.y,
        vel_x: velocity.x,
        vel_y: velocity.y,
        damage: p.damage,
        alive: p.alive,
    }
}

/// Encoding stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
    pub avg_entities_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, entity_count: usize, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_entities_per_snapshot =
            self.avg_entities_per_snapshot * ((n - 1.0) / n) + (entity_count as f32 / n);
    }
}
