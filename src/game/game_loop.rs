//! Single-threaded simulation core for one battle.
//!
//! Not thread safe. The owning world task is the only caller; everyone else
//! talks to it through the world's command inbox.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::commands::Command;
use super::entities::{Projectile, Ship};
use super::physics::SimConfig;
use super::systems::SystemPipeline;

/// A projectile hitting a ship during the current tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HitRecord {
    pub ship_id: Uuid,
    pub projectile_id: Uuid,
    pub damage: f32,
}

/// Mutable world state shared by commands and systems
#[derive(Debug, Default)]
pub struct GameContext {
    /// Ships keyed by ship id (which is also the player id)
    pub ships: HashMap<Uuid, Ship>,
    pub projectiles: HashMap<Uuid, Projectile>,
    /// Hits recorded during the current tick only
    pub hits: Vec<HitRecord>,
}

pub struct GameLoop {
    ctx: GameContext,
    queue: VecDeque<Command>,
    pipeline: SystemPipeline,
    tick: u64,
}

impl GameLoop {
    pub fn new() -> Self {
        Self::with_config(&SimConfig::default())
    }

    pub fn with_config(config: &SimConfig) -> Self {
        Self::with_pipeline(SystemPipeline::standard(config))
    }

    pub fn with_pipeline(pipeline: SystemPipeline) -> Self {
        Self {
            ctx: GameContext::default(),
            queue: VecDeque::new(),
            pipeline,
            tick: 0,
        }
    }

    /// Queue a command for the next tick
    pub fn enqueue(&mut self, command: Command) {
        self.queue.push_back(command);
    }

    /// Queue a spawn for the player's ship if it does not exist yet
    pub fn register_player(&mut self, player_id: Uuid) {
        self.enqueue(Command::EnsurePlayer { player_id });
    }

    pub fn tick(&mut self, dt: f32) {
        self.tick_at(dt, Utc::now());
    }

    /// Advance one step using `now` as the clock for weapon cooldowns.
    ///
    /// Clears the previous tick's hits, applies every queued command in
    /// arrival order, then runs the system pipeline.
    pub fn tick_at(&mut self, dt: f32, now: DateTime<Utc>) {
        self.ctx.hits.clear();

        while let Some(command) = self.queue.pop_front() {
            command.apply(&mut self.ctx, now);
        }

        self.pipeline.run(&mut self.ctx, dt);
        self.tick += 1;
    }

    pub fn context(&self) -> &GameContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut GameContext {
        &mut self.ctx
    }

    /// Number of completed ticks
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }
}

impl Default for GameLoop {
    fn default() -> Self {
        Self::new()
    }
}
