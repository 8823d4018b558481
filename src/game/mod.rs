//! Game simulation modules

pub mod combat;
pub mod commands;
pub mod entities;
pub mod game_loop;
pub mod physics;
pub mod snapshot;
pub mod spatial;
pub mod systems;
pub mod vector;

pub use commands::Command;
pub use game_loop::{GameContext, GameLoop, HitRecord};
pub use physics::SimConfig;
pub use snapshot::SnapshotBuilder;
