//! Battle runtime: per-match worlds, their registry and the idle sweep

pub mod cleanup;
pub mod manager;
pub mod world;

pub use cleanup::WorldCleanupService;
pub use manager::BattleWorldManager;
pub use world::{Connection, GameWorld, OUTBOUND_BUFFER};
