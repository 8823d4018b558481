//! Application state shared across routes

use std::sync::Arc;

use crate::battle::BattleWorldManager;
use crate::config::Config;
use crate::game::SimConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub worlds: Arc<BattleWorldManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sim = SimConfig {
            owner_immunity: config.owner_immunity,
            ..SimConfig::default()
        };
        Self::with_sim(config, sim)
    }

    pub fn with_sim(config: Config, sim: SimConfig) -> Self {
        Self {
            config: Arc::new(config),
            worlds: Arc::new(BattleWorldManager::new(sim)),
        }
    }
}
