//! Periodic reclamation of idle worlds

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::manager::BattleWorldManager;

pub struct WorldCleanupService {
    manager: Arc<BattleWorldManager>,
    check_interval: Duration,
    idle_threshold: chrono::Duration,
}

impl WorldCleanupService {
    pub fn new(
        manager: Arc<BattleWorldManager>,
        check_interval: Duration,
        idle_threshold: Duration,
    ) -> Self {
        Self {
            manager,
            check_interval,
            idle_threshold: chrono::Duration::from_std(idle_threshold)
                .unwrap_or_else(|_| chrono::Duration::weeks(52)),
        }
    }

    /// Remove every world with no streams whose last activity is older than
    /// the idle threshold. Returns how many were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for world in self.manager.worlds() {
            let idle_for = now - world.last_activity();
            if world.client_count() > 0 || idle_for <= self.idle_threshold {
                continue;
            }
            // Re-checked under the registry lock; a stream may attach meanwhile
            if self
                .manager
                .remove_if_idle(world.battle_id(), self.idle_threshold, now)
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Sweep forever on the configured interval. A failing sweep is logged
    /// and the next one runs as usual.
    pub async fn run(self) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            idle_secs = self.idle_threshold.num_seconds(),
            "World cleanup started"
        );

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match catch_unwind(AssertUnwindSafe(|| self.sweep())) {
                Ok(0) => {}
                Ok(n) => debug!(removed = n, remaining = self.manager.len(), "Cleanup sweep"),
                Err(_) => error!("Cleanup sweep panicked"),
            }
        }
    }
}
