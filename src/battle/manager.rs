//! Registry of live battle worlds

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use super::world::{Connection, GameWorld};
use crate::game::SimConfig;
use crate::ws::protocol::ServerUpdate;

/// Concurrent map from battle id to its running world
pub struct BattleWorldManager {
    worlds: DashMap<Uuid, Arc<GameWorld>>,
    sim: SimConfig,
}

impl BattleWorldManager {
    pub fn new(sim: SimConfig) -> Self {
        Self {
            worlds: DashMap::new(),
            sim,
        }
    }

    /// Return the battle's world, creating and starting it on first use.
    /// Concurrent callers for the same id always get the same instance.
    pub fn get_or_create(&self, battle_id: Uuid) -> Arc<GameWorld> {
        let world = self.entry(battle_id).value().clone();
        world.start();
        world
    }

    /// Attach a stream to the battle's world, creating it on first use.
    ///
    /// The stream is registered while the registry entry is held, so an idle
    /// sweep can never evict the world between lookup and attach.
    pub fn attach(
        &self,
        battle_id: Uuid,
        player_id: Uuid,
        tx: mpsc::Sender<ServerUpdate>,
    ) -> (Arc<GameWorld>, Connection) {
        let entry = self.entry(battle_id);
        let world = entry.value().clone();
        world.start();
        let conn = world.attach(player_id, tx);
        drop(entry);
        (world, conn)
    }

    fn entry(&self, battle_id: Uuid) -> RefMut<'_, Uuid, Arc<GameWorld>> {
        self.worlds.entry(battle_id).or_insert_with(|| {
            info!(battle_id = %battle_id, "Creating world");
            Arc::new(GameWorld::new(battle_id, &self.sim))
        })
    }

    pub fn get(&self, battle_id: Uuid) -> Option<Arc<GameWorld>> {
        self.worlds.get(&battle_id).map(|w| w.value().clone())
    }

    /// Stop and evict a world
    pub fn remove(&self, battle_id: Uuid) -> Option<Arc<GameWorld>> {
        let (_, world) = self.worlds.remove(&battle_id)?;
        world.stop();
        info!(battle_id = %battle_id, "World removed");
        Some(world)
    }

    /// Stop and evict a world only if it has no streams and has been idle
    /// longer than `threshold` at `now`. The condition is checked under the
    /// registry lock.
    pub fn remove_if_idle(
        &self,
        battle_id: Uuid,
        threshold: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Option<Arc<GameWorld>> {
        let (_, world) = self.worlds.remove_if(&battle_id, |_, world| {
            world.client_count() == 0 && now - world.last_activity() > threshold
        })?;
        world.stop();
        info!(
            battle_id = %battle_id,
            idle_secs = (now - world.last_activity()).num_seconds(),
            "Idle world removed"
        );
        Some(world)
    }

    /// Point-in-time copy of every live world
    pub fn worlds(&self) -> Vec<Arc<GameWorld>> {
        self.worlds.iter().map(|w| w.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    /// Streams attached across all worlds
    pub fn connected_clients(&self) -> usize {
        self.worlds.iter().map(|w| w.client_count()).sum()
    }

    /// Remove every world and wait for their tasks to exit
    pub async fn shutdown_all(&self) {
        let ids: Vec<Uuid> = self.worlds.iter().map(|w| *w.key()).collect();
        for id in ids {
            if let Some((_, world)) = self.worlds.remove(&id) {
                world.shutdown().await;
            }
        }
        info!("All worlds stopped");
    }
}

impl Default for BattleWorldManager {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::world::OUTBOUND_BUFFER;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn get_or_create_returns_the_same_instance() {
        let manager = BattleWorldManager::default();
        let id = Uuid::new_v4();

        let a = manager.get_or_create(id);
        let b = manager.get_or_create(id);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
        assert!(a.is_running());
        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn remove_then_create_yields_a_new_world() {
        let manager = BattleWorldManager::default();
        let id = Uuid::new_v4();

        let first = manager.get_or_create(id);
        let removed = manager.remove(id).expect("world was registered");
        assert!(Arc::ptr_eq(&first, &removed));
        assert!(first.is_stopped());
        assert!(manager.is_empty());
        assert!(manager.remove(id).is_none());

        let second = manager.get_or_create(id);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_stopped());
        manager.shutdown_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creation_yields_one_world() {
        let manager = Arc::new(BattleWorldManager::default());
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_or_create(id) })
            })
            .collect();

        let mut worlds = Vec::new();
        for handle in handles {
            worlds.push(handle.await.expect("task completed"));
        }

        assert!(worlds.iter().all(|w| Arc::ptr_eq(w, &worlds[0])));
        assert_eq!(manager.len(), 1);
        manager.shutdown_all().await;
        assert!(!worlds[0].is_running());
    }

    #[tokio::test]
    async fn removed_world_closes_its_streams() {
        let manager = BattleWorldManager::default();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (world, _conn) = manager.attach(id, Uuid::new_v4(), tx);

        let removed = manager.remove(id).expect("world was registered");
        removed.shutdown().await;

        assert_eq!(world.client_count(), 0);
        let closed = timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert_ok!(closed);
    }

    #[tokio::test]
    async fn remove_if_idle_spares_attached_worlds() {
        let manager = BattleWorldManager::default();
        let id = Uuid::new_v4();
        let threshold = chrono::Duration::minutes(2);
        let later = Utc::now() + chrono::Duration::minutes(10);

        // Looked up while idle, then a stream attaches before the eviction
        let world = manager.get_or_create(id);
        let (tx, _rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (attached, conn) = manager.attach(id, Uuid::new_v4(), tx);
        assert!(Arc::ptr_eq(&world, &attached));

        assert!(manager.remove_if_idle(id, threshold, later).is_none());
        assert!(manager.get(id).is_some());
        assert!(!world.is_stopped());

        // Recent activity also keeps it
        world.remove_connection(&conn);
        assert!(manager.remove_if_idle(id, threshold, Utc::now()).is_none());

        let removed = manager.remove_if_idle(id, threshold, later);
        assert!(removed.is_some_and(|w| w.is_stopped()));
        assert!(manager.is_empty());
        world.shutdown().await;
    }
}
