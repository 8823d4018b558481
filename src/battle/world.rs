//! Per-battle runtime: one simulation task, one inbox, many output streams.
//!
//! All simulation state lives inside the world task. Readers on other tasks
//! only push into the inbox; the task drains it at the start of each tick,
//! advances the game loop, encodes one frame and hands a clone of it to every
//! attached stream.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::game::{Command, GameLoop, SimConfig, SnapshotBuilder};
use crate::util::time::{tick_delta, Timer, TICK_INTERVAL};
use crate::ws::protocol::{decode_payload, PayloadError, ServerUpdate};

/// Outbound frames buffered per stream before it counts as stalled
pub const OUTBOUND_BUFFER: usize = 32;

/// Work handed from network tasks to the world task
#[derive(Debug)]
enum InboxOp {
    RegisterPlayer(Uuid),
    Commands(Vec<Command>),
}

/// Handle for one attached output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: Uuid,
    pub player_id: Uuid,
}

#[derive(Clone)]
struct Client {
    id: Uuid,
    player_id: Uuid,
    tx: mpsc::Sender<ServerUpdate>,
}

/// State owned by the running task
struct WorldRunner {
    game: GameLoop,
    inbox_rx: mpsc::UnboundedReceiver<InboxOp>,
    snapshots: SnapshotBuilder,
}

impl WorldRunner {
    fn step(&mut self, dt: f32) -> Result<ServerUpdate, serde_json::Error> {
        while let Ok(op) = self.inbox_rx.try_recv() {
            match op {
                InboxOp::RegisterPlayer(player_id) => self.game.register_player(player_id),
                InboxOp::Commands(commands) => {
                    for command in commands {
                        self.game.enqueue(command);
                    }
                }
            }
        }

        self.game.tick(dt);
        self.snapshots
            .encode(self.game.current_tick(), self.game.context())
    }
}

pub struct GameWorld {
    battle_id: Uuid,
    clients: Mutex<Vec<Client>>,
    inbox_tx: mpsc::UnboundedSender<InboxOp>,
    /// Taken by the first `start`
    runner: Mutex<Option<WorldRunner>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    last_activity: Mutex<DateTime<Utc>>,
    /// Most recent encoded frame, replayed to newly attached streams
    latest: Mutex<Option<ServerUpdate>>,
}

impl GameWorld {
    pub fn new(battle_id: Uuid, sim: &SimConfig) -> Self {
        Self::with_game_loop(battle_id, GameLoop::with_config(sim))
    }

    /// Build a world around an existing game loop and its pipeline
    pub fn with_game_loop(battle_id: Uuid, game: GameLoop) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        Self {
            battle_id,
            clients: Mutex::new(Vec::new()),
            inbox_tx,
            runner: Mutex::new(Some(WorldRunner {
                game,
                inbox_rx,
                snapshots: SnapshotBuilder::new(),
            })),
            task: Mutex::new(None),
            shutdown,
            last_activity: Mutex::new(Utc::now()),
            latest: Mutex::new(None),
        }
    }

    pub fn battle_id(&self) -> Uuid {
        self.battle_id
    }

    /// Spawn the tick task. Later calls do nothing.
    pub fn start(self: &Arc<Self>) {
        let Some(runner) = self.runner.lock().take() else {
            return;
        };
        let handle = tokio::spawn(Arc::clone(self).run(runner));
        *self.task.lock() = Some(handle);
    }

    /// Signal the tick task to exit after its current iteration and close
    /// every attached stream
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        let released = std::mem::take(&mut *self.clients.lock());
        if !released.is_empty() {
            debug!(battle_id = %self.battle_id, streams = released.len(), "Closing streams");
        }
    }

    /// Stop and wait for the tick task to finish
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(battle_id = %self.battle_id, error = %e, "World task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn add_connection(&self, player_id: Uuid, tx: mpsc::Sender<ServerUpdate>) -> Connection {
        let conn = Connection {
            id: Uuid::new_v4(),
            player_id,
        };
        {
            let mut clients = self.clients.lock();
            // A stopped world drops the sender so the stream closes at once
            if self.is_stopped() {
                debug!(
                    battle_id = %self.battle_id,
                    player_id = %player_id,
                    "World stopped, stream closed"
                );
                return conn;
            }
            clients.push(Client {
                id: conn.id,
                player_id,
                tx,
            });
        }
        self.touch();
        debug!(battle_id = %self.battle_id, player_id = %player_id, "Connection added");
        conn
    }

    /// Returns false if the connection was already gone
    pub fn remove_connection(&self, conn: &Connection) -> bool {
        let removed = self.remove_client(conn.id);
        self.touch();
        removed
    }

    fn remove_client(&self, id: Uuid) -> bool {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|c| c.id != id);
        clients.len() != before
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    /// Decode an inbound payload and queue its commands for the next tick.
    ///
    /// Returns the number of commands queued. Bad payloads are logged and
    /// dropped without affecting the world.
    pub fn accept_payload(&self, player_id: Uuid, payload: &[u8]) -> Result<usize, PayloadError> {
        self.touch();

        let commands = decode_payload(player_id, payload, tick_delta()).map_err(|e| {
            warn!(
                battle_id = %self.battle_id,
                player_id = %player_id,
                error = %e,
                "Dropping bad payload"
            );
            e
        })?;

        let count = commands.len();
        if count > 0 {
            self.push(InboxOp::Commands(commands));
        }
        Ok(count)
    }

    /// Make sure the player's ship exists before their first payload is applied
    pub fn ensure_player(&self, player_id: Uuid) {
        self.push(InboxOp::RegisterPlayer(player_id));
    }

    fn push(&self, op: InboxOp) {
        if self.inbox_tx.send(op).is_err() {
            debug!(battle_id = %self.battle_id, "Inbox closed, world no longer running");
        }
    }

    /// Attach an output stream for a player.
    ///
    /// The stream immediately receives the latest frame (or an empty world if
    /// nothing has ticked yet), then one frame per tick.
    pub fn attach(&self, player_id: Uuid, tx: mpsc::Sender<ServerUpdate>) -> Connection {
        if let Some(initial) = self.initial_frame() {
            if tx.try_send(initial).is_err() {
                debug!(battle_id = %self.battle_id, player_id = %player_id, "Initial frame not delivered");
            }
        }

        let conn = self.add_connection(player_id, tx);
        self.ensure_player(player_id);
        info!(battle_id = %self.battle_id, player_id = %player_id, "Player attached");
        conn
    }

    fn initial_frame(&self) -> Option<ServerUpdate> {
        if let Some(latest) = self.latest.lock().clone() {
            return Some(latest);
        }
        match SnapshotBuilder::encode_empty(0) {
            Ok(update) => Some(update),
            Err(e) => {
                error!(battle_id = %self.battle_id, error = %e, "Failed to encode empty frame");
                None
            }
        }
    }

    async fn run(self: Arc<Self>, mut runner: WorldRunner) {
        info!(battle_id = %self.battle_id, "World started");

        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let dt = tick_delta();

        loop {
            if self.is_stopped() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let timer = Timer::new();

            let update = match catch_unwind(AssertUnwindSafe(|| runner.step(dt))) {
                Ok(Ok(update)) => update,
                Ok(Err(e)) => {
                    error!(battle_id = %self.battle_id, error = %e, "Snapshot encoding failed");
                    continue;
                }
                Err(_) => {
                    error!(battle_id = %self.battle_id, "Tick panicked, continuing with next tick");
                    continue;
                }
            };

            *self.latest.lock() = Some(update.clone());

            if self.is_stopped() {
                break;
            }
            self.broadcast(&update);

            let elapsed = timer.elapsed();
            if elapsed > TICK_INTERVAL {
                warn!(
                    battle_id = %self.battle_id,
                    tick = update.tick,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow tick"
                );
            }
        }

        info!(battle_id = %self.battle_id, "World stopped");
    }

    /// Hand the same frame to every stream. A stream that is closed or has
    /// fallen a full buffer behind is dropped; the rest are unaffected.
    fn broadcast(&self, update: &ServerUpdate) {
        let targets: Vec<Client> = self.clients.lock().clone();

        for client in targets {
            if let Err(e) = client.tx.try_send(update.clone()) {
                warn!(
                    battle_id = %self.battle_id,
                    player_id = %client.player_id,
                    error = %e,
                    "Stream write failed, dropping connection"
                );
                self.remove_client(client.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::normalize_heading;
    use crate::game::spatial::SpatialHashGrid;
    use crate::game::systems::{GameSystem, SystemPipeline};
    use crate::game::GameContext;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::ws::protocol::SnapshotMsg;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    const WAIT: Duration = Duration::from_secs(2);

    fn new_world() -> Arc<GameWorld> {
        Arc::new(GameWorld::new(Uuid::new_v4(), &SimConfig::default()))
    }

    fn decode(update: &ServerUpdate) -> SnapshotMsg {
        serde_json::from_slice(&update.payload).expect("frame is valid json")
    }

    /// Receive frames until one satisfies `pred`
    async fn wait_for_frame<F>(rx: &mut mpsc::Receiver<ServerUpdate>, mut pred: F) -> SnapshotMsg
    where
        F: FnMut(&SnapshotMsg) -> bool,
    {
        timeout(WAIT, async {
            loop {
                let update = rx.recv().await.expect("stream open");
                let msg = decode(&update);
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("frame arrived in time")
    }

    #[tokio::test]
    async fn attach_delivers_initial_frame_before_any_tick() {
        let world = new_world();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);

        world.attach(Uuid::new_v4(), tx);

        let initial = assert_ok!(rx.try_recv());
        let msg = decode(&initial);
        assert_eq!(msg.tick, 0);
        assert!(msg.state.ships.is_empty());
        assert_eq!(world.client_count(), 1);
    }

    #[tokio::test]
    async fn turn_payload_rotates_ship_by_nine_degrees() {
        let world = new_world();
        world.start();
        let player = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        world.attach(player, tx);

        let spawned = wait_for_frame(&mut rx, |m| m.state.ships.contains_key(&player)).await;
        let start = spawned.state.ships[&player].heading;

        let payload = br#"{"kind":"cmd","tick":1,"commands":[{"type":"TURN","value":1}]}"#;
        assert_eq!(assert_ok!(world.accept_payload(player, payload)), 1);

        let expected = normalize_heading(start + 9.0);
        wait_for_frame(&mut rx, |m| {
            m.state
                .ships
                .get(&player)
                .is_some_and(|s| (s.heading - expected).abs() < 1e-3)
        })
        .await;

        world.shutdown().await;
    }

    #[tokio::test]
    async fn bad_payload_is_rejected_and_world_keeps_ticking() {
        let world = new_world();
        world.start();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let player = Uuid::new_v4();
        world.attach(player, tx);

        assert_err!(world.accept_payload(player, b"not json"));
        assert_err!(world.accept_payload(player, br#"{"unexpected":true}"#));

        let msg = wait_for_frame(&mut rx, |m| m.tick >= 3).await;
        assert!(msg.state.ships.contains_key(&player));
        world.shutdown().await;
    }

    #[tokio::test]
    async fn broken_stream_is_dropped_without_affecting_others() {
        let world = new_world();
        world.start();

        let (dead_tx, dead_rx) = mpsc::channel(OUTBOUND_BUFFER);
        drop(dead_rx);
        world.add_connection(Uuid::new_v4(), dead_tx);

        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        world.add_connection(Uuid::new_v4(), tx);

        wait_for_frame(&mut rx, |m| m.tick >= 2).await;
        assert_eq!(world.client_count(), 1);

        // Healthy stream keeps receiving
        wait_for_frame(&mut rx, |m| m.tick >= 4).await;
        world.shutdown().await;
    }

    #[tokio::test]
    async fn no_frames_after_shutdown() {
        let world = new_world();
        world.start();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        world.add_connection(Uuid::new_v4(), tx);

        wait_for_frame(&mut rx, |_| true).await;
        world.shutdown().await;
        assert!(!world.is_running());

        while rx.try_recv().is_ok() {}
        tokio::time::sleep(TICK_INTERVAL * 3).await;
        assert_err!(rx.try_recv());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let world = new_world();
        world.start();
        world.start();
        assert!(world.is_running());

        world.stop();
        world.stop();
        assert!(world.is_stopped());
        world.shutdown().await;
        assert!(!world.is_running());
    }

    #[tokio::test]
    async fn connection_changes_record_activity() {
        let world = new_world();
        let before = world.last_activity();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let (tx, _rx) = mpsc::channel(OUTBOUND_BUFFER);
        let conn = world.add_connection(Uuid::new_v4(), tx);
        assert!(world.last_activity() > before);

        assert!(world.remove_connection(&conn));
        assert!(!world.remove_connection(&conn));
        assert_eq!(world.client_count(), 0);
    }

    #[tokio::test]
    async fn stopping_closes_attached_streams() {
        let world = new_world();
        world.start();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        world.attach(Uuid::new_v4(), tx);
        wait_for_frame(&mut rx, |m| m.tick >= 1).await;

        world.shutdown().await;
        assert_eq!(world.client_count(), 0);
        let closed = timeout(WAIT, async { while rx.recv().await.is_some() {} }).await;
        assert_ok!(closed);

        // Attaching to a stopped world yields a stream that ends after the replayed frame
        let (tx, mut late_rx) = mpsc::channel(OUTBOUND_BUFFER);
        world.attach(Uuid::new_v4(), tx);
        assert_eq!(world.client_count(), 0);
        let closed = timeout(WAIT, async { while late_rx.recv().await.is_some() {} }).await;
        assert_ok!(closed);
    }

    /// Panics on its first update only
    struct PanicOnce {
        calls: Arc<AtomicUsize>,
    }

    impl GameSystem for PanicOnce {
        fn name(&self) -> &'static str {
            "PanicOnce"
        }

        fn update(&mut self, _ctx: &mut GameContext, _grid: &mut SpatialHashGrid, _dt: f32) {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("stage failed");
            }
        }
    }

    #[tokio::test]
    async fn panicking_tick_is_skipped_and_loop_continues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = SystemPipeline::with_systems(
            SpatialHashGrid::default(),
            vec![Box::new(PanicOnce {
                calls: Arc::clone(&calls),
            })],
        );
        let world = Arc::new(GameWorld::with_game_loop(
            Uuid::new_v4(),
            GameLoop::with_pipeline(pipeline),
        ));
        world.start();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let player = Uuid::new_v4();
        world.attach(player, tx);

        let msg = wait_for_frame(&mut rx, |m| {
            m.tick >= 2 && m.state.ships.contains_key(&player)
        })
        .await;
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(msg.state.ships[&player].alive);
        assert!(world.is_running());

        world.shutdown().await;
    }
}
