//! Game scene.
//!
//! Owns everything the client draws: one [`PlayerEntity`] per joined session,
//! the cached server position of every remote session and two debug markers
//! for the local player (predicted position and server echo).
//!
//! Per fixed tick the scene samples input, sends it to the room, moves the
//! local entity by that input and eases every remote entity toward its cached
//! server position. The local prediction is never reconciled against the
//! server echo; the echo only drives `DebugMarkers::remote_ref`.

use std::{collections::HashMap, time::Duration};

use netplay_shared::{
    config::ClientConfig,
    math::Vec2,
    net::{InputSnapshot, JoinOptions, PlayerState, SessionId, StateListener, INPUT_MESSAGE},
};
use tracing::{debug, error, info, warn};

use crate::{
    client::{Room, RoomConnector},
    input::{movement, sample_input, KeyboardState},
    interp::{smooth_toward, ServerPositions},
    timestep::FixedStepAccumulator,
};

pub const STATUS_CONNECTING: &str = "Connecting...";
pub const STATUS_CONNECTED: &str = "Connected.";
pub const STATUS_CONNECT_FAILED: &str = "Could not connect with the server.";

/// Scene lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    /// `create` has not run yet.
    Uninitialized,
    /// Join in flight.
    Connecting,
    /// Joined; the fixed-step loop runs.
    Connected,
    /// Join failed. Terminal.
    Failed,
}

/// Visual representation of one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerEntity {
    pub position: Vec2,
}

/// Debug overlays for the local player.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DebugMarkers {
    /// Mirrors the locally predicted position.
    pub local_ref: Option<Vec2>,
    /// Mirrors the last position the room host reported for us.
    pub remote_ref: Option<Vec2>,
}

pub struct GameScene {
    state: SceneState,
    status_text: String,
    room_name: String,
    join_options: JoinOptions,

    room: Option<Room>,
    session_id: Option<SessionId>,

    entities: HashMap<SessionId, PlayerEntity>,
    server_positions: ServerPositions,
    markers: DebugMarkers,

    clock: FixedStepAccumulator,
    last_input: Option<InputSnapshot>,
    send_failed: bool,
}

impl GameScene {
    pub fn new(cfg: &ClientConfig) -> Self {
        Self {
            state: SceneState::Uninitialized,
            status_text: STATUS_CONNECTING.to_string(),
            room_name: cfg.room_name.clone(),
            join_options: JoinOptions {
                screen_width: cfg.screen_width,
                screen_height: cfg.screen_height,
            },
            room: None,
            session_id: None,
            entities: HashMap::new(),
            server_positions: ServerPositions::new(),
            markers: DebugMarkers::default(),
            clock: FixedStepAccumulator::new(),
            last_input: None,
            send_failed: false,
        }
    }

    /// Joins (or creates) the configured room.
    ///
    /// Runs at most once per scene; later calls return the current state
    /// without contacting the connector.
    pub async fn create<C: RoomConnector + ?Sized>(&mut self, connector: &C) -> SceneState {
        if self.state != SceneState::Uninitialized {
            warn!(state = ?self.state, "Scene already created, ignoring");
            return self.state;
        }

        self.state = SceneState::Connecting;
        match connector
            .join_or_create(&self.room_name, self.join_options)
            .await
        {
            Ok(room) => {
                info!(room_id = %room.room_id(), session_id = %room.session_id(), "Scene connected");
                self.session_id = Some(room.session_id().clone());
                self.room = Some(room);
                self.state = SceneState::Connected;
                self.status_text = STATUS_CONNECTED.to_string();
            }
            Err(e) => {
                error!(error = %e, room = %self.room_name, "Could not connect");
                self.state = SceneState::Failed;
                self.status_text = STATUS_CONNECT_FAILED.to_string();
            }
        }
        self.state
    }

    /// Applies every change the room has delivered since the last poll.
    pub fn poll_room(&mut self) -> usize {
        let changes = match self.room.as_mut() {
            Some(room) => room.drain_changes(),
            None => return 0,
        };
        let n = changes.len();
        for change in changes {
            debug!(session_id = %change.session_id(), "Room change");
            change.dispatch(self);
        }
        n
    }

    /// Per-frame callback. Returns the number of fixed ticks executed.
    pub fn update(&mut self, delta: Duration, keys: &impl KeyboardState) -> u32 {
        if self.state != SceneState::Connected {
            return 0;
        }

        self.clock.accumulate(delta);
        let mut ticks = 0;
        while let Some(tick) = self.clock.next_tick() {
            self.fixed_tick(tick, keys);
            ticks += 1;
        }
        ticks
    }

    fn fixed_tick(&mut self, tick: u32, keys: &impl KeyboardState) {
        let input = sample_input(keys, tick);
        self.send_input(&input);
        self.last_input = Some(input);

        if let Some(id) = self.session_id.as_ref() {
            if let Some(local) = self.entities.get_mut(id) {
                local.position += movement(&input);
                self.markers.local_ref = Some(local.position);
            }
        }

        for (id, entity) in self.entities.iter_mut() {
            if self.session_id.as_ref() == Some(id) {
                continue;
            }
            if let Some(target) = self.server_positions.get(id) {
                entity.position = smooth_toward(entity.position, target);
            }
        }
    }

    fn send_input(&mut self, input: &InputSnapshot) {
        let Some(room) = self.room.as_ref() else {
            return;
        };
        match room.send(INPUT_MESSAGE, input) {
            Ok(()) => debug!(tick = input.tick, "Input sent"),
            Err(e) if !self.send_failed => {
                warn!(error = %e, tick = input.tick, "Input send failed");
                self.send_failed = true;
            }
            Err(_) => {}
        }
    }

    fn is_local(&self, session_id: &SessionId) -> bool {
        self.session_id.as_ref() == Some(session_id)
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    /// Session id assigned to this client, once joined.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn entity(&self, session_id: &SessionId) -> Option<&PlayerEntity> {
        self.entities.get(session_id)
    }

    pub fn local_entity(&self) -> Option<&PlayerEntity> {
        self.session_id.as_ref().and_then(|id| self.entities.get(id))
    }

    pub fn entities(&self) -> impl Iterator<Item = (&SessionId, &PlayerEntity)> {
        self.entities.iter()
    }

    /// Returns the number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn server_position(&self, session_id: &SessionId) -> Option<Vec2> {
        self.server_positions.get(session_id)
    }

    pub fn markers(&self) -> DebugMarkers {
        self.markers
    }

    pub fn current_tick(&self) -> u32 {
        self.clock.current_tick()
    }

    /// Input sampled on the most recent tick.
    pub fn last_input(&self) -> Option<InputSnapshot> {
        self.last_input
    }
}

impl StateListener for GameScene {
    fn on_player_added(&mut self, session_id: SessionId, player: PlayerState) {
        let position = player.position();
        let local = self.is_local(&session_id);
        info!(session_id = %session_id, x = position.x, y = position.y, local, "Player added");

        if local {
            self.markers = DebugMarkers {
                local_ref: Some(position),
                remote_ref: Some(position),
            };
        } else {
            self.server_positions.set(session_id.clone(), position);
        }
        if self
            .entities
            .insert(session_id, PlayerEntity { position })
            .is_some()
        {
            debug!("Player re-added, entity replaced");
        }
    }

    fn on_player_changed(&mut self, session_id: &SessionId, player: PlayerState) {
        if !self.entities.contains_key(session_id) {
            debug!(session_id = %session_id, "Change for unknown player ignored");
            return;
        }
        if self.is_local(session_id) {
            self.markers.remote_ref = Some(player.position());
        } else {
            self.server_positions
                .set(session_id.clone(), player.position());
        }
    }

    fn on_player_removed(&mut self, session_id: &SessionId) {
        self.server_positions.remove(session_id);
        if self.entities.remove(session_id).is_none() {
            debug!(session_id = %session_id, "Removal for unknown player ignored");
            return;
        }
        if self.is_local(session_id) {
            self.markers = DebugMarkers::default();
        }
        info!(session_id = %session_id, "Player removed");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use async_trait::async_trait;
    use netplay_shared::net::{ClientMsg, StateChange};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{input::CursorKeys, timestep::FIXED_TIME_STEP};

    /// Hands out one pre-built room, or fails if it has none.
    struct StubConnector {
        room: Mutex<Option<Room>>,
        attempts: AtomicUsize,
        last_request: Mutex<Option<(String, JoinOptions)>>,
    }

    impl StubConnector {
        fn failing() -> Self {
            Self {
                room: Mutex::new(None),
                attempts: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn with_room(room: Room) -> Self {
            Self {
                room: Mutex::new(Some(room)),
                ..Self::failing()
            }
        }
    }

    #[async_trait]
    impl RoomConnector for StubConnector {
        async fn join_or_create(
            &self,
            room_name: &str,
            options: JoinOptions,
        ) -> anyhow::Result<Room> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some((room_name.to_string(), options));
            self.room
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    struct Harness {
        scene: GameScene,
        outbound: mpsc::UnboundedReceiver<ClientMsg>,
        changes: mpsc::UnboundedSender<StateChange>,
    }

    impl Harness {
        fn push(&self, change: StateChange) {
            self.changes.send(change).unwrap();
        }

        fn add(&self, id: &str, x: f32, y: f32) {
            self.push(StateChange::PlayerAdded {
                session_id: SessionId::new(id),
                player: PlayerState { x, y },
            });
        }

        fn change(&self, id: &str, x: f32, y: f32) {
            self.push(StateChange::PlayerChanged {
                session_id: SessionId::new(id),
                player: PlayerState { x, y },
            });
        }

        fn remove(&self, id: &str) {
            self.push(StateChange::PlayerRemoved {
                session_id: SessionId::new(id),
            });
        }

        fn sent_inputs(&mut self) -> Vec<InputSnapshot> {
            let mut out = Vec::new();
            while let Ok(msg) = self.outbound.try_recv() {
                out.push(msg.decode_body(INPUT_MESSAGE).unwrap());
            }
            out
        }
    }

    async fn connected(local: &str) -> Harness {
        let (out_tx, outbound) = mpsc::unbounded_channel();
        let (changes, changes_rx) = mpsc::unbounded_channel();
        let room = Room::from_channels("room-1", SessionId::new(local), out_tx, changes_rx);
        let connector = StubConnector::with_room(room);

        let mut scene = GameScene::new(&ClientConfig::default());
        assert_eq!(scene.create(&connector).await, SceneState::Connected);
        Harness {
            scene,
            outbound,
            changes,
        }
    }

    fn sid(s: &str) -> SessionId {
        SessionId::new(s)
    }

    #[tokio::test]
    async fn create_sends_room_name_and_viewport() {
        let (out_tx, _out) = mpsc::unbounded_channel();
        let (_tx, rx) = mpsc::unbounded_channel();
        let connector =
            StubConnector::with_room(Room::from_channels("r", sid("me"), out_tx, rx));
        let cfg = ClientConfig {
            room_name: "arena".into(),
            screen_width: 1024,
            screen_height: 768,
            ..Default::default()
        };

        let mut scene = GameScene::new(&cfg);
        assert_eq!(scene.status_text(), STATUS_CONNECTING);
        scene.create(&connector).await;

        assert_eq!(scene.state(), SceneState::Connected);
        assert_eq!(scene.status_text(), STATUS_CONNECTED);
        assert_eq!(scene.session_id(), Some(&sid("me")));
        let (room, options) = connector.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(room, "arena");
        assert_eq!(
            options,
            JoinOptions {
                screen_width: 1024,
                screen_height: 768
            }
        );
    }

    #[tokio::test]
    async fn failed_join_is_terminal() {
        let connector = StubConnector::failing();
        let mut scene = GameScene::new(&ClientConfig::default());
        assert_eq!(scene.status_text(), STATUS_CONNECTING);

        assert_eq!(scene.create(&connector).await, SceneState::Failed);
        assert_eq!(scene.status_text(), STATUS_CONNECT_FAILED);

        assert_eq!(scene.create(&connector).await, SceneState::Failed);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(scene.status_text(), STATUS_CONNECT_FAILED);

        assert_eq!(scene.update(Duration::from_secs(1), &CursorKeys::default()), 0);
        assert_eq!(scene.poll_room(), 0);
    }

    #[test]
    fn update_before_create_does_nothing() {
        let mut scene = GameScene::new(&ClientConfig::default());
        assert_eq!(scene.update(Duration::from_millis(100), &CursorKeys::default()), 0);
        assert_eq!(scene.current_tick(), 0);
    }

    #[tokio::test]
    async fn entity_map_tracks_joined_sessions() {
        let mut h = connected("me").await;
        let mut joined = HashSet::new();

        let script: &[(&str, bool)] = &[
            ("me", true),
            ("a", true),
            ("b", true),
            ("a", false),
            ("c", true),
            ("b", false),
            ("b", false),
            ("a", true),
            ("me", false),
            ("zzz", false),
        ];
        for &(id, add) in script {
            if add {
                h.add(id, 10.0, 20.0);
                joined.insert(sid(id));
            } else {
                h.remove(id);
                joined.remove(&sid(id));
            }
            h.scene.poll_room();
            let keys: HashSet<_> = h.scene.entities().map(|(k, _)| k.clone()).collect();
            assert_eq!(keys, joined);
        }
        assert_eq!(h.scene.server_position(&sid("b")), None);
        assert_eq!(h.scene.markers(), DebugMarkers::default());
    }

    #[tokio::test]
    async fn forty_ms_frame_runs_two_ticks_and_sends_two_inputs() {
        let mut h = connected("me").await;
        let keys = CursorKeys {
            left: true,
            ..Default::default()
        };

        assert_eq!(h.scene.update(Duration::from_millis(40), &keys), 2);
        let sent = h.sent_inputs();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].tick, 1);
        assert_eq!(sent[1].tick, 2);
        assert!(sent.iter().all(|s| s.left && !s.right && !s.up && !s.down));

        // 6.666666 ms carried over; 10 ms falls 1 ns short of a step, 11 ms does not.
        assert_eq!(h.scene.update(Duration::from_millis(10), &keys), 0);
        assert!(h.sent_inputs().is_empty());
        assert_eq!(h.scene.update(Duration::from_millis(1), &keys), 1);
        assert_eq!(h.sent_inputs()[0].tick, 3);
        assert_eq!(h.scene.last_input().map(|i| i.tick), Some(3));
    }

    #[tokio::test]
    async fn local_prediction_integrates_velocity() {
        let mut h = connected("me").await;
        h.add("me", 100.0, 50.0);
        h.scene.poll_room();

        let keys = CursorKeys {
            right: true,
            ..Default::default()
        };
        let n = 50;
        assert_eq!(h.scene.update(FIXED_TIME_STEP * n, &keys), n);

        let local = h.scene.local_entity().unwrap();
        assert_eq!(local.position, Vec2::new(100.0 + 2.0 * n as f32, 50.0));
        assert_eq!(h.scene.markers().local_ref, Some(local.position));
    }

    #[tokio::test]
    async fn server_echo_moves_marker_not_local_entity() {
        let mut h = connected("me").await;
        h.add("me", 0.0, 0.0);
        h.scene.poll_room();

        let keys = CursorKeys {
            down: true,
            ..Default::default()
        };
        h.scene.update(FIXED_TIME_STEP * 5, &keys);
        h.change("me", 500.0, 500.0);
        h.scene.poll_room();
        h.scene.update(FIXED_TIME_STEP * 5, &keys);

        assert_eq!(h.scene.local_entity().unwrap().position, Vec2::new(0.0, 20.0));
        assert_eq!(h.scene.markers().remote_ref, Some(Vec2::new(500.0, 500.0)));
        assert_eq!(h.scene.server_position(&sid("me")), None);
    }

    #[tokio::test]
    async fn remote_entity_converges_on_cached_position() {
        let mut h = connected("me").await;
        h.add("other", 0.0, 0.0);
        h.change("other", 100.0, 0.0);
        h.scene.poll_room();

        // Changes only update the cache.
        assert_eq!(h.scene.entity(&sid("other")).unwrap().position, Vec2::ZERO);
        assert_eq!(
            h.scene.server_position(&sid("other")),
            Some(Vec2::new(100.0, 0.0))
        );

        let keys = CursorKeys {
            right: true,
            ..Default::default()
        };
        for k in 1..=10 {
            h.scene.update(FIXED_TIME_STEP, &keys);
            let x = h.scene.entity(&sid("other")).unwrap().position.x;
            let expected_err = 100.0 * 0.8f32.powi(k);
            assert!(((100.0 - x) - expected_err).abs() < 1e-3, "tick {k}: x = {x}");
        }
    }

    #[tokio::test]
    async fn new_remote_rests_at_spawn_until_changed() {
        let mut h = connected("me").await;
        h.add("other", 30.0, 40.0);
        h.scene.poll_room();
        h.scene.update(FIXED_TIME_STEP * 3, &CursorKeys::default());
        assert_eq!(
            h.scene.entity(&sid("other")).unwrap().position,
            Vec2::new(30.0, 40.0)
        );
    }

    #[tokio::test]
    async fn unknown_session_notifications_are_ignored() {
        let mut h = connected("me").await;
        h.change("ghost", 1.0, 1.0);
        h.remove("ghost");
        assert_eq!(h.scene.poll_room(), 2);
        assert_eq!(h.scene.entity_count(), 0);
        assert_eq!(h.scene.server_position(&sid("ghost")), None);
    }

    #[tokio::test]
    async fn closed_room_does_not_stop_the_loop() {
        let mut h = connected("me").await;
        h.add("me", 0.0, 0.0);
        h.scene.poll_room();
        drop(std::mem::replace(&mut h.outbound, mpsc::unbounded_channel().1));

        let keys = CursorKeys {
            up: true,
            ..Default::default()
        };
        assert_eq!(h.scene.update(FIXED_TIME_STEP * 4, &keys), 4);
        assert_eq!(h.scene.local_entity().unwrap().position, Vec2::new(0.0, -8.0));
    }
}
