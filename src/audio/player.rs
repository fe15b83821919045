use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    audio::{
        queue::{QueueInfo, Track},
        registry::SessionRegistry,
        session::{Enqueued, Session, SessionSettings, SessionState},
        ChannelId, SessionKey,
    },
    config::Config,
    error::{InvalidCommand, PlayerError, PlayerResult},
    events::{EventBus, PlayerEvent},
    sink::SinkProvider,
};

/// Entry point for command handlers and sink/platform callbacks.
///
/// Cloning is cheap; every clone shares the same sessions.
#[derive(Clone)]
pub struct AudioPlayer {
    registry: Arc<SessionRegistry>,
    sinks: Arc<dyn SinkProvider>,
    events: EventBus,
    settings: SessionSettings,
    sweep_interval: Duration,
}

impl AudioPlayer {
    pub fn new(config: &Config, sinks: Arc<dyn SinkProvider>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            sinks,
            events: EventBus::new(config.event_buffer),
            settings: SessionSettings {
                idle_timeout: config.idle_timeout,
                default_volume: config.default_volume,
                clear_mode: config.clear_mode(),
            },
            sweep_interval: config.sweep_interval,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Agrega un track a la cola del guild, creando la sesión si hace falta
    pub fn enqueue(&self, key: SessionKey, channel: ChannelId, track: Track) -> PlayerResult<Enqueued> {
        loop {
            let session = self.session_or_create(key);
            match session.enqueue(channel, track.clone()) {
                // la sesión fue retirada entre la búsqueda y el lock
                Err(PlayerError::InvalidCommand(InvalidCommand::NoSession)) => {
                    self.registry.remove_if_same(key, &session);
                }
                result => return result,
            }
        }
    }

    pub fn skip(&self, key: SessionKey) -> PlayerResult<Track> {
        self.session(key)?.skip()
    }

    pub fn pause(&self, key: SessionKey) -> PlayerResult<()> {
        self.session(key)?.pause()
    }

    pub fn resume(&self, key: SessionKey) -> PlayerResult<()> {
        self.session(key)?.resume()
    }

    pub fn clear(&self, key: SessionKey) -> PlayerResult<()> {
        self.session(key)?.clear()
    }

    pub fn set_volume(&self, key: SessionKey, volume: i32) -> PlayerResult<u8> {
        if !(0..=100).contains(&volume) {
            return Err(InvalidCommand::VolumeOutOfRange(volume).into());
        }
        self.session_or_create(key).set_volume(volume)
    }

    pub fn set_loop(&self, key: SessionKey, enabled: bool) {
        self.session_or_create(key).set_loop(enabled);
    }

    pub fn toggle_loop(&self, key: SessionKey) -> bool {
        self.session_or_create(key).toggle_loop()
    }

    pub fn shuffle(&self, key: SessionKey) -> PlayerResult<usize> {
        Ok(self.session(key)?.shuffle())
    }

    /// Desconecta y elimina la sesión del guild
    pub fn disconnect(&self, key: SessionKey) -> PlayerResult<()> {
        let session = self.session(key)?;
        let result = session.disconnect();
        self.registry.remove_if_same(key, &session);
        result
    }

    pub fn notify_track_ended(&self, key: SessionKey, failure: Option<String>) {
        match self.registry.get(key) {
            Some(session) => session.notify_track_ended(failure),
            None => debug!("Fin de pista para guild {} sin sesión", key),
        }
    }

    pub fn notify_membership_changed(&self, key: SessionKey, members: usize) {
        match self.registry.get(key) {
            Some(session) => session.notify_membership_changed(members),
            None => debug!("Cambio de miembros para guild {} sin sesión", key),
        }
    }

    pub fn notify_sink_disconnected(&self, key: SessionKey) {
        if let Some(session) = self.registry.get(key) {
            session.notify_sink_disconnected();
        }
    }

    pub fn snapshot(&self, key: SessionKey) -> Option<QueueInfo> {
        self.registry.get(key).map(|session| session.snapshot())
    }

    pub fn state(&self, key: SessionKey) -> Option<SessionState> {
        self.registry.get(key).map(|session| session.state())
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Revisa todas las sesiones (miembros, avances trabados, watchdog)
    pub fn sweep(&self) {
        if self.registry.is_empty() {
            return;
        }
        let sessions = self.registry.sessions();
        debug!("🧹 Revisando {} sesiones", sessions.len());
        for session in sessions {
            session.sweep();
        }
    }

    /// Runs [`AudioPlayer::sweep`] on the configured interval until `shutdown` fires.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let player = self.clone();
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // el primer tick es inmediato
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("🧹 Revisión periódica detenida");
                        break;
                    }
                    _ = interval.tick() => player.sweep(),
                }
            }
        })
    }

    fn session(&self, key: SessionKey) -> PlayerResult<Arc<Session>> {
        self.registry
            .get(key)
            .ok_or_else(|| InvalidCommand::NoSession.into())
    }

    fn session_or_create(&self, key: SessionKey) -> Arc<Session> {
        self.registry.get_or_create(key, || {
            Session::new(
                key,
                self.sinks.sink_for(key),
                self.events.clone(),
                self.settings.clone(),
                Arc::downgrade(&self.registry),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::queue::PlayableRef,
        events::DisconnectReason,
        sink::{
            recording::{RecordingSink, SinkCall},
            AudioSink,
        },
    };
    use dashmap::DashMap;
    use pretty_assertions::assert_eq;

    const CHANNEL: ChannelId = ChannelId(1);

    struct Sinks(DashMap<SessionKey, Arc<RecordingSink>>);

    impl Sinks {
        fn get(&self, key: SessionKey) -> Arc<RecordingSink> {
            self.0.entry(key).or_default().clone()
        }
    }

    impl SinkProvider for Sinks {
        fn sink_for(&self, key: SessionKey) -> Arc<dyn AudioSink> {
            self.get(key)
        }
    }

    fn player() -> (AudioPlayer, Arc<Sinks>) {
        let sinks = Arc::new(Sinks(DashMap::new()));
        (AudioPlayer::new(&Config::default(), sinks.clone()), sinks)
    }

    fn track(title: &str) -> Track {
        Track::new(title, PlayableRef::new(title)).with_duration(Duration::from_secs(90))
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let (player, sinks) = player();
        player.enqueue(SessionKey(1), CHANNEL, track("a")).unwrap();
        player.enqueue(SessionKey(2), CHANNEL, track("b")).unwrap();

        player.pause(SessionKey(1)).unwrap();

        assert_eq!(player.state(SessionKey(1)), Some(SessionState::Paused));
        assert_eq!(player.state(SessionKey(2)), Some(SessionState::Playing));
        assert_eq!(sinks.get(SessionKey(2)).count(&SinkCall::Pause), 0);
        assert_eq!(player.session_count(), 2);
    }

    #[tokio::test]
    async fn test_commands_without_session_are_rejected() {
        let (player, _) = player();
        let key = SessionKey(9);

        assert_eq!(player.skip(key), Err(InvalidCommand::NoSession.into()));
        assert_eq!(player.pause(key), Err(InvalidCommand::NoSession.into()));
        assert_eq!(player.disconnect(key), Err(InvalidCommand::NoSession.into()));
        player.notify_track_ended(key, None);
        assert_eq!(player.session_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_volume_does_not_create_session() {
        let (player, _) = player();
        assert_eq!(
            player.set_volume(SessionKey(3), 150),
            Err(InvalidCommand::VolumeOutOfRange(150).into())
        );
        assert_eq!(player.session_count(), 0);

        assert_eq!(player.set_volume(SessionKey(3), 80), Ok(80));
        assert_eq!(player.snapshot(SessionKey(3)).map(|s| s.volume), Some(80));
    }

    #[tokio::test]
    async fn test_disconnect_removes_session_and_next_enqueue_recreates_it() {
        let (player, sinks) = player();
        let key = SessionKey(4);
        player.enqueue(key, CHANNEL, track("a")).unwrap();
        player.enqueue(key, CHANNEL, track("b")).unwrap();

        player.disconnect(key).unwrap();
        assert_eq!(player.session_count(), 0);
        assert_eq!(sinks.get(key).count(&SinkCall::Disconnect), 1);

        let outcome = player.enqueue(key, CHANNEL, track("c")).unwrap();
        assert_eq!(outcome, Enqueued::NowPlaying(track("c")));
        let info = player.snapshot(key).unwrap();
        assert!(info.items.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_keeps_every_track() {
        let (player, _) = player();
        let key = SessionKey(5);
        player.enqueue(key, CHANNEL, track("first")).unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let player = player.clone();
                tokio::spawn(async move {
                    player
                        .enqueue(key, CHANNEL, track(&format!("t{i}")))
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let info = player.snapshot(key).unwrap();
        assert_eq!(info.total_items, 32);
        assert_eq!(info.current.map(|c| c.track.title), Some("first".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_removes_session_from_registry() {
        let (player, sinks) = player();
        let key = SessionKey(6);
        let mut events = player.subscribe();
        player.enqueue(key, CHANNEL, track("a")).unwrap();
        player.notify_membership_changed(key, 1);

        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(player.session_count(), 0);
        assert_eq!(sinks.get(key).count(&SinkCall::Disconnect), 1);
        let last = std::iter::from_fn(|| events.try_recv().ok()).last();
        assert_eq!(
            last,
            Some(PlayerEvent::AutoDisconnected {
                key,
                reason: DisconnectReason::NoListeners
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_picks_up_listener_count_from_sink() {
        let (player, sinks) = player();
        let key = SessionKey(8);
        player.enqueue(key, CHANNEL, track("a")).unwrap();
        sinks.get(key).set_listeners(Some(1));

        let shutdown = CancellationToken::new();
        let sweeper = player.spawn_sweeper(shutdown.clone());

        // barrido a los 5 min, desconexión 5 min después
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(player.session_count(), 1);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(player.session_count(), 0);

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_sink_disconnect_notice_keeps_session_idle() {
        let (player, sinks) = player();
        let key = SessionKey(10);
        player.enqueue(key, CHANNEL, track("a")).unwrap();
        player.enqueue(key, CHANNEL, track("b")).unwrap();

        sinks.get(key).drop_connection();
        player.notify_sink_disconnected(key);

        assert_eq!(player.state(key), Some(SessionState::Idle));
        assert_eq!(player.snapshot(key).map(|s| s.total_items), Some(0));
        assert_eq!(player.session_count(), 1);
    }
}
