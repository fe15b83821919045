//! Session Controller: the lifecycle of one guild's playback.
//!
//! Every command and sink notification is applied under the session's single
//! control lock, so a transition is never interleaved with another event for
//! the same guild. Sink instructions are fire-and-forget requests; their
//! outcome arrives later as another event.

use parking_lot::Mutex;
use serde::Serialize;
use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    queue::{ClearMode, QueueInfo, QueueStore, Track},
    registry::SessionRegistry,
    watchdog::IdleWatchdog,
    ChannelId, SessionKey,
};
use crate::{
    error::{InvalidCommand, PlayerError, PlayerResult},
    events::{DisconnectReason, EventBus, PlayerEvent},
    sink::{AudioSink, SinkError},
};

/// How long a session may sit in `AwaitingAdvance` with a silent sink before
/// the sweep advances it without the track-end report.
const STALL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Playing,
    Paused,
    AwaitingAdvance,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::AwaitingAdvance => "awaiting-advance",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Outcome of [`Session::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// The session was idle and the track went straight to the sink.
    NowPlaying(Track),
    /// 0-based position in the pending queue.
    Queued { position: usize },
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub default_volume: u8,
    pub clear_mode: ClearMode,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            default_volume: 50,
            clear_mode: ClearMode::KeepLoop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Start,
    Advance,
}

enum Advanced {
    Playing(Track),
    Exhausted { last_failure: Option<(Track, SinkError)> },
    LostConnection,
}

struct Control {
    state: SessionState,
    members: Option<usize>,
    watchdog: IdleWatchdog,
    awaiting_since: Option<Instant>,
    /// Track-end reports still owed by the sink for tracks the session stopped.
    pending_stops: usize,
    /// Set once the session is torn down; it is gone from the registry.
    retired: bool,
}

impl Control {
    fn set_state(&mut self, state: SessionState) {
        self.awaiting_since = (state == SessionState::AwaitingAdvance).then(Instant::now);
        self.state = state;
    }
}

pub struct Session {
    key: SessionKey,
    queue: QueueStore,
    sink: Arc<dyn AudioSink>,
    events: EventBus,
    clear_mode: ClearMode,
    registry: Weak<SessionRegistry>,
    control: Mutex<Control>,
}

impl Session {
    pub fn new(
        key: SessionKey,
        sink: Arc<dyn AudioSink>,
        events: EventBus,
        settings: SessionSettings,
        registry: Weak<SessionRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key,
            queue: QueueStore::new(settings.default_volume),
            sink,
            events,
            clear_mode: settings.clear_mode,
            registry,
            control: Mutex::new(Control {
                state: SessionState::Idle,
                members: None,
                watchdog: IdleWatchdog::new(settings.idle_timeout),
                awaiting_since: None,
                pending_stops: 0,
                retired: false,
            }),
        })
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn state(&self) -> SessionState {
        self.control.lock().state
    }

    pub fn snapshot(&self) -> QueueInfo {
        self.queue.snapshot()
    }

    pub fn members(&self) -> Option<usize> {
        self.control.lock().members
    }

    pub fn is_watchdog_armed(&self) -> bool {
        self.control.lock().watchdog.is_armed()
    }

    pub fn is_retired(&self) -> bool {
        self.control.lock().retired
    }

    /// Agrega un track; si la sesión está inactiva empieza a reproducir
    pub fn enqueue(self: &Arc<Self>, channel: ChannelId, track: Track) -> PlayerResult<Enqueued> {
        let mut control = self.control.lock();
        if control.retired {
            return Err(InvalidCommand::NoSession.into());
        }

        let result = match control.state {
            SessionState::Idle if self.sink.is_playing() => {
                warn!(
                    "⚠️ Guild {} inactiva pero el sink sigue reproduciendo, solo se encola",
                    self.key
                );
                Ok(Enqueued::Queued {
                    position: self.queue.enqueue(track),
                })
            }
            SessionState::Idle => {
                self.queue.enqueue(track);
                self.start(&mut control, channel)
            }
            SessionState::Playing | SessionState::Paused | SessionState::AwaitingAdvance => {
                Ok(Enqueued::Queued {
                    position: self.queue.enqueue(track),
                })
            }
            SessionState::Disconnecting => Err(InvalidCommand::NoSession.into()),
        };

        self.reevaluate_idle(&mut control, false);
        self.assert_invariants(&control);
        result
    }

    /// Salta el track actual; el fin de pista del sink dispara el siguiente
    pub fn skip(self: &Arc<Self>) -> PlayerResult<Track> {
        let mut control = self.control.lock();
        match control.state {
            SessionState::Playing | SessionState::Paused => {
                // sin current el loop no puede repetir lo que se saltó
                let skipped = self.queue.discard_current();
                self.stop_sink(&mut control);
                control.set_state(SessionState::AwaitingAdvance);
                info!("⏭️ Saltando track en guild {}", self.key);
                self.assert_invariants(&control);
                skipped.ok_or_else(|| {
                    PlayerError::ConcurrencyViolation(format!(
                        "guild {} reproducía sin track actual",
                        self.key
                    ))
                })
            }
            _ => Err(InvalidCommand::NothingPlaying.into()),
        }
    }

    pub fn pause(self: &Arc<Self>) -> PlayerResult<()> {
        let mut control = self.control.lock();
        match control.state {
            SessionState::Playing => {
                self.sink.pause();
                control.set_state(SessionState::Paused);
                info!("⏸️ Reproducción pausada en guild {}", self.key);
                Ok(())
            }
            SessionState::Paused => Err(InvalidCommand::AlreadyPaused.into()),
            _ => Err(InvalidCommand::NothingPlaying.into()),
        }
    }

    pub fn resume(self: &Arc<Self>) -> PlayerResult<()> {
        let mut control = self.control.lock();
        match control.state {
            SessionState::Paused => {
                self.sink.resume();
                control.set_state(SessionState::Playing);
                info!("▶️ Reproducción reanudada en guild {}", self.key);
                Ok(())
            }
            _ => Err(InvalidCommand::NotPaused.into()),
        }
    }

    /// Limpia la cola y detiene lo que esté sonando
    pub fn clear(self: &Arc<Self>) -> PlayerResult<()> {
        let mut control = self.control.lock();
        if control.retired {
            return Err(InvalidCommand::NoSession.into());
        }
        if self.queue.is_empty() {
            return Err(InvalidCommand::QueueEmpty.into());
        }

        let was_active = matches!(
            control.state,
            SessionState::Playing | SessionState::Paused | SessionState::AwaitingAdvance
        );
        self.queue.clear(self.clear_mode);
        control.set_state(SessionState::Idle);
        if was_active {
            self.stop_sink(&mut control);
        }
        self.events.emit(PlayerEvent::QueueEmptied { key: self.key });

        self.reevaluate_idle(&mut control, false);
        self.assert_invariants(&control);
        Ok(())
    }

    /// Ajusta el volumen (0-100) y lo aplica al stream activo
    pub fn set_volume(self: &Arc<Self>, volume: i32) -> PlayerResult<u8> {
        let control = self.control.lock();
        let volume = u8::try_from(volume)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or(InvalidCommand::VolumeOutOfRange(volume))?;

        self.queue.set_volume(volume);
        if matches!(control.state, SessionState::Playing | SessionState::Paused) {
            self.sink.set_volume(volume);
        }
        info!("🔊 Volumen ajustado a {}% en guild {}", volume, self.key);
        Ok(volume)
    }

    pub fn set_loop(self: &Arc<Self>, enabled: bool) {
        let _control = self.control.lock();
        self.queue.set_loop(enabled);
    }

    pub fn toggle_loop(self: &Arc<Self>) -> bool {
        let _control = self.control.lock();
        self.queue.toggle_loop()
    }

    /// Returns the number of pending tracks that were shuffled.
    pub fn shuffle(self: &Arc<Self>) -> usize {
        let _control = self.control.lock();
        self.queue.shuffle()
    }

    /// Desconecta el sink y retira la sesión
    pub fn disconnect(self: &Arc<Self>) -> PlayerResult<()> {
        let mut control = self.control.lock();
        if control.retired {
            return Err(InvalidCommand::NoSession.into());
        }
        self.teardown(&mut control);
        info!("👋 Desconectado del canal de voz en guild {}", self.key);
        Ok(())
    }

    /// Reported by the sink when a track finished, failed, or was stopped.
    pub fn notify_track_ended(self: &Arc<Self>, failure: Option<String>) {
        let mut control = self.control.lock();
        if control.retired {
            return;
        }

        if control.pending_stops > 0 {
            control.pending_stops -= 1;
            // un track nuevo ya suena: el aviso es del track detenido antes
            if control.state != SessionState::AwaitingAdvance && self.sink.is_playing() {
                debug!(
                    "Fin de pista tardío ignorado en guild {} (estado {})",
                    self.key, control.state
                );
                return;
            }
        }

        match control.state {
            SessionState::Playing | SessionState::Paused | SessionState::AwaitingAdvance => {
                control.set_state(SessionState::AwaitingAdvance);
                if let Some(reason) = failure {
                    // un track fallido no se reintenta, ni siquiera con loop
                    let failed = self.queue.discard_current();
                    error!(
                        "❌ Fallo en track de guild {}: {}",
                        self.key, reason
                    );
                    self.events.emit(PlayerEvent::PlaybackError {
                        key: self.key,
                        track: failed,
                        message: reason,
                    });
                }
                self.dispatch_next(&mut control, Dispatch::Advance);
            }
            SessionState::Idle | SessionState::Disconnecting => {
                debug!(
                    "Fin de pista ignorado en guild {} (estado {})",
                    self.key, control.state
                );
            }
        }

        self.reevaluate_idle(&mut control, false);
        self.assert_invariants(&control);
    }

    /// Members left in the voice channel, bot included.
    pub fn notify_membership_changed(self: &Arc<Self>, members: usize) {
        let mut control = self.control.lock();
        if control.retired {
            return;
        }
        debug!("👥 Guild {}: {} miembros en el canal", self.key, members);
        control.members = Some(members);
        self.reevaluate_idle(&mut control, true);
    }

    /// The sink lost its voice connection on its own (kicked, channel deleted).
    pub fn notify_sink_disconnected(self: &Arc<Self>) {
        let mut control = self.control.lock();
        if control.retired {
            return;
        }
        warn!("🔌 Bot desconectado en guild {}", self.key);
        self.lose_connection(&mut control, "el bot fue desconectado del canal");
        self.reevaluate_idle(&mut control, false);
        self.assert_invariants(&control);
    }

    /// Periodic fallback: refreshes the member count, recovers a stalled
    /// advance and re-evaluates the watchdog.
    pub fn sweep(self: &Arc<Self>) {
        let mut control = self.control.lock();
        if control.retired {
            return;
        }

        if let Some(members) = self.sink.listener_count() {
            control.members = Some(members);
        }

        let stalled = control.state == SessionState::AwaitingAdvance
            && !self.sink.is_playing()
            && control
                .awaiting_since
                .is_some_and(|since| since.elapsed() >= STALL_GRACE);
        if stalled {
            warn!(
                "⚠️ Guild {} esperaba fin de pista que nunca llegó, avanzando",
                self.key
            );
            self.dispatch_next(&mut control, Dispatch::Advance);
        }

        self.reevaluate_idle(&mut control, false);
        self.assert_invariants(&control);
    }

    /// Consistency check of the session invariants.
    pub fn check_invariants(&self) -> PlayerResult<()> {
        let control = self.control.lock();
        self.invariants(&control)
    }

    fn start(self: &Arc<Self>, control: &mut Control, channel: ChannelId) -> PlayerResult<Enqueued> {
        if self.sink.channel() != Some(channel) || !self.sink.is_connected() {
            if let Err(e) = self.sink.connect(channel) {
                error!("❌ Error al conectar en guild {}: {}", self.key, e);
                let reason = e.to_string();
                self.queue.clear(self.clear_mode);
                control.set_state(SessionState::Idle);
                self.events.emit(PlayerEvent::PlaybackError {
                    key: self.key,
                    track: None,
                    message: reason.clone(),
                });
                return Err(PlayerError::SinkDisconnected { reason });
            }
            info!("🔊 Conectado al canal {} en guild {}", channel, self.key);
        }

        match self.dispatch_next(control, Dispatch::Start) {
            Advanced::Playing(track) => Ok(Enqueued::NowPlaying(track)),
            Advanced::Exhausted {
                last_failure: Some((track, e)),
            } => Err(PlayerError::Resolution {
                title: track.title,
                reason: e.to_string(),
            }),
            Advanced::Exhausted { last_failure: None } => Err(InvalidCommand::QueueEmpty.into()),
            Advanced::LostConnection => Err(PlayerError::SinkDisconnected {
                reason: "sin conexión de voz".to_string(),
            }),
        }
    }

    /// The single place where the next track is chosen and handed to the sink.
    fn dispatch_next(&self, control: &mut Control, origin: Dispatch) -> Advanced {
        control.set_state(SessionState::AwaitingAdvance);
        let mut last_failure = None;

        loop {
            if !self.sink.is_connected() {
                self.lose_connection(control, "sin conexión de voz al avanzar la cola");
                return Advanced::LostConnection;
            }

            let Some(track) = self.queue.advance() else {
                control.set_state(SessionState::Idle);
                info!("📭 Cola terminada en guild {}", self.key);
                self.events.emit(PlayerEvent::QueueEmptied { key: self.key });
                return Advanced::Exhausted { last_failure };
            };

            match self.sink.play(&track, self.queue.volume()) {
                Ok(()) => {
                    control.set_state(SessionState::Playing);
                    info!("🎵 Reproduciendo en guild {}: {}", self.key, track.title);
                    let event = match origin {
                        Dispatch::Start => PlayerEvent::TrackStarted {
                            key: self.key,
                            track: track.clone(),
                        },
                        Dispatch::Advance => PlayerEvent::TrackAdvanced {
                            key: self.key,
                            track: track.clone(),
                        },
                    };
                    self.events.emit(event);
                    return Advanced::Playing(track);
                }
                Err(e) => {
                    error!(
                        "❌ No se pudo reproducir '{}' en guild {}: {}",
                        track.title, self.key, e
                    );
                    self.events.emit(PlayerEvent::PlaybackError {
                        key: self.key,
                        track: Some(track.clone()),
                        message: e.to_string(),
                    });
                    self.queue.discard_current();
                    last_failure = Some((track, e));
                }
            }
        }
    }

    /// The sink answers a stop of a live track with one track-end report.
    fn stop_sink(&self, control: &mut Control) {
        if self.sink.is_playing() {
            control.pending_stops += 1;
        }
        self.sink.stop();
    }

    fn lose_connection(&self, control: &mut Control, reason: &str) {
        warn!("🔌 Conexión perdida en guild {}: {}", self.key, reason);
        self.queue.clear(self.clear_mode);
        control.set_state(SessionState::Idle);
        self.events.emit(PlayerEvent::PlaybackError {
            key: self.key,
            track: None,
            message: PlayerError::SinkDisconnected {
                reason: reason.to_string(),
            }
            .to_string(),
        });
    }

    fn teardown(&self, control: &mut Control) {
        control.watchdog.cancel();
        control.set_state(SessionState::Disconnecting);
        self.sink.disconnect();
        self.queue.clear(self.clear_mode);
        control.set_state(SessionState::Idle);
        control.pending_stops = 0;
        control.retired = true;
    }

    /// Arms the watchdog while the channel is empty (or, with no member
    /// count known, while idle) and cancels it otherwise. `rearm` restarts a
    /// pending timer instead of keeping its deadline.
    fn reevaluate_idle(self: &Arc<Self>, control: &mut Control, rearm: bool) {
        if control.retired {
            return;
        }

        let should_arm = match control.members {
            Some(members) => members <= 1,
            None => control.state == SessionState::Idle,
        };

        if should_arm {
            if rearm || !control.watchdog.is_armed() {
                let session = Arc::downgrade(self);
                control.watchdog.arm(move |generation| {
                    if let Some(session) = session.upgrade() {
                        session.on_watchdog_fired(generation);
                    }
                });
                info!(
                    "🚪 Programando auto-desconexión en guild {} ({})",
                    self.key,
                    humantime::format_duration(control.watchdog.delay())
                );
            }
        } else if control.watchdog.cancel() {
            debug!("Auto-desconexión cancelada en guild {}", self.key);
        }
    }

    fn on_watchdog_fired(self: &Arc<Self>, generation: u64) -> Option<DisconnectReason> {
        let reason = {
            let mut control = self.control.lock();
            if control.retired || !control.watchdog.claim(generation) {
                return None;
            }

            if let Some(members) = self.sink.listener_count() {
                control.members = Some(members);
            }

            let reason = match control.members {
                Some(members) if members > 1 => {
                    debug!("Guild {} tiene oyentes, se mantiene la conexión", self.key);
                    return None;
                }
                Some(_) => DisconnectReason::NoListeners,
                None if control.state == SessionState::Idle => DisconnectReason::Inactivity,
                None => return None,
            };

            info!("🚪 Auto-desconexión en guild {} ({:?})", self.key, reason);
            self.teardown(&mut control);
            reason
        };

        self.events.emit(PlayerEvent::AutoDisconnected {
            key: self.key,
            reason,
        });
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if_same(self.key, self);
        }
        Some(reason)
    }

    fn invariants(&self, control: &Control) -> PlayerResult<()> {
        if matches!(control.state, SessionState::Playing | SessionState::Paused)
            && !self.queue.has_current()
        {
            return Err(PlayerError::ConcurrencyViolation(format!(
                "guild {} en estado {} sin track actual",
                self.key, control.state
            )));
        }
        if control.retired && control.watchdog.is_armed() {
            return Err(PlayerError::ConcurrencyViolation(format!(
                "guild {} retirada con watchdog armado",
                self.key
            )));
        }
        Ok(())
    }

    fn assert_invariants(&self, control: &Control) {
        if let Err(e) = self.invariants(control) {
            error!("🚨 {}", e);
            debug_assert!(false, "{e}");
        }
    }
}
