//! Notifications emitted by the playback core for the presentation layer.

use serde::Serialize;
use std::{fmt, time::Duration};
use tokio::sync::broadcast;
use tracing::trace;

use crate::audio::{queue::Track, SessionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisconnectReason {
    /// The bot was the only member left in the channel.
    NoListeners,
    /// Nothing was queued for the whole idle timeout.
    Inactivity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    TrackStarted { key: SessionKey, track: Track },
    TrackAdvanced { key: SessionKey, track: Track },
    QueueEmptied { key: SessionKey },
    AutoDisconnected { key: SessionKey, reason: DisconnectReason },
    PlaybackError {
        key: SessionKey,
        track: Option<Track>,
        message: String,
    },
}

impl PlayerEvent {
    pub fn key(&self) -> SessionKey {
        match self {
            Self::TrackStarted { key, .. }
            | Self::TrackAdvanced { key, .. }
            | Self::QueueEmptied { key }
            | Self::AutoDisconnected { key, .. }
            | Self::PlaybackError { key, .. } => *key,
        }
    }
}

impl fmt::Display for PlayerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrackStarted { track, .. } => {
                write!(f, "🎵 Reproduciendo Ahora: {}", describe(track))
            }
            Self::TrackAdvanced { track, .. } => {
                write!(f, "⏭️ Siguiente track: {}", describe(track))
            }
            Self::QueueEmptied { .. } => f.write_str("📭 La cola terminó"),
            Self::AutoDisconnected { reason, .. } => match reason {
                DisconnectReason::NoListeners => {
                    f.write_str("👋 Desconectado: no queda nadie en el canal")
                }
                DisconnectReason::Inactivity => f.write_str("👋 Desconectado por inactividad"),
            },
            Self::PlaybackError {
                track: Some(track),
                message,
                ..
            } => write!(f, "❌ Error con '{}': {}", track.title, message),
            Self::PlaybackError {
                track: None,
                message,
                ..
            } => write!(f, "❌ Error: {}", message),
        }
    }
}

fn describe(track: &Track) -> String {
    let author = track.author.as_deref().unwrap_or("Desconocido");
    match track.duration {
        Some(duration) => format!("{} - {} [{}]", track.title, author, format_duration(duration)),
        None => format!("{} - {} [🔴 En vivo]", track.title, author),
    }
}

/// Formatea una duración como mm:ss (o h:mm:ss)
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Fan-out of [`PlayerEvent`]s to every subscriber.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    /// Never blocks; events with no subscriber are dropped.
    pub fn emit(&self, event: PlayerEvent) {
        if self.sender.send(event).is_err() {
            trace!("evento descartado, sin suscriptores");
        }
    }
}
