//! # Sink Module
//!
//! The audio output side of a session. The playback core never talks to a
//! voice gateway directly: it instructs an [`AudioSink`] and learns about the
//! outcome later through [`AudioPlayer::notify_track_ended`] and friends.
//!
//! [`AudioPlayer::notify_track_ended`]: crate::audio::player::AudioPlayer::notify_track_ended

use std::sync::Arc;
use thiserror::Error;

use crate::audio::{queue::Track, ChannelId, SessionKey};

#[cfg(test)]
pub(crate) mod recording;
pub mod simulated;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Error al conectar al canal de voz: {0}")]
    Connection(String),

    #[error("Error al iniciar la reproducción: {0}")]
    Playback(String),
}

/// Audio output for one session.
///
/// Every method is a non-blocking request. Implementations must report
/// completion (a track ending, a stream failing mid-way) asynchronously
/// through the player and never re-enter it from inside one of these calls:
/// the session lock is held while they run.
#[cfg_attr(test, mockall::automock)]
pub trait AudioSink: Send + Sync {
    fn connect(&self, channel: ChannelId) -> Result<(), SinkError>;

    fn play(&self, track: &Track, volume: u8) -> Result<(), SinkError>;

    fn pause(&self);

    fn resume(&self);

    /// Stops the current track. The sink reports the track end afterwards.
    fn stop(&self);

    /// Applies to the active stream immediately.
    fn set_volume(&self, volume: u8);

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Channel the sink is currently bound to, if any.
    fn channel(&self) -> Option<ChannelId>;

    fn is_playing(&self) -> bool;

    /// Members in the bound voice channel, bot included, when the sink can tell.
    fn listener_count(&self) -> Option<usize> {
        None
    }
}

/// Hands out the sink for a session when the session is created.
pub trait SinkProvider: Send + Sync {
    fn sink_for(&self, key: SessionKey) -> Arc<dyn AudioSink>;
}

impl<F> SinkProvider for F
where
    F: Fn(SessionKey) -> Arc<dyn AudioSink> + Send + Sync,
{
    fn sink_for(&self, key: SessionKey) -> Arc<dyn AudioSink> {
        self(key)
    }
}
