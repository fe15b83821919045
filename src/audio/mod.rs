//! # Audio Module
//!
//! Per-guild playback core for Open Music Bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Store
//! - Pending tracks, the now-playing slot, volume and loop flag
//! - One lock per store; snapshots never see a half-applied mutation
//!
//! ### [`session`] - Session Controller
//! - Lifecycle state machine (`Idle`, `Playing`, `Paused`, `AwaitingAdvance`, `Disconnecting`)
//! - Issues play/stop/disconnect instructions to the [`AudioSink`](crate::sink::AudioSink)
//! - Funnels every track end through a single advance step
//!
//! ### [`watchdog`] - Idle Watchdog
//! - One cancellable, re-armable disconnect timer per session
//!
//! ### [`registry`] / [`player`]
//! - Concurrent guild → session map with explicit creation and removal
//! - [`AudioPlayer`](player::AudioPlayer), the entry point used by command handlers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_queue::audio::{player::AudioPlayer, queue::{PlayableRef, Track}, ChannelId, SessionKey};
//! use open_music_queue::config::Config;
//! use open_music_queue::sink::SinkProvider;
//! use std::sync::Arc;
//!
//! # async fn example(sinks: Arc<dyn SinkProvider>) -> anyhow::Result<()> {
//! let player = AudioPlayer::new(&Config::default(), sinks);
//! let guild = SessionKey(123456789);
//!
//! let track = Track::new("Song", PlayableRef::new("https://example.com/song.mp3"));
//! player.enqueue(guild, ChannelId(42), track)?;
//! player.pause(guild)?;
//! player.resume(guild)?;
//! player.skip(guild)?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod watchdog;

/// Identifies one voice group (a guild).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(pub u64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A voice channel the sink can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
