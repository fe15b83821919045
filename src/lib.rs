//! # Open Music Queue
//!
//! Per-guild playback core of Open Music Bot: the ordered track queue, the
//! session state machine that hands tracks to the voice sink, and the idle
//! watchdog that leaves empty channels.
//!
//! Command parsing, embeds, the Discord gateway and audio decoding live
//! outside this crate; they talk to it through [`audio::player::AudioPlayer`],
//! the [`sink::AudioSink`] trait and the [`events::PlayerEvent`] stream.

pub mod audio;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod sink;
