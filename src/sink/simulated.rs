//! Timer-driven sink used by the console binary.
//!
//! Nothing is decoded or streamed: a track "plays" for its duration and the
//! end is reported through a [`SinkNotice`] channel, just like a real voice
//! driver would report it from its own event loop.

use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info};

use super::{AudioSink, SinkError};
use crate::audio::{queue::Track, ChannelId, SessionKey};

/// Reports coming back from a sink, to be forwarded to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkNotice {
    TrackEnded {
        key: SessionKey,
        error: Option<String>,
    },
}

#[derive(Debug)]
struct Playback {
    title: String,
    generation: u64,
    /// `None` while paused or for live streams.
    ends_at: Option<Instant>,
    remaining: Option<Duration>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct SimState {
    channel: Option<ChannelId>,
    playback: Option<Playback>,
    volume: u8,
    generation: u64,
}

pub struct SimulatedSink {
    key: SessionKey,
    notices: mpsc::UnboundedSender<SinkNotice>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSink {
    pub fn new(key: SessionKey, notices: mpsc::UnboundedSender<SinkNotice>) -> Self {
        Self {
            key,
            notices,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Volume of the last play or live adjustment.
    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    fn start_timer(&self, generation: u64, after: Duration) -> JoinHandle<()> {
        let state = self.state.clone();
        let notices = self.notices.clone();
        let key = self.key;

        tokio::spawn(async move {
            tokio::time::sleep(after).await;

            // Solo notificar si la reproducción sigue siendo la misma
            let mut state = state.lock();
            let current = state
                .playback
                .as_ref()
                .is_some_and(|p| p.generation == generation);
            if current {
                if let Some(playback) = state.playback.take() {
                    debug!("⏹️ [sim] Terminó '{}' en guild {}", playback.title, key);
                }
                let _ = notices.send(SinkNotice::TrackEnded { key, error: None });
            }
        })
    }

    fn end_playback(&self, state: &mut SimState, notify: bool) {
        if let Some(playback) = state.playback.take() {
            if let Some(timer) = playback.timer {
                timer.abort();
            }
            if notify {
                let _ = self.notices.send(SinkNotice::TrackEnded {
                    key: self.key,
                    error: None,
                });
            }
        }
    }
}

impl AudioSink for SimulatedSink {
    fn connect(&self, channel: ChannelId) -> Result<(), SinkError> {
        self.state.lock().channel = Some(channel);
        info!("🔊 [sim] Conectado al canal {} en guild {}", channel, self.key);
        Ok(())
    }

    fn play(&self, track: &Track, volume: u8) -> Result<(), SinkError> {
        if track.source.as_str().is_empty() {
            return Err(SinkError::Playback("fuente vacía".to_string()));
        }

        let mut state = self.state.lock();
        if state.channel.is_none() {
            return Err(SinkError::Connection("no conectado".to_string()));
        }
        self.end_playback(&mut state, false);

        state.generation += 1;
        state.volume = volume;
        let generation = state.generation;
        let timer = track
            .duration
            .map(|duration| self.start_timer(generation, duration));

        state.playback = Some(Playback {
            title: track.title.clone(),
            generation,
            ends_at: track.duration.map(|d| Instant::now() + d),
            remaining: None,
            timer,
        });
        info!("🎵 [sim] Reproduciendo '{}' al {}%", track.title, volume);
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if let Some(playback) = state.playback.as_mut() {
            if let Some(timer) = playback.timer.take() {
                timer.abort();
            }
            if let Some(end) = playback.ends_at.take() {
                playback.remaining = Some(end.saturating_duration_since(Instant::now()));
            }
        }
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;

        let remaining = match state.playback.as_mut() {
            // sin pausa previa el timer en curso sigue siendo válido
            Some(playback) if playback.ends_at.is_some() => return,
            Some(playback) => {
                playback.generation = generation;
                playback.remaining.take()
            }
            None => return,
        };

        if let Some(remaining) = remaining {
            let timer = self.start_timer(generation, remaining);
            if let Some(playback) = state.playback.as_mut() {
                playback.ends_at = Some(Instant::now() + remaining);
                playback.timer = Some(timer);
            }
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        self.end_playback(&mut state, true);
    }

    fn set_volume(&self, volume: u8) {
        self.state.lock().volume = volume;
        debug!("🔊 [sim] Volumen en {}%", volume);
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        self.end_playback(&mut state, false);
        state.channel = None;
        info!("👋 [sim] Desconectado en guild {}", self.key);
    }

    fn is_connected(&self) -> bool {
        self.state.lock().channel.is_some()
    }

    fn channel(&self) -> Option<ChannelId> {
        self.state.lock().channel
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playback.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::PlayableRef;

    fn track(secs: u64) -> Track {
        Track::new("demo", PlayableRef::new("sim:demo")).with_duration(Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_end_is_reported_after_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SimulatedSink::new(SessionKey(1), tx);
        sink.connect(ChannelId(9)).unwrap();
        sink.play(&track(30), 50).unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(
            rx.try_recv().ok(),
            Some(SinkNotice::TrackEnded {
                key: SessionKey(1),
                error: None
            })
        );
        assert!(!sink.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_exactly_one_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SimulatedSink::new(SessionKey(1), tx);
        sink.connect(ChannelId(9)).unwrap();
        sink.play(&track(30), 50).unwrap();
        sink.set_volume(20);
        assert_eq!(sink.volume(), 20);

        sink.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_the_track() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SimulatedSink::new(SessionKey(1), tx);
        sink.connect(ChannelId(9)).unwrap();
        sink.play(&track(30), 50).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        sink.pause();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());

        sink.resume();
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_while_playing_keeps_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SimulatedSink::new(SessionKey(1), tx);
        sink.connect(ChannelId(9)).unwrap();
        sink.play(&track(30), 50).unwrap();

        sink.resume();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(rx.try_recv().is_ok());
        assert!(!sink.is_playing());
    }

    #[tokio::test]
    async fn test_play_requires_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = SimulatedSink::new(SessionKey(1), tx);
        assert!(matches!(
            sink.play(&track(5), 50),
            Err(SinkError::Connection(_))
        ));
    }
}
