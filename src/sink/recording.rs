use parking_lot::Mutex;

use super::{AudioSink, SinkError};
use crate::audio::{queue::Track, ChannelId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Connect(ChannelId),
    Play(String, u8),
    Pause,
    Resume,
    Stop,
    SetVolume(u8),
    Disconnect,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<SinkCall>,
    channel: Option<ChannelId>,
    playing: bool,
    listeners: Option<usize>,
    failing_titles: Vec<String>,
    refuse_connect: bool,
}

/// In-memory sink that records every instruction it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    state: Mutex<State>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().calls.clone()
    }

    pub fn plays(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Play(title, _) => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &SinkCall) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| *call == wanted)
            .count()
    }

    pub fn fail_on(&self, title: &str) {
        self.state.lock().failing_titles.push(title.to_string());
    }

    pub fn refuse_connect(&self) {
        self.state.lock().refuse_connect = true;
    }

    pub fn set_listeners(&self, count: Option<usize>) {
        self.state.lock().listeners = count;
    }

    /// Simulates the bot being kicked from the channel.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock();
        state.channel = None;
        state.playing = false;
    }

    pub fn finish_track(&self) {
        self.state.lock().playing = false;
    }
}

impl AudioSink for RecordingSink {
    fn connect(&self, channel: ChannelId) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Connect(channel));
        if state.refuse_connect {
            return Err(SinkError::Connection("refused".into()));
        }
        state.channel = Some(channel);
        Ok(())
    }

    fn play(&self, track: &Track, volume: u8) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Play(track.title.clone(), volume));
        if state.failing_titles.contains(&track.title) {
            return Err(SinkError::Playback(format!("cannot open {}", track.title)));
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().calls.push(SinkCall::Pause);
    }

    fn resume(&self) {
        self.state.lock().calls.push(SinkCall::Resume);
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Stop);
        state.playing = false;
    }

    fn set_volume(&self, volume: u8) {
        self.state.lock().calls.push(SinkCall::SetVolume(volume));
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Disconnect);
        state.channel = None;
        state.playing = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().channel.is_some()
    }

    fn channel(&self) -> Option<ChannelId> {
        self.state.lock().channel
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn listener_count(&self) -> Option<usize> {
        self.state.lock().listeners
    }
}
