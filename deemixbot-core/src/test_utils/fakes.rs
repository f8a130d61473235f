// File: deemixbot-core/src/test_utils/fakes.rs
//
// In-memory stand-ins for the catalog, downloader, voice gateway and chat, used by
// the unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};
use twilight_model::id::Id;

use deemixbot_common::error::Error;
use deemixbot_common::models::{SearchedTrack, StagedAudio, Track};
use deemixbot_common::traits::{
    ActiveStream, AudioFetcher, Notifier, StreamControl, TrackResolver, VoiceConnection,
    VoiceTransport,
};

use crate::playback::PlaybackContext;

/// Polls `cond` every 10ms for up to two seconds.
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub fn track(name: &str) -> Track {
    Track::new(name, "Fake Artist", format!("https://www.deezer.com/track/{name}"))
}

/// Resolves any text to a track named after it, except the texts marked missing.
#[derive(Default)]
pub struct FakeResolver {
    missing: Mutex<HashSet<String>>,
    hits: Mutex<Vec<SearchedTrack>>,
}

impl FakeResolver {
    pub fn mark_missing(&self, text: &str) {
        self.missing.lock().insert(text.to_string());
    }

    pub fn set_hits(&self, hits: Vec<SearchedTrack>) {
        *self.hits.lock() = hits;
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, text: &str) -> Result<Track, Error> {
        if self.missing.lock().contains(text) {
            return Err(Error::NotFound(format!("no track for '{text}'")));
        }
        Ok(track(text))
    }

    async fn search(&self, _keyword: &str, limit: usize) -> Result<Vec<SearchedTrack>, Error> {
        Ok(self.hits.lock().iter().take(limit).cloned().collect())
    }
}

/// Writes a tiny file into a fresh staging directory per fetch.
#[derive(Default)]
pub struct FakeFetcher {
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    fetched: Mutex<Vec<String>>,
    staging_dirs: Mutex<Vec<PathBuf>>,
    cancelled: AtomicUsize,
}

impl FakeFetcher {
    pub fn fail(&self, source: &str) {
        self.failing.lock().insert(source.to_string());
    }

    /// The fetch for `source` only returns once cancelled.
    pub fn hang(&self, source: &str) {
        self.hanging.lock().insert(source.to_string());
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    pub fn staging_dirs(&self) -> Vec<PathBuf> {
        self.staging_dirs.lock().clone()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
    async fn fetch(&self, source: &str, cancel: CancellationToken) -> Result<StagedAudio, Error> {
        self.fetched.lock().push(source.to_string());
        if self.hanging.lock().contains(source) {
            cancel.cancelled().await;
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Cancelled);
        }
        if self.failing.lock().contains(source) {
            return Err(Error::Fetch(format!("deemix exited with status 1 for {source}")));
        }
        let dir = tempfile::Builder::new().prefix("deemix").tempdir()?;
        let file = dir.path().join("track.mp3");
        std::fs::write(&file, b"ID3")?;
        self.staging_dirs.lock().push(dir.path().to_path_buf());
        Ok(StagedAudio::new(file, dir))
    }
}

#[derive(Default)]
pub struct FakeStreamControl {
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl FakeStreamControl {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl StreamControl for FakeStreamControl {
    fn set_paused(&self, paused: bool) -> Result<(), Error> {
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct StreamRecord {
    path: PathBuf,
    control: Arc<FakeStreamControl>,
    done: Option<oneshot::Sender<Result<(), Error>>>,
}

#[derive(Default)]
struct VoiceState {
    fail_join: bool,
    fail_stream: bool,
    join_delay: Option<Duration>,
    join_attempts: usize,
    joins: Vec<(Id<GuildMarker>, Id<ChannelMarker>)>,
    leaves: usize,
    leave_gate: Option<oneshot::Receiver<()>>,
    streams: Vec<StreamRecord>,
}

/// Voice gateway whose streams only end when the test says so.
#[derive(Clone, Default)]
pub struct FakeVoice {
    state: Arc<Mutex<VoiceState>>,
}

impl FakeVoice {
    pub fn failing_join() -> Self {
        let voice = Self::default();
        voice.state.lock().fail_join = true;
        voice
    }

    pub fn fail_streams(&self) {
        self.state.lock().fail_stream = true;
    }

    /// Every join takes `delay` before it connects.
    pub fn delay_joins(&self, delay: Duration) {
        self.state.lock().join_delay = Some(delay);
    }

    /// The next `leave` blocks until the returned sender fires or is dropped.
    pub fn hold_next_leave(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().leave_gate = Some(rx);
        tx
    }

    /// Joins started, connected or not.
    pub fn join_attempts(&self) -> usize {
        self.state.lock().join_attempts
    }

    pub fn joins(&self) -> usize {
        self.state.lock().joins.len()
    }

    pub fn joined(&self) -> Vec<(Id<GuildMarker>, Id<ChannelMarker>)> {
        self.state.lock().joins.clone()
    }

    pub fn leaves(&self) -> usize {
        self.state.lock().leaves
    }

    pub fn stream_count(&self) -> usize {
        self.state.lock().streams.len()
    }

    pub fn stream_path(&self, index: usize) -> Option<PathBuf> {
        self.state.lock().streams.get(index).map(|s| s.path.clone())
    }

    pub fn control(&self, index: usize) -> Option<Arc<FakeStreamControl>> {
        self.state.lock().streams.get(index).map(|s| s.control.clone())
    }

    /// Ends stream `index` normally.
    pub fn finish_stream(&self, index: usize) -> bool {
        self.complete(index, Ok(()))
    }

    /// Ends stream `index` with a transport error.
    pub fn break_stream(&self, index: usize) -> bool {
        self.complete(index, Err(Error::Transport("udp socket closed".into())))
    }

    fn complete(&self, index: usize, result: Result<(), Error>) -> bool {
        let sender = self
            .state
            .lock()
            .streams
            .get_mut(index)
            .and_then(|s| s.done.take());
        sender.is_some_and(|tx| tx.send(result).is_ok())
    }
}

#[async_trait]
impl VoiceTransport for FakeVoice {
    async fn join(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<Box<dyn VoiceConnection>, Error> {
        let delay = {
            let mut state = self.state.lock();
            state.join_attempts += 1;
            state.join_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.fail_join {
            return Err(Error::Join("voice server never answered".into()));
        }
        state.joins.push((guild_id, channel_id));
        Ok(Box::new(FakeConnection {
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<VoiceState>>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn stream(&mut self, audio: &StagedAudio) -> Result<ActiveStream, Error> {
        let mut state = self.state.lock();
        if state.fail_stream {
            return Err(Error::Fetch("unsupported codec".into()));
        }
        let (tx, rx) = oneshot::channel();
        let control = Arc::new(FakeStreamControl::default());
        state.streams.push(StreamRecord {
            path: audio.path().to_path_buf(),
            control: control.clone(),
            done: Some(tx),
        });
        Ok(ActiveStream { done: rx, control })
    }

    async fn leave(&mut self) -> Result<(), Error> {
        let gate = {
            let mut state = self.state.lock();
            state.leaves += 1;
            state.leave_gate.take()
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(())
    }
}

/// Collects every message per channel.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<HashMap<Id<ChannelMarker>, Vec<String>>>,
}

impl RecordingNotifier {
    pub fn messages(&self, channel: Id<ChannelMarker>) -> Vec<String> {
        self.messages.lock().get(&channel).cloned().unwrap_or_default()
    }

    pub fn any_contains(&self, channel: Id<ChannelMarker>, needle: &str) -> bool {
        self.messages(channel).iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel_id: Id<ChannelMarker>, text: &str) -> Result<(), Error> {
        self.messages
            .lock()
            .entry(channel_id)
            .or_default()
            .push(text.to_string());
        Ok(())
    }
}

/// A full set of fakes wired into a `PlaybackContext`.
pub struct FakePlayback {
    pub fetcher: Arc<FakeFetcher>,
    pub voice: FakeVoice,
    pub notifier: Arc<RecordingNotifier>,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self::with_voice(FakeVoice::default())
    }

    pub fn with_voice(voice: FakeVoice) -> Self {
        Self {
            fetcher: Arc::new(FakeFetcher::default()),
            voice,
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn context(&self) -> PlaybackContext {
        PlaybackContext {
            fetcher: self.fetcher.clone(),
            voice: Arc::new(self.voice.clone()),
            notifier: self.notifier.clone(),
        }
    }
}

impl Default for FakePlayback {
    fn default() -> Self {
        Self::new()
    }
}
