// deemixbot-core/src/playback/session.rs

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{trace, warn};
use twilight_model::id::marker::{ChannelMarker, GuildMarker};
use twilight_model::id::Id;

use deemixbot_common::models::Track;
use deemixbot_common::traits::StreamControl;

/// Receiving ends of a session's control signals. Taken exactly once, by the driver.
///
/// Every signal is tagged with the session's enqueue count at send time. Signals
/// tagged at or below `floor` were aimed at a playback run that already ended and
/// are discarded on receipt.
pub struct PlaybackSignals {
    pub(crate) stop: UnboundedReceiver<u64>,
    pub(crate) skip: UnboundedReceiver<u64>,
    pub(crate) floor: u64,
}

impl PlaybackSignals {
    /// Consumes one live pending stop, if any.
    pub fn stop_pending(&mut self) -> bool {
        while let Ok(tag) = self.stop.try_recv() {
            if tag > self.floor {
                return true;
            }
        }
        false
    }

    /// Ignores every signal sent before the enqueue numbered `mark + 1`.
    pub fn discard_through(&mut self, mark: u64) {
        self.floor = self.floor.max(mark);
    }
}

/// Next signal on `rx` tagged above `floor`. `None` once every sender is gone.
pub(crate) async fn recv_live(rx: &mut UnboundedReceiver<u64>, floor: u64) -> Option<()> {
    loop {
        match rx.recv().await {
            Some(tag) if tag > floor => return Some(()),
            Some(_) => continue,
            None => return None,
        }
    }
}

struct SessionState {
    queue: VecDeque<Track>,
    /// Tracks ever pushed; tags the stop/skip signals.
    enqueued: u64,
    paused_since: Option<DateTime<Utc>>,
    stream: Option<Arc<dyn StreamControl>>,
}

/// Playback context of one guild: the queue, the stop/skip signals, and the
/// in-flight stream handle while something is streaming.
pub struct GuildSession {
    guild_id: Id<GuildMarker>,
    voice_channel: Id<ChannelMarker>,
    stop_tx: UnboundedSender<u64>,
    skip_tx: UnboundedSender<u64>,
    signals: Mutex<Option<PlaybackSignals>>,
    state: Mutex<SessionState>,
}

impl GuildSession {
    pub(crate) fn new(guild_id: Id<GuildMarker>, voice_channel: Id<ChannelMarker>) -> Self {
        let (stop_tx, stop_rx) = unbounded_channel();
        let (skip_tx, skip_rx) = unbounded_channel();
        Self {
            guild_id,
            voice_channel,
            stop_tx,
            skip_tx,
            signals: Mutex::new(Some(PlaybackSignals {
                stop: stop_rx,
                skip: skip_rx,
                floor: 0,
            })),
            state: Mutex::new(SessionState {
                queue: VecDeque::new(),
                enqueued: 0,
                paused_since: None,
                stream: None,
            }),
        }
    }

    pub fn guild_id(&self) -> Id<GuildMarker> {
        self.guild_id
    }

    pub fn voice_channel(&self) -> Id<ChannelMarker> {
        self.voice_channel
    }

    /// Never blocks. Harmless once the driver is gone.
    pub fn send_stop(&self) {
        let state = self.state.lock();
        if self.stop_tx.send(state.enqueued).is_err() {
            trace!("stop for guild {} delivered to nobody", self.guild_id);
        }
    }

    /// Never blocks. Harmless once the driver is gone.
    pub fn send_skip(&self) {
        let state = self.state.lock();
        if self.skip_tx.send(state.enqueued).is_err() {
            trace!("skip for guild {} delivered to nobody", self.guild_id);
        }
    }

    /// The head of the queue: the track playing or about to play.
    pub fn now_playing(&self) -> Option<Track> {
        self.state.lock().queue.front().cloned()
    }

    pub fn queue_snapshot(&self) -> Vec<Track> {
        self.state.lock().queue.iter().cloned().collect()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn paused_since(&self) -> Option<DateTime<Utc>> {
        self.state.lock().paused_since
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().stream.is_some()
    }

    /// Removes the queued (not playing) track at `index`, where index 1 is the first
    /// track after the head. Out-of-range indices leave the queue alone.
    pub fn remove_queued(&self, index: i64) -> bool {
        let mut state = self.state.lock();
        match usize::try_from(index) {
            Ok(i) if i > 0 && i < state.queue.len() => state.queue.remove(i).is_some(),
            _ => false,
        }
    }

    /// Drops the tail. With only the playing track left this becomes a stop.
    pub fn pop_last(&self) {
        let mut state = self.state.lock();
        if state.queue.len() > 1 {
            state.queue.pop_back();
            return;
        }
        drop(state);
        self.send_stop();
    }

    /// Pauses or resumes the live stream. Returns false when nothing is streaming.
    pub fn set_paused(&self, paused: bool) -> bool {
        self.set_paused_at(paused, Utc::now())
    }

    pub(crate) fn set_paused_at(&self, paused: bool, at: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        let Some(stream) = state.stream.clone() else {
            return false;
        };
        if let Err(e) = stream.set_paused(paused) {
            warn!("guild {}: could not set paused={paused}: {e}", self.guild_id);
        }
        state.paused_since = if paused { Some(at) } else { None };
        true
    }

    pub(crate) fn push_back(&self, track: Track) {
        let mut state = self.state.lock();
        state.queue.push_back(track);
        state.enqueued += 1;
    }

    /// Drops the finished head. Returns how many tracks remain and the enqueue
    /// count they were observed at.
    pub(crate) fn finish_head(&self) -> (usize, u64) {
        let mut state = self.state.lock();
        state.queue.pop_front();
        (state.queue.len(), state.enqueued)
    }

    /// Empties the queue and returns the enqueue count at that point.
    pub(crate) fn clear_queue(&self) -> u64 {
        let mut state = self.state.lock();
        state.queue.clear();
        state.enqueued
    }

    pub(crate) fn enqueued(&self) -> u64 {
        self.state.lock().enqueued
    }

    pub(crate) fn take_signals(&self) -> Option<PlaybackSignals> {
        self.signals.lock().take()
    }

    /// Registers the in-flight stream. The slot empties itself when the guard drops.
    pub(crate) fn install_stream(&self, control: Arc<dyn StreamControl>) -> StreamSlot<'_> {
        let mut state = self.state.lock();
        state.stream = Some(control);
        state.paused_since = None;
        StreamSlot { session: self }
    }

    pub(crate) fn clear_stream(&self) {
        let mut state = self.state.lock();
        state.stream = None;
        state.paused_since = None;
    }
}

pub(crate) struct StreamSlot<'a> {
    session: &'a GuildSession,
}

impl Drop for StreamSlot<'_> {
    fn drop(&mut self) {
        self.session.clear_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fakes::FakeStreamControl;

    fn session() -> GuildSession {
        GuildSession::new(Id::new(1), Id::new(10))
    }

    fn track(name: &str) -> Track {
        Track::new(name, "Artist", format!("https://www.deezer.com/track/{name}"))
    }

    #[test]
    fn remove_queued_rejects_head_and_out_of_range() {
        let s = session();
        for n in ["a", "b", "c"] {
            s.push_back(track(n));
        }
        assert!(!s.remove_queued(0));
        assert!(!s.remove_queued(3));
        assert!(!s.remove_queued(-2));
        assert!(s.remove_queued(1));
        let titles: Vec<_> = s.queue_snapshot().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["a", "c"]);
    }

    #[test]
    fn pop_last_on_single_track_sends_stop() {
        let s = session();
        s.push_back(track("a"));
        let mut signals = s.take_signals().unwrap();

        s.pop_last();
        assert_eq!(s.queue_len(), 1);
        assert!(signals.stop_pending());
    }

    #[test]
    fn signals_are_taken_once() {
        let s = session();
        assert!(s.take_signals().is_some());
        assert!(s.take_signals().is_none());
        // senders stay usable with nobody listening
        s.send_stop();
        s.send_skip();
    }

    #[test]
    fn stream_slot_clears_pause_state_on_drop() {
        let s = session();
        let control = Arc::new(FakeStreamControl::default());
        {
            let _slot = s.install_stream(control.clone());
            assert!(s.set_paused(true));
            assert!(control.is_paused());
            assert!(s.paused_since().is_some());
        }
        assert!(!s.is_streaming());
        assert!(s.paused_since().is_none());
        assert!(!s.set_paused(false));
    }

    #[test]
    fn signals_before_the_mark_are_discarded() {
        let s = session();
        s.push_back(track("a"));
        let mut signals = s.take_signals().unwrap();
        s.send_stop();
        s.send_stop();
        let mark = s.clear_queue();

        s.push_back(track("b"));
        s.send_stop();
        signals.discard_through(mark);
        assert!(signals.stop_pending());
        assert!(!signals.stop_pending());
    }

    #[tokio::test]
    async fn recv_live_skips_stale_tags() {
        let s = session();
        s.push_back(track("a"));
        let mut signals = s.take_signals().unwrap();
        s.send_skip();
        s.push_back(track("b"));
        s.send_skip();

        let floor = 1;
        assert_eq!(recv_live(&mut signals.skip, floor).await, Some(()));
        assert!(signals.skip.try_recv().is_err());
    }
}
