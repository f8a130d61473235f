use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info};
use twilight_model::id::marker::{ChannelMarker, GuildMarker};
use twilight_model::id::Id;

use deemixbot_common::models::Track;

use crate::playback::session::GuildSession;

/// Reply used when a guild has nothing queued.
pub const EMPTY_QUEUE_TEXT: &str = "Empty queue!";

/// All guilds that currently have a playback driver, keyed by guild.
///
/// Entries are created by the first `play` of a guild and removed only by that
/// guild's driver when it exits. The map lock is held just long enough to touch the
/// map; queue edits go through each session's own lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Id<GuildMarker>, Arc<GuildSession>>>,
    drained: Notify,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            drained: Notify::new(),
        }
    }

    /// Appends `track` to the guild's queue, creating the session first if needed.
    ///
    /// The returned flag is true only for a freshly created session; the caller must
    /// spawn exactly one playback driver in that case.
    pub fn enqueue_or_create(
        &self,
        guild_id: Id<GuildMarker>,
        voice_channel: Id<ChannelMarker>,
        track: Track,
    ) -> (Arc<GuildSession>, bool) {
        let mut sessions = self.sessions.write();
        let mut created = false;
        let session = sessions
            .entry(guild_id)
            .or_insert_with(|| {
                created = true;
                Arc::new(GuildSession::new(guild_id, voice_channel))
            })
            .clone();
        session.push_back(track);
        if created {
            info!("guild {guild_id}: new playback session in voice channel {voice_channel}");
        }
        (session, created)
    }

    /// Unconditionally forgets the guild. Returns whether an entry existed.
    pub fn remove(&self, guild_id: Id<GuildMarker>) -> bool {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(&guild_id).is_some();
        if sessions.is_empty() {
            self.drained.notify_waiters();
        }
        removed
    }

    /// Removes the entry only if it still belongs to `session`.
    pub(crate) fn remove_session(&self, session: &Arc<GuildSession>) -> bool {
        let mut sessions = self.sessions.write();
        let guild_id = session.guild_id();
        let ours = sessions
            .get(&guild_id)
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if ours {
            sessions.remove(&guild_id);
            if sessions.is_empty() {
                self.drained.notify_waiters();
            }
        }
        ours
    }

    /// Final step of a driver's teardown. Refuses (returns false) when tracks were
    /// enqueued while the driver was shutting down, so the driver can keep going.
    pub(crate) fn retire(&self, session: &Arc<GuildSession>) -> bool {
        let mut sessions = self.sessions.write();
        let guild_id = session.guild_id();
        let ours = sessions
            .get(&guild_id)
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if !ours {
            return true;
        }
        if session.queue_len() > 0 {
            return false;
        }
        sessions.remove(&guild_id);
        if sessions.is_empty() {
            self.drained.notify_waiters();
        }
        true
    }

    /// The session may be removed right after this returns; signalling it is still safe.
    pub fn lookup(&self, guild_id: Id<GuildMarker>) -> Option<Arc<GuildSession>> {
        self.sessions.read().get(&guild_id).cloned()
    }

    pub fn contains(&self, guild_id: Id<GuildMarker>) -> bool {
        self.sessions.read().contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Snapshot of every live session.
    pub fn sessions(&self) -> Vec<Arc<GuildSession>> {
        self.sessions.read().values().cloned().collect()
    }

    /// False when the guild has no session.
    pub fn signal_stop(&self, guild_id: Id<GuildMarker>) -> bool {
        match self.lookup(guild_id) {
            Some(session) => {
                debug!("guild {guild_id}: stop requested");
                session.send_stop();
                true
            }
            None => false,
        }
    }

    /// False when the guild has no session.
    pub fn signal_skip(&self, guild_id: Id<GuildMarker>) -> bool {
        match self.lookup(guild_id) {
            Some(session) => {
                debug!("guild {guild_id}: skip requested");
                session.send_skip();
                true
            }
            None => false,
        }
    }

    /// Numbered listing of the queue, head first.
    pub fn snapshot_queue_text(&self, guild_id: Id<GuildMarker>) -> String {
        let tracks = self
            .lookup(guild_id)
            .map(|session| session.queue_snapshot())
            .unwrap_or_default();
        if tracks.is_empty() {
            return EMPTY_QUEUE_TEXT.to_string();
        }
        let mut out = String::new();
        for (i, track) in tracks.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, track);
        }
        out
    }

    /// Removes the track at 1-based `index`. Index 1 is the playing track, so it is
    /// skipped rather than edited out of the queue.
    pub fn remove_at(&self, guild_id: Id<GuildMarker>, index: i64) -> bool {
        let Some(session) = self.lookup(guild_id) else {
            return false;
        };
        if index == 1 {
            session.send_skip();
            return true;
        }
        match index.checked_sub(1) {
            Some(queued) => session.remove_queued(queued),
            None => false,
        }
    }

    /// Drops the last queued track; stops playback when only the playing one is left.
    pub fn pop_last(&self, guild_id: Id<GuildMarker>) -> bool {
        match self.lookup(guild_id) {
            Some(session) => {
                session.pop_last();
                true
            }
            None => false,
        }
    }

    /// Returns true when a live stream was paused or resumed.
    pub fn set_paused(&self, guild_id: Id<GuildMarker>, paused: bool) -> bool {
        self.lookup(guild_id)
            .is_some_and(|session| session.set_paused(paused))
    }

    pub fn currently_playing(&self, guild_id: Id<GuildMarker>) -> Option<Track> {
        self.lookup(guild_id).and_then(|session| session.now_playing())
    }

    /// Voice channel the guild's session is bound to.
    pub fn voice_channel(&self, guild_id: Id<GuildMarker>) -> Option<Id<ChannelMarker>> {
        self.lookup(guild_id).map(|session| session.voice_channel())
    }

    /// Sends stop to every session. Returns how many were signalled.
    pub fn stop_all(&self) -> usize {
        let sessions = self.sessions();
        for session in &sessions {
            session.send_stop();
        }
        if !sessions.is_empty() {
            info!("stop sent to {} playback session(s)", sessions.len());
        }
        sessions.len()
    }

    /// Waits until every driver has removed its entry, or `timeout` elapses.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let drained = self.drained.notified();
            if self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                return self.is_empty();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fakes::FakeStreamControl;

    fn guild() -> Id<GuildMarker> {
        Id::new(42)
    }

    fn voice() -> Id<ChannelMarker> {
        Id::new(7)
    }

    fn track(name: &str) -> Track {
        Track::new(name, "Boards of Canada", format!("https://www.deezer.com/track/{name}"))
    }

    fn titles(registry: &SessionRegistry) -> Vec<String> {
        registry
            .lookup(guild())
            .map(|s| s.queue_snapshot().into_iter().map(|t| t.title).collect())
            .unwrap_or_default()
    }

    #[test]
    fn first_enqueue_creates_then_appends_in_order() {
        let registry = SessionRegistry::new();
        let (first, created) = registry.enqueue_or_create(guild(), voice(), track("a"));
        assert!(created);
        for name in ["b", "c", "d"] {
            let (again, created) = registry.enqueue_or_create(guild(), voice(), track(name));
            assert!(!created);
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(titles(&registry), vec!["a", "b", "c", "d"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn voice_channel_is_fixed_at_creation() {
        let registry = SessionRegistry::new();
        registry.enqueue_or_create(guild(), voice(), track("a"));
        registry.enqueue_or_create(guild(), Id::new(99), track("b"));
        assert_eq!(registry.voice_channel(guild()), Some(voice()));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.enqueue_or_create(guild(), voice(), track("a"));
        assert!(registry.remove(guild()));
        assert!(!registry.remove(guild()));
        assert!(registry.lookup(guild()).is_none());
    }

    #[test]
    fn missing_guild_reports_not_found() {
        let registry = SessionRegistry::new();
        assert!(!registry.signal_stop(guild()));
        assert!(!registry.signal_skip(guild()));
        assert!(!registry.remove_at(guild(), 2));
        assert!(!registry.pop_last(guild()));
        assert!(!registry.set_paused(guild(), true));
        assert!(registry.currently_playing(guild()).is_none());
        assert_eq!(registry.snapshot_queue_text(guild()), EMPTY_QUEUE_TEXT);
    }

    #[test]
    fn queue_text_is_numbered_from_one() {
        let registry = SessionRegistry::new();
        registry.enqueue_or_create(guild(), voice(), track("Roygbiv"));
        registry.enqueue_or_create(guild(), voice(), track("Olson"));
        assert_eq!(
            registry.snapshot_queue_text(guild()),
            "1. Boards of Canada - Roygbiv\n2. Boards of Canada - Olson\n"
        );
    }

    #[test]
    fn remove_at_one_is_a_skip_not_an_edit() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(guild(), voice(), track("a"));
        registry.enqueue_or_create(guild(), voice(), track("b"));
        let mut signals = session.take_signals().unwrap();

        assert!(registry.remove_at(guild(), 1));
        assert_eq!(titles(&registry), vec!["a", "b"]);
        assert!(signals.skip.try_recv().is_ok());
    }

    #[test]
    fn remove_at_rejects_out_of_range_without_touching_queue() {
        let registry = SessionRegistry::new();
        for name in ["a", "b", "c"] {
            registry.enqueue_or_create(guild(), voice(), track(name));
        }
        for bad in [0, -1, 4, 17, i64::MIN, i64::MAX] {
            assert!(!registry.remove_at(guild(), bad), "index {bad}");
        }
        assert_eq!(titles(&registry), vec!["a", "b", "c"]);

        assert!(registry.remove_at(guild(), 3));
        assert_eq!(titles(&registry), vec!["a", "b"]);
        assert!(registry.remove_at(guild(), 2));
        assert_eq!(titles(&registry), vec!["a"]);
    }

    #[test]
    fn pop_last_trims_tail_or_stops() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(guild(), voice(), track("a"));
        registry.enqueue_or_create(guild(), voice(), track("b"));
        registry.enqueue_or_create(guild(), voice(), track("c"));
        let mut signals = session.take_signals().unwrap();

        assert!(registry.pop_last(guild()));
        assert_eq!(titles(&registry), vec!["a", "b"]);
        assert!(!signals.stop_pending());

        assert!(registry.pop_last(guild()));
        assert_eq!(titles(&registry), vec!["a"]);

        assert!(registry.pop_last(guild()));
        assert_eq!(titles(&registry), vec!["a"]);
        assert!(signals.stop_pending());
    }

    #[test]
    fn set_paused_without_stream_is_a_noop() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(guild(), voice(), track("a"));
        assert!(!registry.set_paused(guild(), true));
        assert!(session.paused_since().is_none());
    }

    #[test]
    fn set_paused_records_and_clears_timestamp() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(guild(), voice(), track("a"));
        let control = Arc::new(FakeStreamControl::default());
        let _slot = session.install_stream(control.clone());

        assert!(registry.set_paused(guild(), true));
        assert!(control.is_paused());
        assert!(session.paused_since().is_some());

        assert!(registry.set_paused(guild(), false));
        assert!(!control.is_paused());
        assert!(session.paused_since().is_none());
    }

    #[test]
    fn retire_refuses_while_tracks_are_queued() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(guild(), voice(), track("a"));
        assert!(!registry.retire(&session));
        assert!(registry.contains(guild()));

        session.clear_queue();
        assert!(registry.retire(&session));
        assert!(!registry.contains(guild()));
    }

    #[test]
    fn remove_session_leaves_a_newer_session_alone() {
        let registry = SessionRegistry::new();
        let (old, _) = registry.enqueue_or_create(guild(), voice(), track("a"));
        registry.remove(guild());
        let (new, created) = registry.enqueue_or_create(guild(), voice(), track("b"));
        assert!(created);

        assert!(!registry.remove_session(&old));
        assert!(registry.contains(guild()));
        assert!(registry.remove_session(&new));
        assert!(registry.is_empty());
    }

    #[test]
    fn stop_all_signals_every_session() {
        let registry = SessionRegistry::new();
        let (a, _) = registry.enqueue_or_create(Id::new(1), voice(), track("a"));
        let (b, _) = registry.enqueue_or_create(Id::new(2), voice(), track("b"));
        let mut sa = a.take_signals().unwrap();
        let mut sb = b.take_signals().unwrap();

        assert_eq!(registry.stop_all(), 2);
        assert!(sa.stop_pending());
        assert!(sb.stop_pending());
    }

    #[tokio::test]
    async fn wait_until_empty_wakes_on_last_removal() {
        let registry = Arc::new(SessionRegistry::new());
        registry.enqueue_or_create(guild(), voice(), track("a"));

        let remover = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remover.remove(guild());
        });

        assert!(registry.wait_until_empty(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn wait_until_empty_times_out() {
        let registry = SessionRegistry::new();
        registry.enqueue_or_create(guild(), voice(), track("a"));
        assert!(!registry.wait_until_empty(Duration::from_millis(30)).await);
    }
}
