//! The per-guild playback driver.
//!
//! One driver task runs for every session in the registry. It walks the queue head
//! by head: fetch the audio, make sure the voice connection is up, stream, and then
//! wait for whichever comes first of end-of-stream, a stop, or a skip. Stop and skip
//! are honoured at every wait, including the fetch and the voice join.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

use deemixbot_common::error::Error;
use deemixbot_common::models::{StagedAudio, Track};
use deemixbot_common::traits::{ActiveStream, AudioFetcher, Notifier, VoiceConnection, VoiceTransport};

use crate::playback::registry::SessionRegistry;
use crate::playback::session::{recv_live, GuildSession, PlaybackSignals};

/// How long an interrupted fetch gets to clean up after cancellation.
const FETCH_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Collaborators shared by every driver.
#[derive(Clone)]
pub struct PlaybackContext {
    pub fetcher: Arc<dyn AudioFetcher>,
    pub voice: Arc<dyn VoiceTransport>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Fetching,
    Streaming,
    IdleExit,
}

/// Why a driver left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    QueueDrained,
    Stopped,
    JoinFailed,
    TransportFailed,
    /// The session's signals were already claimed by another driver.
    AlreadyDriven,
}

enum TrackOutcome {
    Finished,
    Skipped,
    /// Fetch or decode failed; counts as done.
    Abandoned,
    Stopped,
    JoinFailed,
    TransportFailed,
}

impl TrackOutcome {
    fn label(&self) -> &'static str {
        match self {
            TrackOutcome::Finished => "finished",
            TrackOutcome::Skipped => "skipped",
            TrackOutcome::Abandoned => "abandoned",
            TrackOutcome::Stopped => "stopped",
            TrackOutcome::JoinFailed => "join failed",
            TrackOutcome::TransportFailed => "transport failed",
        }
    }
}

enum Fetched {
    Audio(StagedAudio),
    Failed(Error),
    Interrupted(TrackOutcome),
}

/// Awaits `work` unless a live stop or skip arrives first. Stop wins ties.
async fn until_signalled<F: Future>(
    signals: &mut PlaybackSignals,
    work: F,
) -> Result<F::Output, TrackOutcome> {
    let floor = signals.floor;
    tokio::select! {
        biased;
        _ = recv_live(&mut signals.stop, floor) => Err(TrackOutcome::Stopped),
        Some(()) = recv_live(&mut signals.skip, floor) => Err(TrackOutcome::Skipped),
        output = work => Ok(output),
    }
}

/// Spawns the driver for a freshly created session.
pub fn spawn_playback_driver(
    ctx: PlaybackContext,
    registry: Arc<SessionRegistry>,
    session: Arc<GuildSession>,
    text_channel: Id<ChannelMarker>,
) -> JoinHandle<ExitReason> {
    let driver = PlaybackDriver::new(ctx, registry, session, text_channel);
    tokio::spawn(driver.run())
}

pub struct PlaybackDriver {
    ctx: PlaybackContext,
    registry: Arc<SessionRegistry>,
    session: Arc<GuildSession>,
    text_channel: Id<ChannelMarker>,
    connection: Option<Box<dyn VoiceConnection>>,
}

/// Makes sure the registry entry goes away on every exit, unwinding included.
struct RegistryGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<GuildSession>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if self.registry.remove_session(&self.session) {
            debug!("guild {}: session removed by guard", self.session.guild_id());
        }
    }
}

impl PlaybackDriver {
    pub fn new(
        ctx: PlaybackContext,
        registry: Arc<SessionRegistry>,
        session: Arc<GuildSession>,
        text_channel: Id<ChannelMarker>,
    ) -> Self {
        Self {
            ctx,
            registry,
            session,
            text_channel,
            connection: None,
        }
    }

    pub async fn run(mut self) -> ExitReason {
        let guild_id = self.session.guild_id();
        let Some(mut signals) = self.session.take_signals() else {
            error!("guild {guild_id}: playback signals already taken, refusing to drive");
            return ExitReason::AlreadyDriven;
        };
        let _guard = RegistryGuard {
            registry: self.registry.clone(),
            session: self.session.clone(),
        };
        info!("guild {guild_id}: playback driver started");

        loop {
            let (reason, mark) = self.drive(&mut signals).await;
            debug!("guild {guild_id}: {:?} ({reason:?})", DriverState::IdleExit);
            let mark = if reason == ExitReason::QueueDrained {
                mark
            } else {
                self.session.clear_queue()
            };
            self.release_voice().await;
            self.session.clear_stream();

            if self.registry.retire(&self.session) {
                info!("guild {guild_id}: playback driver finished ({reason:?})");
                return reason;
            }
            // Tracks were queued while we were leaving. Signals sent before the
            // driver decided to exit were aimed at the run that just ended.
            signals.discard_through(mark);
            info!("guild {guild_id}: tracks queued during teardown, resuming");
        }
    }

    /// Plays the queue until it empties or the session must end. Also returns the
    /// enqueue count at which that decision was taken.
    async fn drive(&mut self, signals: &mut PlaybackSignals) -> (ExitReason, u64) {
        loop {
            if signals.stop_pending() {
                return (ExitReason::Stopped, self.session.enqueued());
            }
            let Some(track) = self.session.now_playing() else {
                return (ExitReason::QueueDrained, self.session.enqueued());
            };
            let reason = match self.play_track(&track, signals).await {
                TrackOutcome::Stopped => ExitReason::Stopped,
                TrackOutcome::JoinFailed => ExitReason::JoinFailed,
                TrackOutcome::TransportFailed => ExitReason::TransportFailed,
                TrackOutcome::Finished | TrackOutcome::Skipped | TrackOutcome::Abandoned => {
                    match self.session.finish_head() {
                        (0, mark) => return (ExitReason::QueueDrained, mark),
                        _ => continue,
                    }
                }
            };
            return (reason, self.session.enqueued());
        }
    }

    async fn play_track(&mut self, track: &Track, signals: &mut PlaybackSignals) -> TrackOutcome {
        let guild_id = self.session.guild_id();
        debug!("guild {guild_id}: {:?} {track}", DriverState::Fetching);
        self.notify(format!("Now playing {track}"));

        let audio = match self.fetch(track, signals).await {
            Fetched::Audio(audio) => audio,
            Fetched::Interrupted(outcome) => return outcome,
            Fetched::Failed(e) => {
                warn!("guild {guild_id}: cannot fetch {}: {e}", track.source);
                self.notify(format!("Cannot play {track}: {e}"));
                return TrackOutcome::Abandoned;
            }
        };

        if self.connection.is_none() {
            let voice = self.ctx.voice.clone();
            let join = voice.join(guild_id, self.session.voice_channel());
            match until_signalled(signals, join).await {
                Err(outcome) => {
                    debug!("guild {guild_id}: voice join interrupted ({})", outcome.label());
                    return outcome;
                }
                Ok(Ok(connection)) => self.connection = Some(connection),
                Ok(Err(e)) => {
                    error!("guild {guild_id}: cannot join the voice channel: {e}");
                    self.notify("Cannot join the voice channel".to_string());
                    return TrackOutcome::JoinFailed;
                }
            }
        }
        let Some(connection) = self.connection.as_mut() else {
            return TrackOutcome::JoinFailed;
        };
        let ActiveStream { done, control } =
            match until_signalled(signals, connection.stream(&audio)).await {
                Err(outcome) => return outcome,
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!("guild {guild_id}: cannot stream {track}: {e}");
                    self.notify(format!("Cannot play {track}: {e}"));
                    return TrackOutcome::Abandoned;
                }
            };

        debug!("guild {guild_id}: {:?} {track}", DriverState::Streaming);
        let slot = self.session.install_stream(control.clone());
        let outcome = match until_signalled(signals, done).await {
            Err(outcome) => {
                control.stop();
                outcome
            }
            Ok(Ok(Ok(()))) => TrackOutcome::Finished,
            Ok(Ok(Err(e))) => {
                error!("guild {guild_id}: problem streaming {track}: {e}");
                TrackOutcome::TransportFailed
            }
            Ok(Err(_)) => {
                error!("guild {guild_id}: stream of {track} ended without a completion notice");
                TrackOutcome::TransportFailed
            }
        };
        drop(slot);
        drop(audio);
        outcome
    }

    async fn fetch(&self, track: &Track, signals: &mut PlaybackSignals) -> Fetched {
        let cancel = CancellationToken::new();
        let fetch = self.ctx.fetcher.fetch(&track.source, cancel.clone());
        tokio::pin!(fetch);

        let interrupted = match until_signalled(signals, &mut fetch).await {
            Ok(Ok(audio)) => return Fetched::Audio(audio),
            Ok(Err(e)) => return Fetched::Failed(e),
            Err(outcome) => outcome,
        };

        cancel.cancel();
        if tokio::time::timeout(FETCH_CANCEL_GRACE, &mut fetch).await.is_err() {
            warn!(
                "guild {}: fetch of {} ignored cancellation",
                self.session.guild_id(),
                track.source
            );
        }
        Fetched::Interrupted(interrupted)
    }

    async fn release_voice(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.leave().await {
                warn!("guild {}: error leaving voice: {e}", self.session.guild_id());
            }
        }
    }

    fn notify(&self, text: String) {
        let notifier = self.ctx.notifier.clone();
        let channel = self.text_channel;
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(channel, &text).await {
                warn!("could not notify channel {channel}: {e}");
            }
        });
    }
}
