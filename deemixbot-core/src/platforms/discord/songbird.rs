//! songbird.rs
//!
//! Voice transport on top of Songbird: joins a guild's voice channel and plays
//! staged files into it, reporting the end of each track over a oneshot.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use songbird::events::{Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use songbird::input::File as FileInput;
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Call, Songbird};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use twilight_model::id::marker::{ChannelMarker, GuildMarker};
use twilight_model::id::Id;

use deemixbot_common::error::Error;
use deemixbot_common::models::StagedAudio;
use deemixbot_common::traits::{ActiveStream, StreamControl, VoiceConnection, VoiceTransport};

type DoneSender = oneshot::Sender<Result<(), Error>>;

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<Box<dyn VoiceConnection>, Error> {
        let call = self
            .manager
            .join(guild_id.into_nonzero(), channel_id.into_nonzero())
            .await
            .map_err(|e| Error::Join(e.to_string()))?;
        if let Err(e) = call.lock().await.deafen(true).await {
            warn!("guild {guild_id}: could not self-deafen: {e}");
        }
        info!("guild {guild_id}: joined voice channel {channel_id}");

        Ok(Box::new(SongbirdConnection {
            manager: self.manager.clone(),
            guild_id,
            call,
        }))
    }
}

pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: Id<GuildMarker>,
    call: Arc<tokio::sync::Mutex<Call>>,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn stream(&mut self, audio: &StagedAudio) -> Result<ActiveStream, Error> {
        let input = FileInput::new(audio.path().to_path_buf());
        let handle = self.call.lock().await.play_only_input(input.into());

        let (tx, rx) = oneshot::channel();
        let notifier = TrackEndNotifier {
            done: Arc::new(Mutex::new(Some(tx))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| Error::Transport(format!("cannot watch track: {e}")))?;
        }
        debug!("guild {}: streaming {}", self.guild_id, audio.path().display());

        Ok(ActiveStream {
            done: rx,
            control: Arc::new(SongbirdStreamControl { handle }),
        })
    }

    async fn leave(&mut self) -> Result<(), Error> {
        self.manager
            .remove(self.guild_id.into_nonzero())
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        info!("guild {}: left voice", self.guild_id);
        Ok(())
    }
}

/// Fires once for whichever of End/Error songbird raises first.
#[derive(Clone)]
struct TrackEndNotifier {
    done: Arc<Mutex<Option<DoneSender>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };
        let result = match tracks.first().map(|(state, _)| &state.playing) {
            Some(PlayMode::Errored(e)) => Err(Error::Transport(e.to_string())),
            _ => Ok(()),
        };
        if let Some(tx) = self.done.lock().take() {
            let _ = tx.send(result);
        }
        Some(Event::Cancel)
    }
}

pub struct SongbirdStreamControl {
    handle: TrackHandle,
}

impl StreamControl for SongbirdStreamControl {
    fn set_paused(&self, paused: bool) -> Result<(), Error> {
        let res = if paused {
            self.handle.pause()
        } else {
            self.handle.play()
        };
        res.map_err(|e| Error::Transport(e.to_string()))
    }

    fn stop(&self) {
        if let Err(e) = self.handle.stop() {
            debug!("track already gone on stop: {e}");
        }
    }
}
