// File: deemixbot-common/src/traits/playback_traits.rs
//
// Seams between the playback core and the outside world (catalog, downloader,
// voice gateway, chat).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};
use twilight_model::id::Id;

use crate::error::Error;
use crate::models::{SearchedTrack, StagedAudio, Track};

/// Turns user text (a link or keywords) into a playable track.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Fails with `Error::NotFound` when nothing matches.
    async fn resolve(&self, text: &str) -> Result<Track, Error>;

    /// Returns at most `limit` catalog hits for `keyword`.
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SearchedTrack>, Error>;
}

/// Downloads a track into local storage.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Must return promptly (with `Error::Cancelled`) once `cancel` fires.
    async fn fetch(&self, source: &str, cancel: CancellationToken) -> Result<StagedAudio, Error>;
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<Box<dyn VoiceConnection>, Error>;
}

/// A joined voice channel. Owned by a single playback driver.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Starts streaming `audio`. The file must stay alive until `done` resolves.
    async fn stream(&mut self, audio: &StagedAudio) -> Result<ActiveStream, Error>;

    async fn leave(&mut self) -> Result<(), Error>;
}

/// Control surface of one in-flight stream.
pub trait StreamControl: Send + Sync {
    fn set_paused(&self, paused: bool) -> Result<(), Error>;

    /// Ends this stream only; the connection stays up.
    fn stop(&self);
}

/// What `VoiceConnection::stream` hands back.
pub struct ActiveStream {
    /// Resolves with `Ok(())` at end-of-stream or with the transport error.
    pub done: oneshot::Receiver<Result<(), Error>>,
    pub control: Arc<dyn StreamControl>,
}

/// Outbound chat messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel_id: Id<ChannelMarker>, text: &str) -> Result<(), Error>;
}
