use std::sync::Arc;

use tracing::{debug, info, warn};
use twilight_model::id::marker::{ChannelMarker, GuildMarker};
use twilight_model::id::Id;

use deemixbot_common::traits::TrackResolver;

use crate::playback::{spawn_playback_driver, PlaybackContext, SessionRegistry};
use crate::services::commands::{help_message, Command, REPO_URL};

/// Where a command came from.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub guild_id: Id<GuildMarker>,
    pub text_channel: Id<ChannelMarker>,
    /// The author's current voice channel, if they are in one.
    pub author_voice_channel: Option<Id<ChannelMarker>>,
}

/// Runs chat commands against the session registry.
pub struct MusicService {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn TrackResolver>,
    playback: PlaybackContext,
    prefix: String,
    search_limit: usize,
    help: String,
}

impl MusicService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        resolver: Arc<dyn TrackResolver>,
        playback: PlaybackContext,
        prefix: &str,
        search_limit: usize,
    ) -> Self {
        Self {
            registry,
            resolver,
            playback,
            prefix: prefix.to_string(),
            search_limit,
            help: help_message(prefix),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Parses a raw chat message. Messages without the prefix are not commands.
    pub fn parse(&self, content: &str) -> Option<Command> {
        content
            .strip_prefix(self.prefix.as_str())
            .and_then(Command::parse)
    }

    /// Executes `command` and returns the reply for the text channel, if any.
    pub async fn execute(&self, ctx: &CommandContext, command: Command) -> Option<String> {
        let guild = ctx.guild_id;
        debug!("guild {guild}: executing {command:?}");
        match command {
            Command::Help => Some(self.help.clone()),
            Command::Repo => Some(REPO_URL.to_string()),
            Command::Play(text) => self.play(ctx, &text).await,
            Command::Stop => Some(if self.registry.signal_stop(guild) {
                "Stopping the music.".to_string()
            } else {
                nothing_playing()
            }),
            Command::Skip => Some(match self.registry.currently_playing(guild) {
                Some(track) if self.registry.signal_skip(guild) => format!("Skipping {track}"),
                _ => nothing_playing(),
            }),
            Command::Queue => Some(self.registry.snapshot_queue_text(guild)),
            Command::Remove(index) => Some(if self.registry.remove_at(guild, index) {
                format!("Removed track #{index}")
            } else {
                format!("There is no track #{index} in the queue")
            }),
            Command::Pop => Some(if self.registry.pop_last(guild) {
                "Removed the last track of the queue.".to_string()
            } else {
                nothing_playing()
            }),
            Command::Pause => Some(if self.registry.set_paused(guild, true) {
                "Paused.".to_string()
            } else {
                "Nothing is streaming right now.".to_string()
            }),
            Command::Resume => Some(if self.registry.set_paused(guild, false) {
                "Resumed.".to_string()
            } else {
                "Nothing is streaming right now.".to_string()
            }),
            Command::NowPlaying => Some(match self.registry.currently_playing(guild) {
                Some(track) => format!("Now playing {track}"),
                None => nothing_playing(),
            }),
            Command::Search(keyword) => Some(self.search(&keyword).await),
        }
    }

    async fn play(&self, ctx: &CommandContext, text: &str) -> Option<String> {
        if text.is_empty() {
            return Some(format!("Usage: {}play <link>/<keyword>", self.prefix));
        }
        let Some(voice_channel) = ctx.author_voice_channel else {
            return Some("Join a voice channel!".to_string());
        };
        let track = match self.resolver.resolve(text).await {
            Ok(track) => track,
            Err(e) => {
                debug!("guild {}: cannot resolve '{text}': {e}", ctx.guild_id);
                return Some(format!("Cannot play this music: {e}"));
            }
        };

        let reply = format!("Queued {track}");
        let (session, created) =
            self.registry
                .enqueue_or_create(ctx.guild_id, voice_channel, track);
        if !created {
            return Some(reply);
        }
        info!("guild {}: spawning playback driver", ctx.guild_id);
        spawn_playback_driver(
            self.playback.clone(),
            self.registry.clone(),
            session,
            ctx.text_channel,
        );
        // the driver announces the track itself
        None
    }

    async fn search(&self, keyword: &str) -> String {
        if keyword.is_empty() {
            return format!("Usage: {}search <keyword>", self.prefix);
        }
        match self.resolver.search(keyword, self.search_limit).await {
            Ok(hits) if hits.is_empty() => "Nothing found.".to_string(),
            Ok(hits) => {
                let mut out = String::from("Search results:\n");
                for hit in &hits {
                    hit.append_to(&mut out);
                }
                out
            }
            Err(e) => {
                warn!("search for '{keyword}' failed: {e}");
                format!("Cannot search right now: {e}")
            }
        }
    }
}

fn nothing_playing() -> String {
    "Nothing is playing!".to_string()
}
