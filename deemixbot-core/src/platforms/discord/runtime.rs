use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use songbird::shards::TwilightMap;
use songbird::Songbird;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{DefaultInMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway,
    CloseFrame,
    Config,
    Event,
    EventTypeFlags,
    Intents,
    MessageSender,
    Shard,
    StreamExt,
};
use twilight_http::client::ClientBuilder;
use twilight_http::Client as HttpClient;
use twilight_model::gateway::payload::outgoing::UpdatePresence;
use twilight_model::gateway::presence::{ActivityType, MinimalActivity, Status};
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_model::id::Id;

use crate::Error;
use crate::platforms::discord::notifier::DiscordNotifier;
use crate::platforms::discord::songbird::SongbirdTransport;
use crate::platforms::{ConnectionStatus, PlatformIntegration};

/// A prefixed chat message from a guild text channel.
#[derive(Debug, Clone)]
pub struct DiscordMessageEvent {
    pub guild_id: Id<GuildMarker>,
    pub channel_id: Id<ChannelMarker>,
    pub message_id: Id<MessageMarker>,
    pub author_id: Id<UserMarker>,
    /// Where the author sat in voice when the message arrived.
    pub author_voice_channel: Option<Id<ChannelMarker>>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum DiscordEvent {
    Message(DiscordMessageEvent),
    /// Someone joined, left or moved between voice channels of this guild.
    VoiceStateChanged { guild_id: Id<GuildMarker> },
}

/// Everything a shard runner needs besides the shard itself.
#[derive(Clone)]
struct ShardContext {
    tx: UnboundedSender<DiscordEvent>,
    cache: Arc<DefaultInMemoryCache>,
    songbird: Arc<Songbird>,
    prefix: String,
}

/// Per-shard event loop:
///   - feeds the in-memory cache and songbird
///   - forwards prefixed guild messages and voice-state changes to `tx`.
async fn shard_runner(mut shard: Shard, ctx: ShardContext) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
                continue;
            }
        };
        ctx.cache.update(&event);
        ctx.songbird.process(&event).await;

        match &event {
            Event::Ready(ready) => {
                info!(
                    "Shard {shard_id} => READY as {} (ID={})",
                    ready.user.name, ready.user.id
                );
                set_help_presence(&shard.sender(), &ctx.prefix);
            }
            Event::MessageCreate(msg) => {
                if msg.author.bot {
                    trace!("Ignoring bot message from {}", msg.author.name);
                    continue;
                }
                if !msg.content.starts_with(ctx.prefix.as_str()) {
                    continue;
                }
                let Some(guild_id) = msg.guild_id else {
                    debug!("Ignoring command outside a guild from {}", msg.author.name);
                    continue;
                };
                let author_voice_channel = ctx
                    .cache
                    .voice_state(msg.author.id, guild_id)
                    .map(|state| state.channel_id());

                let _ = ctx.tx.send(DiscordEvent::Message(DiscordMessageEvent {
                    guild_id,
                    channel_id: msg.channel_id,
                    message_id: msg.id,
                    author_id: msg.author.id,
                    author_voice_channel,
                    text: msg.content.clone(),
                }));
            }
            Event::VoiceStateUpdate(update) => {
                if let Some(guild_id) = update.guild_id {
                    let _ = ctx.tx.send(DiscordEvent::VoiceStateChanged { guild_id });
                }
            }
            _ => {
                trace!("Shard {shard_id} => unhandled event: {:?}", event.kind());
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

fn set_help_presence(sender: &MessageSender, prefix: &str) {
    let activity = MinimalActivity {
        kind: ActivityType::Playing,
        name: format!("{prefix}help"),
        url: None,
    };
    match UpdatePresence::new(vec![activity.into()], false, None, Status::Online) {
        Ok(presence) => {
            if let Err(e) = sender.command(&presence) {
                warn!("Could not update presence: {e:?}");
            }
        }
        Err(e) => warn!("Invalid presence payload: {e:?}"),
    }
}

/// Gateway connection, HTTP client, cache and voice manager for the bot.
pub struct DiscordPlatform {
    pub token: String,
    pub prefix: String,
    pub connection_status: ConnectionStatus,

    /// Inbound events; `None` until `connect`.
    pub rx: Mutex<Option<UnboundedReceiver<DiscordEvent>>>,

    pub shard_tasks: Vec<JoinHandle<()>>,
    pub shard_senders: Vec<MessageSender>,

    pub http: Option<Arc<HttpClient>>,
    pub cache: Option<Arc<DefaultInMemoryCache>>,
    pub songbird: Option<Arc<Songbird>>,
    pub bot_user_id: Option<Id<UserMarker>>,
}

impl DiscordPlatform {
    pub fn new(token: String, prefix: String) -> Self {
        Self {
            token,
            prefix,
            connection_status: ConnectionStatus::Disconnected,
            rx: Mutex::new(None),
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
            cache: None,
            songbird: None,
            bot_user_id: None,
        }
    }

    /// Awaits the next inbound event. `None` once disconnected.
    pub async fn next_event(&self) -> Option<DiscordEvent> {
        let mut guard = self.rx.lock().await;
        match guard.as_mut() {
            Some(r) => r.recv().await,
            None => None,
        }
    }

    /// Members other than the bot currently in `channel_id`.
    pub fn voice_listener_count(&self, channel_id: Id<ChannelMarker>) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        let bot = self.bot_user_id;
        cache
            .voice_channel_states(channel_id)
            .map(|states| states.filter(|state| Some(state.user_id()) != bot).count())
            .unwrap_or(0)
    }

    pub fn voice_transport(&self) -> Option<Arc<SongbirdTransport>> {
        self.songbird
            .as_ref()
            .map(|manager| Arc::new(SongbirdTransport::new(manager.clone())))
    }

    pub fn notifier(&self) -> Option<Arc<DiscordNotifier>> {
        self.http
            .as_ref()
            .map(|http| Arc::new(DiscordNotifier::new(http.clone())))
    }
}

#[async_trait]
impl PlatformIntegration for DiscordPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("(DiscordPlatform) Already connected => skipping");
            return Ok(());
        }
        if self.token.is_empty() {
            return Err(Error::Config("Discord token is empty".into()));
        }

        let (tx, rx) = unbounded_channel::<DiscordEvent>();
        {
            let mut guard = self.rx.lock().await;
            *guard = Some(rx);
        }

        let http_client = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );
        self.http = Some(http_client.clone());

        let bot_user = http_client
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("current_user error: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("current_user body error: {e}")))?;
        info!("(DiscordPlatform) Logged in as {} ({})", bot_user.name, bot_user.id);
        self.bot_user_id = Some(bot_user.id);

        let cache = Arc::new(
            DefaultInMemoryCache::builder()
                .resource_types(ResourceType::GUILD | ResourceType::CHANNEL | ResourceType::VOICE_STATE)
                .build(),
        );
        self.cache = Some(cache.clone());

        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS
                | Intents::GUILD_MESSAGES
                | Intents::MESSAGE_CONTENT
                | Intents::GUILD_VOICE_STATES,
        );
        let shards: Vec<Shard> = gateway::create_recommended(&http_client, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?
            .collect();

        let mut senders = HashMap::new();
        for shard in &shards {
            senders.insert(shard.id().number().into(), shard.sender());
        }
        let songbird = Arc::new(Songbird::twilight(
            Arc::new(TwilightMap::new(senders)),
            bot_user.id.into_nonzero(),
        ));
        self.songbird = Some(songbird.clone());

        let ctx = ShardContext {
            tx,
            cache,
            songbird,
            prefix: self.prefix.clone(),
        };
        for shard in shards {
            self.shard_senders.push(shard.sender());
            let ctx = ctx.clone();
            let handle = tokio::spawn(async move {
                shard_runner(shard, ctx).await;
            });
            self.shard_tasks.push(handle);
        }

        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        for task in &mut self.shard_tasks {
            let _ = task.await;
        }

        self.shard_senders.clear();
        self.shard_tasks.clear();

        {
            let mut guard = self.rx.lock().await;
            *guard = None;
        }

        Ok(())
    }
}
