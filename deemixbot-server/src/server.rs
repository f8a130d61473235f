// deemixbot-server/src/server.rs

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use deemixbot_common::error::Error;
use deemixbot_core::platforms::deezer::deemix::DeemixFetcher;
use deemixbot_core::platforms::deezer::DeezerResolver;
use deemixbot_core::platforms::discord::{
    DiscordEvent, DiscordMessageEvent, DiscordNotifier, DiscordPlatform,
};
use deemixbot_core::platforms::PlatformIntegration;
use deemixbot_core::services::voice_presence::stop_if_channel_abandoned;
use deemixbot_core::services::{CommandContext, MusicService};
use deemixbot_core::tasks::idle_reaper::spawn_idle_reaper_task;
use deemixbot_core::{PlaybackContext, SessionRegistry};

use crate::config::BotConfig;

pub async fn run_server(config: BotConfig) -> Result<(), Error> {
    // 1) Gateway, cache and voice manager
    let mut discord = DiscordPlatform::new(config.token.clone(), config.prefix.clone());
    discord.connect().await?;
    let voice = discord
        .voice_transport()
        .ok_or_else(|| Error::Platform("voice manager missing after connect".into()))?;
    let notifier = discord
        .notifier()
        .ok_or_else(|| Error::Platform("HTTP client missing after connect".into()))?;

    // 2) Playback wiring
    let registry = Arc::new(SessionRegistry::new());
    let playback = PlaybackContext {
        fetcher: Arc::new(DeemixFetcher::new(&config.deemix_path, config.bitrate.clone())),
        voice,
        notifier: notifier.clone(),
    };
    let service = Arc::new(MusicService::new(
        registry.clone(),
        Arc::new(DeezerResolver::new()?),
        playback,
        &config.prefix,
        config.search_limit,
    ));

    // 3) Background tasks
    let reaper_handle =
        spawn_idle_reaper_task(registry.clone(), config.reap_interval(), config.idle_timeout());

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let _signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received; stopping playback...");
        let _ = shutdown_tx.send(true);
    });

    // 4) Main event loop
    info!("deemixbot is up. Prefix: '{}'", config.prefix);
    loop {
        tokio::select! {
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signaled; exiting event loop.");
                    break;
                }
            }
            event = discord.next_event() => match event {
                Some(DiscordEvent::Message(msg)) => dispatch_command(&service, &notifier, msg),
                Some(DiscordEvent::VoiceStateChanged { guild_id }) => {
                    stop_if_channel_abandoned(&registry, guild_id, |channel| {
                        discord.voice_listener_count(channel)
                    });
                }
                None => {
                    warn!("Discord event stream closed; shutting down.");
                    break;
                }
            },
        }
    }

    // 5) Leave every voice channel before closing the gateway
    let stopped = registry.stop_all();
    if stopped > 0 && !registry.wait_until_empty(config.shutdown_grace()).await {
        warn!(
            "{} playback session(s) still active after {:?}",
            registry.len(),
            config.shutdown_grace()
        );
    }
    reaper_handle.abort();

    if let Err(e) = discord.disconnect().await {
        error!("Error disconnecting from Discord: {e}");
    }
    info!("Server shutdown complete.");
    Ok(())
}

/// Runs one command on its own task so a slow resolve never blocks the gateway.
fn dispatch_command(
    service: &Arc<MusicService>,
    notifier: &Arc<DiscordNotifier>,
    msg: DiscordMessageEvent,
) {
    let Some(command) = service.parse(&msg.text) else {
        trace!("Ignoring unknown command '{}'", msg.text);
        return;
    };
    debug!("guild {} user {}: {command:?}", msg.guild_id, msg.author_id);

    let service = service.clone();
    let notifier = notifier.clone();
    tokio::spawn(async move {
        let ctx = CommandContext {
            guild_id: msg.guild_id,
            text_channel: msg.channel_id,
            author_voice_channel: msg.author_voice_channel,
        };
        if let Some(reply) = service.execute(&ctx, command).await {
            if let Err(e) = notifier.reply(msg.channel_id, msg.message_id, &reply).await {
                warn!("Could not reply in channel {}: {e}", msg.channel_id);
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
