//! Stops a guild's playback once everybody has left its voice channel.

use tracing::info;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};
use twilight_model::id::Id;

use crate::playback::SessionRegistry;

/// Called on every voice-state change in `guild_id`. `listeners` counts the
/// members (the bot excluded) sitting in a voice channel. Returns true when a stop
/// was sent.
pub fn stop_if_channel_abandoned<F>(
    registry: &SessionRegistry,
    guild_id: Id<GuildMarker>,
    listeners: F,
) -> bool
where
    F: FnOnce(Id<ChannelMarker>) -> usize,
{
    let Some(channel) = registry.voice_channel(guild_id) else {
        return false;
    };
    if listeners(channel) > 0 {
        return false;
    }
    info!("guild {guild_id}: voice channel {channel} is empty, stopping playback");
    registry.signal_stop(guild_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fakes::track;

    #[test]
    fn stops_when_nobody_is_left() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(Id::new(1), Id::new(10), track("a"));
        let mut signals = session.take_signals().unwrap();

        assert!(stop_if_channel_abandoned(&registry, Id::new(1), |ch| {
            assert_eq!(ch, Id::new(10));
            0
        }));
        assert!(signals.stop_pending());
    }

    #[test]
    fn keeps_playing_while_someone_listens() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(Id::new(1), Id::new(10), track("a"));
        let mut signals = session.take_signals().unwrap();

        assert!(!stop_if_channel_abandoned(&registry, Id::new(1), |_| 2));
        assert!(!signals.stop_pending());
    }

    #[test]
    fn ignores_guilds_without_session() {
        let registry = SessionRegistry::new();
        assert!(!stop_if_channel_abandoned(&registry, Id::new(1), |_| 0));
    }
}
