// deemixbot-core/src/tasks/idle_reaper.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::playback::SessionRegistry;

pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PAUSE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Spawns a background task that stops sessions left paused for longer than
/// `pause_timeout`, checking every `interval`.
pub fn spawn_idle_reaper_task(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    pause_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stopped = reap_idle_sessions(&registry, Utc::now(), pause_timeout);
            if stopped > 0 {
                info!("Idle reaper stopped {stopped} paused session(s)");
            }
        }
    })
}

/// One sweep. Sends stop to each session paused for longer than `pause_timeout`
/// as of `now` and returns how many were signalled.
pub fn reap_idle_sessions(
    registry: &SessionRegistry,
    now: DateTime<Utc>,
    pause_timeout: Duration,
) -> usize {
    let limit = TimeDelta::from_std(pause_timeout).unwrap_or(TimeDelta::MAX);
    let mut stopped = 0;
    for session in registry.sessions() {
        let Some(paused_since) = session.paused_since() else {
            continue;
        };
        if now - paused_since > limit {
            debug!(
                "guild {}: paused since {paused_since}, stopping",
                session.guild_id()
            );
            session.send_stop();
            stopped += 1;
        }
    }
    stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fakes::{track, FakeStreamControl};
    use twilight_model::id::Id;

    #[test]
    fn stops_only_sessions_paused_past_the_threshold() {
        let registry = SessionRegistry::new();
        let (long, _) = registry.enqueue_or_create(Id::new(1), Id::new(10), track("a"));
        let (short, _) = registry.enqueue_or_create(Id::new(2), Id::new(20), track("b"));
        let (playing, _) = registry.enqueue_or_create(Id::new(3), Id::new(30), track("c"));
        let mut long_signals = long.take_signals().unwrap();
        let mut short_signals = short.take_signals().unwrap();
        let mut playing_signals = playing.take_signals().unwrap();

        let _long_slot = long.install_stream(Arc::new(FakeStreamControl::default()));
        let _short_slot = short.install_stream(Arc::new(FakeStreamControl::default()));
        let _playing_slot = playing.install_stream(Arc::new(FakeStreamControl::default()));

        let now = Utc::now();
        assert!(long.set_paused_at(true, now - TimeDelta::minutes(6)));
        assert!(short.set_paused_at(true, now - TimeDelta::minutes(2)));

        let stopped = reap_idle_sessions(&registry, now, DEFAULT_PAUSE_TIMEOUT);
        assert_eq!(stopped, 1);
        assert!(long_signals.stop_pending());
        assert!(!short_signals.stop_pending());
        assert!(!playing_signals.stop_pending());
    }

    #[test]
    fn resumed_sessions_are_left_alone() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(Id::new(1), Id::new(10), track("a"));
        let mut signals = session.take_signals().unwrap();
        let _slot = session.install_stream(Arc::new(FakeStreamControl::default()));

        registry.set_paused(Id::new(1), true);
        registry.set_paused(Id::new(1), false);

        let stopped = reap_idle_sessions(&registry, Utc::now() + TimeDelta::hours(1), DEFAULT_PAUSE_TIMEOUT);
        assert_eq!(stopped, 0);
        assert!(!signals.stop_pending());
    }

    #[test]
    fn vanished_sessions_are_harmless() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.enqueue_or_create(Id::new(1), Id::new(10), track("a"));
        let _slot = session.install_stream(Arc::new(FakeStreamControl::default()));
        registry.set_paused(Id::new(1), true);
        // the driver (and its receivers) are long gone
        drop(session.take_signals());

        let stopped = reap_idle_sessions(&registry, Utc::now() + TimeDelta::minutes(10), DEFAULT_PAUSE_TIMEOUT);
        assert_eq!(stopped, 1);
    }
}
