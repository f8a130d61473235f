//! Per-guild playback: the session registry, the guild sessions it owns, and the
//! driver task that streams each guild's queue.

pub mod driver;
pub mod registry;
pub mod session;

pub use driver::{spawn_playback_driver, DriverState, ExitReason, PlaybackContext, PlaybackDriver};
pub use registry::{SessionRegistry, EMPTY_QUEUE_TEXT};
pub use session::{GuildSession, PlaybackSignals};
