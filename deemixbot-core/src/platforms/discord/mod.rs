pub mod notifier;
pub mod runtime;
pub mod songbird;

pub use self::notifier::DiscordNotifier;
pub use self::runtime::{DiscordEvent, DiscordMessageEvent, DiscordPlatform};
pub use self::songbird::SongbirdTransport;
