pub mod commands;
pub mod music_service;
pub mod voice_presence;

pub use commands::Command;
pub use music_service::{CommandContext, MusicService};
