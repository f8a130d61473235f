pub mod playback_traits;

pub use playback_traits::{
    ActiveStream, AudioFetcher, Notifier, StreamControl, TrackResolver, VoiceConnection,
    VoiceTransport,
};
