// File: deemixbot-common/src/models/mod.rs
pub mod track;
pub mod audio;

pub use track::{SearchedTrack, Track};
pub use audio::StagedAudio;
