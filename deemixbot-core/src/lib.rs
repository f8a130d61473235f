// src/lib.rs

pub mod playback;
pub mod platforms;
pub mod services;
pub mod tasks;
pub mod test_utils;

pub use deemixbot_common::error::Error;
pub use playback::{PlaybackContext, SessionRegistry};
