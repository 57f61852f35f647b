//! telebridge - Telephony audio bridge for speech models
//!
//! Frames, segments and resamples 8kHz telephony audio on its way to a
//! speech-to-text model, and streams text-to-speech output back as framed
//! 8kHz PCM.

// Enforce error handling discipline in library code
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod protocol;
pub mod stt;
pub mod tts;

// Core traits (source → process → sink)
pub use audio::frame::FrameSource;
pub use stt::transcriber::Transcriber;
pub use tts::generator::SpeechGenerator;

// Server loops
pub use stt::server::{SttServer, run_stt};
pub use tts::server::{TtsServer, run_tts};

// Error handling
pub use error::{BridgeError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
