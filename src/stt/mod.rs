//! Speech-to-text: segment transcription and the STT server loop.

pub mod server;
pub mod transcriber;
pub mod whisper;

pub use server::run_stt;
pub use transcriber::{MockTranscriber, TranscriptResult, Transcriber, TranscriptionAdapter};
pub use whisper::{WhisperConfig, WhisperTranscriber};
