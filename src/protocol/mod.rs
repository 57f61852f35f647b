//! Wire formats for the STT and TTS processes.

pub mod channel;
pub mod framing;
pub mod messages;

pub use channel::{JsonLineWriter, LineReader, StatusReporter};
pub use framing::{FrameWriter, UTTERANCE_BOUNDARY};
pub use messages::{Status, SttEvent, TtsRequest};
