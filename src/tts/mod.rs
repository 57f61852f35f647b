//! Text-to-speech: generator capability and the TTS server loop.

pub mod generator;
pub mod server;

pub use generator::{
    GeneratedChunk, ScriptStep, ScriptedGenerator, SpeechGenerator, SynthesisDefaults,
    SynthesisParams, ToneGenerator, VoiceSelection,
};
pub use server::{TtsServer, TtsSummary, run_tts};
