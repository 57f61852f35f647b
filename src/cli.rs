//! Command-line interface for telebridge
//!
//! Provides argument parsing using clap derive macros.

use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Telephony audio bridge for speech models
#[derive(Parser, Debug)]
#[command(
    name = "telebridge",
    version,
    about = "Bridge 8kHz telephony audio with speech-to-text and text-to-speech models"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write diagnostic log lines to the status stream
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Speech-to-text: raw S16LE 8kHz frames on stdin, JSON events on stdout
    Stt(SttArgs),

    /// Text-to-speech: JSON requests on stdin, framed S16LE 8kHz audio on stdout
    Tts(TtsArgs),
}

#[derive(Args, Debug, Default)]
pub struct SttArgs {
    /// Path to the Whisper model file
    #[arg(long, value_name = "PATH")]
    pub model: Option<String>,

    /// Language code for transcription (e.g. en, de, auto)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// RMS energy (int16 scale) above which a frame counts as speech
    #[arg(long, value_name = "RMS")]
    pub energy_threshold: Option<f32>,

    /// Minimum speech duration to transcribe, in milliseconds
    #[arg(long, value_name = "MS")]
    pub min_speech_ms: Option<u32>,

    /// Read audio from a WAV file instead of stdin
    #[arg(long, value_name = "WAV")]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct TtsArgs {
    /// Model name reported in status messages
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Default speaker voice
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Default style instruction
    #[arg(long, value_name = "TEXT")]
    pub instruct: Option<String>,

    /// Default reference audio for voice cloning
    #[arg(long, value_name = "PATH")]
    pub ref_audio: Option<String>,

    /// Transcript of the default reference audio
    #[arg(long, value_name = "TEXT")]
    pub ref_text: Option<String>,
}

impl SttArgs {
    /// Apply flags on top of file and environment settings.
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.stt.model = model.clone();
        }
        if let Some(language) = &self.language {
            config.stt.language = language.clone();
        }
        if let Some(threshold) = self.energy_threshold {
            config.vad.energy_threshold = threshold;
        }
        if let Some(min_speech_ms) = self.min_speech_ms {
            config.vad.min_speech_ms = min_speech_ms;
        }
    }
}

impl TtsArgs {
    /// Apply flags on top of file and environment settings.
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.tts.model = model.clone();
        }
        if self.voice.is_some() {
            config.tts.voice = self.voice.clone();
        }
        if self.instruct.is_some() {
            config.tts.instruct = self.instruct.clone();
        }
        if self.ref_audio.is_some() {
            config.tts.ref_audio = self.ref_audio.clone();
        }
        if self.ref_text.is_some() {
            config.tts.ref_text = self.ref_text.clone();
        }
    }
}
