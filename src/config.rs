use crate::audio::vad::SegmenterConfig;
use crate::defaults;
use crate::error::{BridgeError, Result};
use crate::stt::whisper::WhisperConfig;
use crate::tts::generator::SynthesisDefaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub vad: VadSettings,
    pub stt: SttConfig,
    pub tts: TtsConfig,
}

/// Speech segmentation tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadSettings {
    /// RMS energy on the int16 scale
    pub energy_threshold: f32,
    pub speech_frames: u32,
    pub silence_frames: u32,
    pub min_speech_ms: u32,
    pub max_speech_ms: u32,
    pub frame_ms: u32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Path to a ggml Whisper model
    pub model: String,
    pub language: String,
    pub threads: Option<usize>,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    /// Model name reported in status messages
    pub model: String,
    pub backend: String,
    pub voice: Option<String>,
    pub instruct: Option<String>,
    pub ref_audio: Option<String>,
    pub ref_text: Option<String>,
    /// Native rate of the generator's output
    pub model_sample_rate: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            energy_threshold: defaults::ENERGY_THRESHOLD,
            speech_frames: defaults::SPEECH_FRAMES,
            silence_frames: defaults::SILENCE_FRAMES,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            max_speech_ms: defaults::MAX_SPEECH_MS,
            frame_ms: defaults::VAD_FRAME_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_STT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_TTS_BACKEND.to_string(),
            backend: defaults::DEFAULT_TTS_BACKEND.to_string(),
            voice: None,
            instruct: None,
            ref_audio: None,
            ref_text: None,
            model_sample_rate: defaults::GENERATOR_SAMPLE_RATE,
        }
    }
}

impl VadSettings {
    /// Segmenter configuration for frames at `sample_rate`.
    pub fn to_segmenter_config(&self, sample_rate: u32) -> SegmenterConfig {
        SegmenterConfig {
            sample_rate,
            frame_ms: self.frame_ms,
            energy_threshold: self.energy_threshold,
            speech_frames: self.speech_frames,
            silence_frames: self.silence_frames,
            min_speech_ms: self.min_speech_ms,
            max_speech_ms: self.max_speech_ms,
        }
    }
}

impl SttConfig {
    pub fn whisper_config(&self) -> WhisperConfig {
        WhisperConfig {
            model_path: PathBuf::from(&self.model),
            language: self.language.clone(),
            threads: self.threads,
        }
    }
}

impl TtsConfig {
    pub fn synthesis_defaults(&self) -> SynthesisDefaults {
        SynthesisDefaults {
            voice: self.voice.clone(),
            instruct: self.instruct.clone(),
            ref_audio: self.ref_audio.clone(),
            ref_text: self.ref_text.clone(),
        }
    }
}

fn invalid(key: &str, message: &str) -> BridgeError {
    BridgeError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(BridgeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables (empty values are ignored):
    /// - TELEBRIDGE_STT_MODEL → stt.model
    /// - TELEBRIDGE_STT_LANGUAGE → stt.language
    /// - TELEBRIDGE_TTS_MODEL → tts.model
    /// - TELEBRIDGE_TTS_VOICE → tts.voice
    /// - TELEBRIDGE_ENERGY_THRESHOLD → vad.energy_threshold
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(model) = std::env::var("TELEBRIDGE_STT_MODEL")
            && !model.is_empty()
        {
            self.stt.model = model;
        }

        if let Ok(language) = std::env::var("TELEBRIDGE_STT_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }

        if let Ok(model) = std::env::var("TELEBRIDGE_TTS_MODEL")
            && !model.is_empty()
        {
            self.tts.model = model;
        }

        if let Ok(voice) = std::env::var("TELEBRIDGE_TTS_VOICE")
            && !voice.is_empty()
        {
            self.tts.voice = Some(voice);
        }

        if let Ok(threshold) = std::env::var("TELEBRIDGE_ENERGY_THRESHOLD")
            && !threshold.is_empty()
        {
            self.vad.energy_threshold = threshold.trim().parse().map_err(|_| {
                invalid(
                    "TELEBRIDGE_ENERGY_THRESHOLD",
                    &format!("not a number: {threshold:?}"),
                )
            })?;
        }

        Ok(self)
    }

    /// Reject values the servers cannot run with.
    pub fn validate(&self) -> Result<()> {
        let vad = &self.vad;
        if !vad.energy_threshold.is_finite() || vad.energy_threshold < 0.0 {
            return Err(invalid(
                "vad.energy_threshold",
                "must be a non-negative number",
            ));
        }
        if vad.frame_ms == 0 {
            return Err(invalid("vad.frame_ms", "must be positive"));
        }
        if vad.speech_frames == 0 {
            return Err(invalid("vad.speech_frames", "must be positive"));
        }
        if vad.silence_frames == 0 {
            return Err(invalid("vad.silence_frames", "must be positive"));
        }
        if vad.max_speech_ms < vad.min_speech_ms {
            return Err(invalid(
                "vad.max_speech_ms",
                "must not be below vad.min_speech_ms",
            ));
        }
        if self.stt.threads == Some(0) {
            return Err(invalid("stt.threads", "must be positive"));
        }
        if self.tts.model_sample_rate == 0 {
            return Err(invalid("tts.model_sample_rate", "must be positive"));
        }
        if self.tts.backend != defaults::DEFAULT_TTS_BACKEND {
            return Err(invalid(
                "tts.backend",
                &format!("unknown backend {:?}", self.tts.backend),
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/telebridge/config.toml on Linux, or `None` when the
    /// platform has no config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("telebridge").join("config.toml"))
    }
}
