//! JSON-line message types shared by the STT and TTS servers.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Events written to the STT data-out stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SttEvent {
    /// Speech was confirmed.
    SpeechStarted,
    /// Speech ended.
    SpeechStopped,
    /// A finalized utterance was transcribed.
    Transcript {
        text: String,
        /// Audio duration in seconds.
        duration: f64,
        /// Transcription wall time in seconds.
        latency: f64,
    },
}

/// Messages written to the status stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Loading {
        model: String,
    },
    WarmingUp,
    Ready {
        model: String,
        sample_rate: u32,
    },
    Generating {
        text_length: usize,
    },
    Chunk {
        n: usize,
        samples: usize,
        bytes: u64,
    },
    Done {
        audio_duration: f64,
        gen_time: f64,
        rtf: f64,
        chunks: usize,
        bytes: u64,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Diagnostic line, only written in verbose mode.
    Log {
        message: String,
    },
    Shutdown,
}

impl Status {
    /// Error status carrying only a message.
    pub fn error(message: impl Into<String>) -> Self {
        Status::Error {
            message: message.into(),
            detail: None,
        }
    }

    /// Error status with the error's full source chain as detail.
    pub fn from_error(error: &BridgeError) -> Self {
        let message = error.to_string();
        let detail = error.detail();
        Status::Error {
            detail: (detail != message).then_some(detail),
            message,
        }
    }
}

/// One synthesis request read from the TTS request stream.
///
/// Missing optional fields fall back to server defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_text: Option<String>,
}

impl TtsRequest {
    /// Parse one request line.
    ///
    /// Returns `Ok(None)` for blank lines. Invalid JSON and empty text are
    /// errors; the returned request's text is trimmed.
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut request: TtsRequest = serde_json::from_str(line)?;
        let text = request.text.trim();
        if text.is_empty() {
            return Err(BridgeError::EmptyText);
        }
        request.text = text.to_string();
        Ok(Some(request))
    }
}

/// Round to two decimals for status and event payloads.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
