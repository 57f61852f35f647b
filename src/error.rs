//! Error types for telebridge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio errors
    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    #[error("Resampler error: {message}")]
    Resample { message: String },

    // Inference errors
    #[error("Transcription model not found at {path}")]
    TranscriptionModelNotFound { path: String },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Generation failed: {message}")]
    Generation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The inference backend can no longer serve requests.
    #[error("Inference backend unavailable: {message}")]
    BackendUnavailable { message: String },

    // Protocol errors
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Empty text")]
    EmptyText,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Whether the process must stop after reporting this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::BackendUnavailable { .. })
    }

    /// Render the full source chain, one cause per line.
    ///
    /// Causes whose text is already part of the rendering are skipped, so
    /// variants that embed their source in the message add nothing.
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !detail.contains(&text) {
                detail.push_str("\ncaused by: ");
                detail.push_str(&text);
            }
            source = cause.source();
        }
        detail
    }
}

impl From<rubato::ResampleError> for BridgeError {
    fn from(err: rubato::ResampleError) -> Self {
        BridgeError::Resample {
            message: err.to_string(),
        }
    }
}

impl From<rubato::ResamplerConstructionError> for BridgeError {
    fn from(err: rubato::ResamplerConstructionError) -> Self {
        BridgeError::Resample {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = BridgeError::ConfigInvalidValue {
            key: "vad.frame_ms".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for vad.frame_ms: must be positive"
        );
    }

    #[test]
    fn test_audio_format_mismatch_display() {
        let error = BridgeError::AudioFormatMismatch {
            expected: "8000Hz mono".to_string(),
            actual: "44100Hz stereo".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio format mismatch: expected 8000Hz mono, got 44100Hz stereo"
        );
    }

    #[test]
    fn test_empty_text_display() {
        assert_eq!(BridgeError::EmptyText.to_string(), "Empty text");
    }

    #[test]
    fn test_invalid_json_display_has_prefix() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let error: BridgeError = json_err.into();
        assert!(error.to_string().starts_with("Invalid JSON: "));
    }

    #[test]
    fn test_only_backend_unavailable_is_fatal() {
        assert!(
            BridgeError::BackendUnavailable {
                message: "device lost".to_string()
            }
            .is_fatal()
        );
        assert!(
            !BridgeError::Transcription {
                message: "bad audio".to_string()
            }
            .is_fatal()
        );
        assert!(!BridgeError::EmptyText.is_fatal());
    }

    #[test]
    fn test_detail_includes_source_chain() {
        let error = BridgeError::Generation {
            message: "decoder step failed".to_string(),
            source: Some(Box::new(io::Error::other("tensor shape mismatch"))),
        };
        let detail = error.detail();
        assert!(detail.starts_with("Generation failed: decoder step failed"));
        assert!(detail.contains("caused by: tensor shape mismatch"));
    }

    #[test]
    fn test_detail_skips_source_already_in_message() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let error = BridgeError::from(parse_error);
        assert_eq!(error.detail(), error.to_string());

        let error = BridgeError::from(io::Error::other("broken pipe"));
        assert_eq!(error.detail(), "I/O error: broken pipe");
    }

    #[test]
    fn test_detail_without_source_is_display() {
        let error = BridgeError::Other("plain".to_string());
        assert_eq!(error.detail(), "plain");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let error: BridgeError = io_error.into();
        assert!(error.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: BridgeError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BridgeError>();
        assert_sync::<BridgeError>();
    }
}
