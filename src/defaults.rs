//! Default configuration constants for telebridge.
//!
//! The VAD thresholds are empirically tuned for 8kHz telephony audio. They are
//! kept as configurable defaults rather than derived values.

/// Telephony sample rate in Hz (both directions on the wire).
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Duration of one ingress VAD frame in milliseconds.
///
/// The producer and the segmentation engine must agree on this quantum:
/// 30ms at 8kHz is 240 samples (480 bytes).
pub const VAD_FRAME_MS: u32 = 30;

/// RMS energy threshold for a voiced frame, on the raw int16 scale.
pub const ENERGY_THRESHOLD: f32 = 150.0;

/// Consecutive voiced frames required to confirm speech.
pub const SPEECH_FRAMES: u32 = 5;

/// Consecutive silent frames that end an utterance (~900ms).
pub const SILENCE_FRAMES: u32 = 30;

/// Minimum speaking time for a segment to be transcribed.
pub const MIN_SPEECH_MS: u32 = 200;

/// Speaking time after which an utterance is force-ended.
pub const MAX_SPEECH_MS: u32 = 30_000;

/// Egress frame size in bytes: 160 samples = 20ms at 8kHz.
pub const OUTPUT_FRAME_BYTES: usize = 320;

/// Native sample rate of the speech generator.
pub const GENERATOR_SAMPLE_RATE: u32 = 24_000;

/// Sample rate expected by Whisper models.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Default language code for transcription.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Default Whisper model path.
pub const DEFAULT_STT_MODEL: &str = "models/ggml-small.en.bin";

/// Default generator backend name.
pub const DEFAULT_TTS_BACKEND: &str = "tone";

/// Input block size of the streaming resampler, in source-rate samples.
pub const RESAMPLER_BLOCK: usize = 1024;

/// Length of the warm-up clip handed to the transcriber before `ready`.
pub const WARMUP_MS: u32 = 1000;
