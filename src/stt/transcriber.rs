use crate::audio::pcm::to_float;
use crate::audio::resample::resample_all;
use crate::audio::vad::SpeechSegment;
use crate::clock::{Clock, ManualClock, SystemClock};
use crate::defaults;
use crate::error::{BridgeError, Result};
use crate::protocol::messages::{SttEvent, round2};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real Whisper vs mock).
pub trait Transcriber: Send + Sync {
    /// Transcribe mono float samples normalized to [-1.0, 1.0] at
    /// [`Transcriber::sample_rate`].
    fn transcribe(&self, audio: &[f32]) -> Result<String>;

    /// Sample rate the model expects.
    fn sample_rate(&self) -> u32 {
        defaults::WHISPER_SAMPLE_RATE
    }

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the transcriber is ready
    fn is_ready(&self) -> bool;
}

/// Implement Transcriber for Arc<T> so a test can keep a handle to its mock.
impl<T: Transcriber> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[f32]) -> Result<String> {
        (**self).transcribe(audio)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// A finished transcription of one speech segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    pub text: String,
    /// Segment audio duration in seconds, rounded to 2 decimals.
    pub duration: f64,
    /// Conversion plus inference time in seconds, rounded to 2 decimals.
    pub latency: f64,
}

impl TranscriptResult {
    pub fn into_event(self) -> SttEvent {
        SttEvent::Transcript {
            text: self.text,
            duration: self.duration,
            latency: self.latency,
        }
    }
}

/// Turns speech segments into transcripts using an injected [`Transcriber`].
///
/// Segments arrive as 16-bit PCM at the telephony rate; the adapter
/// normalizes them to floats and resamples to the model's rate before the
/// call.
pub struct TranscriptionAdapter<T: Transcriber, C: Clock = SystemClock> {
    transcriber: T,
    clock: C,
}

impl<T: Transcriber> TranscriptionAdapter<T> {
    pub fn new(transcriber: T) -> Self {
        Self::with_clock(transcriber, SystemClock)
    }
}

impl<T: Transcriber, C: Clock> TranscriptionAdapter<T, C> {
    pub fn with_clock(transcriber: T, clock: C) -> Self {
        Self { transcriber, clock }
    }

    pub fn transcriber(&self) -> &T {
        &self.transcriber
    }

    /// Run one transcription on a second of silence.
    ///
    /// The first inference call on a fresh model is much slower than the
    /// rest, so this is done before reporting ready.
    pub fn warm_up(&self) -> Result<()> {
        let len = (self.transcriber.sample_rate() as u64 * defaults::WARMUP_MS as u64 / 1000) as usize;
        self.transcriber.transcribe(&vec![0.0; len])?;
        Ok(())
    }

    /// Transcribe a segment.
    ///
    /// Returns `Ok(None)` when the model produced only whitespace.
    pub fn transcribe_segment(&self, segment: &SpeechSegment) -> Result<Option<TranscriptResult>> {
        let started = self.clock.now();

        let normalized = to_float(&segment.samples);
        let target_rate = self.transcriber.sample_rate();
        let audio = if segment.sample_rate == target_rate {
            normalized
        } else {
            resample_all(&normalized, segment.sample_rate, target_rate)?
        };

        let text = self.transcriber.transcribe(&audio)?;
        let latency = self.clock.elapsed(started);

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let duration = segment.samples.len() as f64 / segment.sample_rate as f64;
        Ok(Some(TranscriptResult {
            text: text.to_string(),
            duration: round2(duration),
            latency: round2(latency.as_secs_f64()),
        }))
    }
}

/// How a [`MockTranscriber`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// A recoverable transcription error.
    Transcription,
    /// The backend is gone; the server must stop.
    BackendLost,
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    sample_rate: u32,
    failure: Option<MockFailure>,
    latency: Option<(ManualClock, Duration)>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            sample_rate: defaults::WHISPER_SAMPLE_RATE,
            failure: None,
            latency: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.failure = Some(MockFailure::Transcription);
        self
    }

    /// Configure the mock to report its backend as lost
    pub fn with_backend_lost(mut self) -> Self {
        self.failure = Some(MockFailure::BackendLost);
        self
    }

    /// Expect audio at `sample_rate` instead of 16kHz
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Advance `clock` by `latency` on every call
    pub fn with_latency(mut self, clock: ManualClock, latency: Duration) -> Self {
        self.latency = Some((clock, latency));
        self
    }

    /// Sample counts of every audio buffer received so far.
    pub fn calls(&self) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, audio: &[f32]) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(audio.len());
        if let Some((clock, latency)) = &self.latency {
            clock.advance(*latency);
        }

        match self.failure {
            Some(MockFailure::Transcription) => Err(BridgeError::Transcription {
                message: "mock transcription failure".to_string(),
            }),
            Some(MockFailure::BackendLost) => Err(BridgeError::BackendUnavailable {
                message: "mock backend lost".to_string(),
            }),
            None => Ok(self.response.clone()),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        self.failure.is_none()
    }
}
