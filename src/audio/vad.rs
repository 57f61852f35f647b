//! Voice Activity Detection and utterance segmentation.
//!
//! Classifies fixed-size frames as voiced or silent by RMS energy, then runs a
//! two-state hysteresis machine that confirms speech after a run of voiced
//! frames and ends it after a run of silent frames or a duration cap.
//!
//! Timing is measured on the stream clock (frames processed × frame
//! duration), so segmentation of piped audio does not depend on how fast the
//! bytes arrive.

use crate::audio::frame::AudioFrame;
use crate::defaults;
use std::collections::VecDeque;

/// Configuration for the segmentation engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterConfig {
    /// Sample rate of incoming frames in Hz.
    pub sample_rate: u32,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
    /// RMS energy (int16 scale) above which a frame counts as voiced.
    pub energy_threshold: f32,
    /// Consecutive voiced frames needed to confirm speech.
    pub speech_frames: u32,
    /// Consecutive silent frames that end an utterance.
    pub silence_frames: u32,
    /// Minimum speaking time for a segment to be kept (milliseconds).
    pub min_speech_ms: u32,
    /// Speaking time that force-ends an utterance (milliseconds).
    pub max_speech_ms: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::TELEPHONY_SAMPLE_RATE,
            frame_ms: defaults::VAD_FRAME_MS,
            energy_threshold: defaults::ENERGY_THRESHOLD,
            speech_frames: defaults::SPEECH_FRAMES,
            silence_frames: defaults::SILENCE_FRAMES,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            max_speech_ms: defaults::MAX_SPEECH_MS,
        }
    }
}

impl SegmenterConfig {
    /// Samples per frame (240 at 8kHz / 30ms).
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as u64 * self.frame_ms as u64 / 1000) as usize
    }

    /// Capacity of the pre-roll buffer in frames.
    pub fn pre_roll_frames(&self) -> usize {
        self.speech_frames as usize * 2
    }
}

/// Current mode of the segmentation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// Not in speech.
    Idle,
    /// Accumulating an utterance.
    Speaking,
}

/// Why an utterance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The silence run reached the silence threshold.
    Silence,
    /// Speaking time reached the duration cap.
    MaxDuration,
    /// Input ended while speaking.
    EndOfStream,
}

/// One finalized utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    /// Concatenated samples, pre-roll included.
    pub samples: Vec<i16>,
    /// Stream time of the first sample in milliseconds.
    pub start_ms: u64,
    /// Duration of `samples` in milliseconds.
    pub duration_ms: u64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// What ended the utterance.
    pub end_reason: EndReason,
}

/// Events emitted by the segmentation engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    /// Speech was confirmed.
    SpeechStarted,
    /// Speech ended. `segment` is `None` when it was too short to keep.
    SpeechStopped {
        reason: EndReason,
        segment: Option<SpeechSegment>,
    },
}

/// Energy VAD with hysteresis.
///
/// Emits exactly one `SpeechStarted` per entry into `Speaking` and exactly one
/// `SpeechStopped` per exit.
pub struct SegmentationEngine {
    config: SegmenterConfig,
    mode: SegmentationMode,
    voiced_run: u32,
    silent_run: u32,
    speaking_frames: u32,
    pre_roll: VecDeque<AudioFrame>,
    segment: Vec<i16>,
    segment_start_ms: u64,
    last_level: f32,
}

impl SegmentationEngine {
    /// Creates a new engine in the `Idle` state.
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            mode: SegmentationMode::Idle,
            voiced_run: 0,
            silent_run: 0,
            speaking_frames: 0,
            pre_roll: VecDeque::with_capacity(config.pre_roll_frames()),
            segment: Vec::new(),
            segment_start_ms: 0,
            last_level: 0.0,
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Returns the current mode.
    pub fn mode(&self) -> SegmentationMode {
        self.mode
    }

    /// RMS energy of the most recent frame.
    pub fn last_level(&self) -> f32 {
        self.last_level
    }

    /// Updates the energy threshold without resetting state.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.config.energy_threshold = threshold;
    }

    /// Processes one frame and returns the event it caused, if any.
    pub fn process_frame(&mut self, frame: AudioFrame) -> Option<SegmentEvent> {
        let level = rms_energy(&frame.samples);
        self.last_level = level;
        let voiced = level > self.config.energy_threshold;

        match self.mode {
            SegmentationMode::Idle => self.on_idle_frame(frame, voiced),
            SegmentationMode::Speaking => self.on_speaking_frame(frame, voiced),
        }
    }

    /// Handles end of input: finalizes an in-progress utterance.
    pub fn finish(&mut self) -> Option<SegmentEvent> {
        if self.mode == SegmentationMode::Speaking && !self.segment.is_empty() {
            return Some(self.end_utterance(EndReason::EndOfStream));
        }
        self.reset();
        None
    }

    /// Returns to `Idle`, discarding any buffered audio.
    pub fn reset(&mut self) {
        self.mode = SegmentationMode::Idle;
        self.voiced_run = 0;
        self.silent_run = 0;
        self.speaking_frames = 0;
        self.pre_roll.clear();
        self.segment = Vec::new();
        self.segment_start_ms = 0;
    }

    fn on_idle_frame(&mut self, frame: AudioFrame, voiced: bool) -> Option<SegmentEvent> {
        if voiced {
            self.voiced_run += 1;
        } else {
            self.voiced_run = 0;
        }

        if self.pre_roll.len() == self.config.pre_roll_frames() {
            self.pre_roll.pop_front();
        }
        self.pre_roll.push_back(frame);

        if voiced && self.voiced_run >= self.config.speech_frames {
            self.start_utterance();
            return Some(SegmentEvent::SpeechStarted);
        }
        None
    }

    fn start_utterance(&mut self) {
        self.mode = SegmentationMode::Speaking;
        self.silent_run = 0;
        self.speaking_frames = 0;
        self.segment_start_ms = self
            .pre_roll
            .front()
            .map(|f| f.index * self.config.frame_ms as u64)
            .unwrap_or(0);
        let mut samples = Vec::new();
        for frame in self.pre_roll.drain(..) {
            samples.extend_from_slice(&frame.samples);
        }
        self.segment = samples;
    }

    fn on_speaking_frame(&mut self, frame: AudioFrame, voiced: bool) -> Option<SegmentEvent> {
        self.segment.extend_from_slice(&frame.samples);
        self.speaking_frames += 1;

        if voiced {
            self.silent_run = 0;
        } else {
            self.silent_run += 1;
        }

        if self.silent_run >= self.config.silence_frames {
            Some(self.end_utterance(EndReason::Silence))
        } else if self.speaking_ms() >= self.config.max_speech_ms as u64 {
            Some(self.end_utterance(EndReason::MaxDuration))
        } else {
            None
        }
    }

    /// Speaking time since speech was confirmed.
    fn speaking_ms(&self) -> u64 {
        self.speaking_frames as u64 * self.config.frame_ms as u64
    }

    fn end_utterance(&mut self, reason: EndReason) -> SegmentEvent {
        let keep = self.speaking_ms() >= self.config.min_speech_ms as u64;
        let samples = std::mem::take(&mut self.segment);
        let segment = keep.then(|| SpeechSegment {
            duration_ms: samples.len() as u64 * 1000 / self.config.sample_rate as u64,
            samples,
            start_ms: self.segment_start_ms,
            sample_rate: self.config.sample_rate,
            end_reason: reason,
        });
        self.reset();
        SegmentEvent::SpeechStopped { reason, segment }
    }
}

/// Calculates the RMS energy of 16-bit samples on the raw int16 scale.
///
/// Samples are widened to `f64` before squaring. Returns 0.0 for an empty
/// buffer.
pub fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let value = sample as f64;
            value * value
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}
