//! Speech generator capability and the built-in backends.

use crate::defaults;
use crate::error::{BridgeError, Result};
use crate::protocol::messages::TtsRequest;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Text spoken during warm-up.
pub const WARMUP_TEXT: &str = "Hello.";

/// One block of generated audio at the generator's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedChunk {
    /// Mono samples normalized to [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Which voice to synthesize with.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceSelection {
    /// A named speaker, optionally with a style instruction.
    Preset {
        voice: Option<String>,
        instruct: Option<String>,
    },
    /// Clone the voice in a reference clip.
    Clone { ref_audio: String, ref_text: String },
}

/// Everything a generator needs for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisParams {
    pub text: String,
    pub voice: VoiceSelection,
}

/// Server-wide voice defaults applied to requests that omit them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisDefaults {
    pub voice: Option<String>,
    pub instruct: Option<String>,
    pub ref_audio: Option<String>,
    pub ref_text: Option<String>,
}

impl SynthesisDefaults {
    /// Merge a request with the defaults.
    ///
    /// A reference clip, from the request or the defaults, selects cloning
    /// and wins over any preset voice.
    pub fn resolve(&self, request: TtsRequest) -> SynthesisParams {
        let voice = match request.ref_audio.or_else(|| self.ref_audio.clone()) {
            Some(ref_audio) => VoiceSelection::Clone {
                ref_audio,
                ref_text: request
                    .ref_text
                    .or_else(|| self.ref_text.clone())
                    .unwrap_or_default(),
            },
            None => VoiceSelection::Preset {
                voice: request.voice.or_else(|| self.voice.clone()),
                instruct: request.instruct.or_else(|| self.instruct.clone()),
            },
        };
        SynthesisParams {
            text: request.text,
            voice,
        }
    }

    /// Parameters for the warm-up utterance.
    pub fn warm_up_params(&self) -> SynthesisParams {
        self.resolve(TtsRequest {
            text: WARMUP_TEXT.to_string(),
            ..TtsRequest::default()
        })
    }
}

/// Lazily produced chunks of one utterance.
pub type ChunkStream<'a> = Box<dyn Iterator<Item = Result<GeneratedChunk>> + 'a>;

/// Trait for streaming text-to-speech.
///
/// `generate` returns an iterator so the caller can resample and write each
/// chunk before the next one is produced.
pub trait SpeechGenerator {
    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Start generating one utterance.
    fn generate<'a>(&'a mut self, params: &SynthesisParams) -> Result<ChunkStream<'a>>;

    /// Run one throwaway utterance so the first real request is fast.
    fn warm_up(&mut self, params: &SynthesisParams) -> Result<()> {
        for chunk in self.generate(params)? {
            chunk?;
        }
        Ok(())
    }
}

/// Chunk sizes in milliseconds, cycled to mimic a model's irregular output.
const TONE_CHUNK_MS: [u32; 3] = [500, 370, 610];
const TONE_WORD_MS: u32 = 180;
const TONE_GAP_MS: u32 = 60;
const TONE_RAMP_MS: u32 = 5;
const TONE_AMPLITUDE: f32 = 0.3;

/// Deterministic generator that renders each word as a short tone.
///
/// Used to check a telephony line end to end without a neural model: the
/// output has speech-like pacing and chunking, and the same request always
/// yields the same samples.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    model_name: String,
    sample_rate: u32,
}

impl ToneGenerator {
    pub fn new(model_name: &str, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(BridgeError::ConfigInvalidValue {
                key: "tts.model_sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(Self {
            model_name: model_name.to_string(),
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn base_frequency(voice: &VoiceSelection) -> f32 {
        let key = match voice {
            VoiceSelection::Preset { voice, .. } => voice.as_deref().unwrap_or(""),
            VoiceSelection::Clone { ref_text, .. } => ref_text.as_str(),
        };
        180.0 + (fold(key) % 120) as f32
    }

    fn render(&self, params: &SynthesisParams) -> Vec<f32> {
        let rate = self.sample_rate as f32;
        let per_ms = |ms: u32| (self.sample_rate as u64 * ms as u64 / 1000) as usize;
        let word_len = per_ms(TONE_WORD_MS);
        let gap_len = per_ms(TONE_GAP_MS);
        let ramp_len = per_ms(TONE_RAMP_MS).max(1);
        let base = Self::base_frequency(&params.voice);

        let mut samples = Vec::new();
        for word in params.text.split_whitespace() {
            let freq = base + (fold(word) % 200) as f32;
            for i in 0..word_len {
                let envelope = (i.min(word_len - 1 - i) as f32 / ramp_len as f32).min(1.0);
                let phase = 2.0 * PI * freq * i as f32 / rate;
                samples.push(TONE_AMPLITUDE * envelope * phase.sin());
            }
            samples.extend(std::iter::repeat_n(0.0, gap_len));
        }
        samples
    }
}

fn fold(s: &str) -> u32 {
    s.bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

impl SpeechGenerator for ToneGenerator {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn generate<'a>(&'a mut self, params: &SynthesisParams) -> Result<ChunkStream<'a>> {
        if let VoiceSelection::Clone { ref_audio, .. } = &params.voice
            && !Path::new(ref_audio).exists()
        {
            return Err(BridgeError::Generation {
                message: format!("reference audio not found: {ref_audio}"),
                source: None,
            });
        }

        let samples = self.render(params);
        let sample_rate = self.sample_rate;
        let sizes: Vec<usize> = TONE_CHUNK_MS
            .iter()
            .map(|&ms| (sample_rate as u64 * ms as u64 / 1000) as usize)
            .collect();

        let mut position = 0;
        let mut n = 0;
        Ok(Box::new(std::iter::from_fn(move || {
            if position >= samples.len() {
                return None;
            }
            let end = (position + sizes[n % sizes.len()]).min(samples.len());
            let chunk = GeneratedChunk {
                samples: samples[position..end].to_vec(),
                sample_rate,
            };
            position = end;
            n += 1;
            Some(Ok(chunk))
        })))
    }
}

/// One step of a [`ScriptedGenerator`] utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Yield these samples at the generator's rate.
    Audio(Vec<f32>),
    /// Yield these samples at an explicit rate.
    AudioAt(u32, Vec<f32>),
    /// Yield a generation error.
    Fail(String),
    /// Yield a fatal backend error.
    BackendLost,
}

/// Mock generator that replays scripted utterances.
///
/// Each `generate` call consumes the next script; once the scripts run out
/// every utterance yields no chunks. Clones share the request log.
#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    model_name: String,
    sample_rate: u32,
    scripts: VecDeque<Vec<ScriptStep>>,
    requests: Arc<Mutex<Vec<SynthesisParams>>>,
    warm_ups: Arc<Mutex<usize>>,
}

impl ScriptedGenerator {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            sample_rate: defaults::GENERATOR_SAMPLE_RATE,
            scripts: VecDeque::new(),
            requests: Arc::new(Mutex::new(Vec::new())),
            warm_ups: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Queue the steps of the next utterance.
    pub fn with_utterance(mut self, steps: Vec<ScriptStep>) -> Self {
        self.scripts.push_back(steps);
        self
    }

    /// Parameters of every `generate` call so far.
    pub fn requests(&self) -> Vec<SynthesisParams> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn warm_ups(&self) -> usize {
        *self.warm_ups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SpeechGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn generate<'a>(&'a mut self, params: &SynthesisParams) -> Result<ChunkStream<'a>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.clone());

        let rate = self.sample_rate;
        let steps = self.scripts.pop_front().unwrap_or_default();
        Ok(Box::new(steps.into_iter().map(move |step| match step {
            ScriptStep::Audio(samples) => Ok(GeneratedChunk {
                samples,
                sample_rate: rate,
            }),
            ScriptStep::AudioAt(sample_rate, samples) => Ok(GeneratedChunk {
                samples,
                sample_rate,
            }),
            ScriptStep::Fail(message) => Err(BridgeError::Generation {
                message,
                source: None,
            }),
            ScriptStep::BackendLost => Err(BridgeError::BackendUnavailable {
                message: "scripted backend lost".to_string(),
            }),
        })))
    }

    fn warm_up(&mut self, _params: &SynthesisParams) -> Result<()> {
        *self.warm_ups.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
