//! WAV file frame source for offline STT runs.

use crate::audio::frame::{AudioFrame, FrameSource};
use crate::audio::pcm::{quantize_all, to_float};
use crate::audio::resample::resample_all;
use crate::error::{BridgeError, Result};
use std::io::Read;

/// Frame source backed by a WAV file.
///
/// Accepts 16-bit integer mono or stereo input at any rate; stereo is
/// downmixed and other rates are resampled to the target rate. A trailing
/// partial frame is dropped, matching the raw byte-stream reader.
pub struct WavFrameSource {
    samples: Vec<i16>,
    position: usize,
    frame_samples: usize,
    sample_rate: u32,
    next_index: u64,
}

impl WavFrameSource {
    /// Create from any reader, producing frames of `frame_samples` at `sample_rate`.
    pub fn from_reader<R: Read>(reader: R, frame_samples: usize, sample_rate: u32) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| BridgeError::AudioFormatMismatch {
                expected: "WAV file".to_string(),
                actual: format!("unparseable input ({})", e),
            })?;

        let spec = wav_reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(BridgeError::AudioFormatMismatch {
                expected: "16-bit integer PCM".to_string(),
                actual: format!("{}-bit {:?}", spec.bits_per_sample, spec.sample_format),
            });
        }
        if spec.channels == 0 || spec.channels > 2 {
            return Err(BridgeError::AudioFormatMismatch {
                expected: "mono or stereo".to_string(),
                actual: format!("{} channels", spec.channels),
            });
        }

        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| BridgeError::AudioFormatMismatch {
                expected: "readable WAV samples".to_string(),
                actual: e.to_string(),
            })?;

        let mono_samples = if spec.channels == 2 {
            raw_samples
                .chunks_exact(2)
                .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
                .collect()
        } else {
            raw_samples
        };

        let samples = if spec.sample_rate != sample_rate {
            let converted = resample_all(&to_float(&mono_samples), spec.sample_rate, sample_rate)?;
            quantize_all(&converted)
        } else {
            mono_samples
        };

        Ok(Self {
            samples,
            position: 0,
            frame_samples,
            sample_rate,
            next_index: 0,
        })
    }

    /// Number of samples after conversion.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the file held no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl FrameSource for WavFrameSource {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        let end = self.position + self.frame_samples;
        if end > self.samples.len() {
            return Ok(None);
        }

        let frame = AudioFrame::new(
            self.next_index,
            self.samples[self.position..end].to_vec(),
            self.sample_rate,
        );
        self.position = end;
        self.next_index += 1;
        Ok(Some(frame))
    }
}
