//! Streaming sample-rate conversion.
//!
//! Input arrives in chunks of arbitrary length. The resampler re-blocks it
//! into fixed-size blocks for a windowed-sinc filter and keeps the unconsumed
//! remainder and the filter history between calls, so feeding a signal in one
//! piece or in many pieces yields the same samples.
//!
//! Output sample `k` lines up with input time `k × input_rate / output_rate`:
//! the filter is primed with a few zeros and its first outputs are skipped to
//! cancel the offset the sinc stage introduces. The final call
//! (`is_final = true`) pushes the buffered tail through, trimming the total
//! output to `round(input_len × output_rate / input_rate)`.

use crate::defaults;
use crate::error::{BridgeError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const SINC_LEN: usize = 128;

/// Upper bound on zero blocks pushed through the filter while draining.
const MAX_DRAIN_BLOCKS: usize = 8;

/// Largest number of leading outputs skipped when searching for alignment.
const MAX_ALIGN_SKIP: u64 = 8;

/// Stateful mono resampler with an explicit terminal flush.
pub struct StreamingResampler {
    input_rate: u32,
    output_rate: u32,
    block: usize,
    filter: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
    alignment: Alignment,
    skip_remaining: usize,
    consumed: u64,
    emitted: u64,
}

impl StreamingResampler {
    /// Creates a resampler with the default input block size.
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        Self::with_block(input_rate, output_rate, defaults::RESAMPLER_BLOCK)
    }

    /// Creates a resampler that filters `block` input samples at a time.
    pub fn with_block(input_rate: u32, output_rate: u32, block: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(BridgeError::ConfigInvalidValue {
                key: "sample_rate".to_string(),
                message: format!("rates must be positive, got {input_rate} -> {output_rate}"),
            });
        }
        if block == 0 {
            return Err(BridgeError::ConfigInvalidValue {
                key: "resampler_block".to_string(),
                message: "block size must be positive".to_string(),
            });
        }

        let filter = build_filter(input_rate, output_rate, block)?;
        let alignment = match filter {
            Some(_) => Alignment::for_rates(input_rate, output_rate),
            None => Alignment::default(),
        };

        Ok(Self {
            input_rate,
            output_rate,
            block,
            filter,
            pending: vec![0.0; alignment.lead],
            alignment,
            skip_remaining: alignment.skip,
            consumed: 0,
            emitted: 0,
        })
    }

    /// Source sample rate in Hz.
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Target sample rate in Hz.
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Converts one chunk, returning whatever output is ready.
    ///
    /// Call once more with an empty chunk and `is_final = true` at the end of
    /// an utterance to drain the tail. After the final call the resampler
    /// starts over with fresh state.
    pub fn resample_chunk(&mut self, chunk: &[f32], is_final: bool) -> Result<Vec<f32>> {
        self.consumed += chunk.len() as u64;

        let Some(filter) = self.filter.as_mut() else {
            let out = chunk.to_vec();
            self.emitted += out.len() as u64;
            if is_final {
                self.restart()?;
            }
            return Ok(out);
        };

        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();
        let mut offset = 0;
        while self.pending.len() - offset >= self.block {
            let produced = filter.process(&[&self.pending[offset..offset + self.block]], None)?;
            offset += self.block;
            skip_leading(&mut out, &produced[0], &mut self.skip_remaining);
        }
        self.pending.drain(..offset);

        if is_final {
            let expected = expected_len(self.consumed, self.input_rate, self.output_rate);

            if !self.pending.is_empty() {
                let tail: [&[f32]; 1] = [self.pending.as_slice()];
                let produced = filter.process_partial(Some(&tail[..]), None)?;
                skip_leading(&mut out, &produced[0], &mut self.skip_remaining);
            }

            let mut drained = 0;
            while self.emitted + (out.len() as u64) < expected && drained < MAX_DRAIN_BLOCKS {
                let produced = filter.process_partial(None::<&[&[f32]]>, None)?;
                skip_leading(&mut out, &produced[0], &mut self.skip_remaining);
                drained += 1;
            }

            let allowed = expected.saturating_sub(self.emitted) as usize;
            out.truncate(allowed);
        }

        self.emitted += out.len() as u64;
        if is_final {
            self.restart()?;
        }
        Ok(out)
    }

    /// Resets all carried state for a new utterance.
    fn restart(&mut self) -> Result<()> {
        self.filter = build_filter(self.input_rate, self.output_rate, self.block)?;
        self.skip_remaining = self.alignment.skip;
        self.pending.clear();
        self.pending.resize(self.alignment.lead, 0.0);
        self.consumed = 0;
        self.emitted = 0;
        Ok(())
    }
}

/// Resample a complete buffer in one shot.
pub fn resample_all(samples: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    let mut resampler = StreamingResampler::new(input_rate, output_rate)?;
    let mut out = resampler.resample_chunk(samples, false)?;
    out.extend(resampler.resample_chunk(&[], true)?);
    Ok(out)
}

fn build_filter(input_rate: u32, output_rate: u32, block: usize) -> Result<Option<SincFixedIn<f32>>> {
    if input_rate == output_rate {
        return Ok(None);
    }
    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = output_rate as f64 / input_rate as f64;
    Ok(Some(SincFixedIn::<f32>::new(ratio, 1.1, params, block, 1)?))
}

fn expected_len(consumed: u64, input_rate: u32, output_rate: u32) -> u64 {
    let input_rate = input_rate as u64;
    (consumed * output_rate as u64 + input_rate / 2) / input_rate
}

/// Priming that cancels the sinc stage's time offset.
///
/// With `t = input_rate / output_rate`, `SincFixedIn` centres output `k` on
/// input position `(k + 1)·t − 1`. Feeding `lead` zeros first and dropping
/// the first `skip` outputs moves output `j` to `j·t` whenever
/// `(skip + 1)·t − 1 = lead`. The pair with the smallest remainder is chosen;
/// for integer-related rates the remainder is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Alignment {
    lead: usize,
    skip: usize,
}

impl Alignment {
    fn for_rates(input_rate: u32, output_rate: u32) -> Self {
        let (input, output) = (input_rate as u64, output_rate as u64);
        let mut best: Option<(u64, Self)> = None;
        for skip in 0..=MAX_ALIGN_SKIP {
            // (skip + 1)·t − 1, scaled by output_rate
            let Some(offset) = ((skip + 1) * input).checked_sub(output) else {
                continue;
            };
            let lead = (offset + output / 2) / output;
            let remainder = offset.abs_diff(lead * output);
            if best.is_none_or(|(r, _)| remainder < r) {
                best = Some((
                    remainder,
                    Self {
                        lead: lead as usize,
                        skip: skip as usize,
                    },
                ));
            }
            if remainder == 0 {
                break;
            }
        }
        best.map(|(_, alignment)| alignment).unwrap_or_default()
    }
}

/// Append `produced` to `out`, dropping outputs still owed to the alignment.
fn skip_leading(out: &mut Vec<f32>, produced: &[f32], skip_remaining: &mut usize) {
    let skip = (*skip_remaining).min(produced.len());
    *skip_remaining -= skip;
    out.extend_from_slice(&produced[skip..]);
}
