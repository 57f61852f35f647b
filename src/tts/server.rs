//! TTS server loop: JSON requests in, framed telephony audio out.

use crate::audio::pcm::quantize_all;
use crate::audio::resample::StreamingResampler;
use crate::clock::{Clock, SystemClock};
use crate::defaults;
use crate::error::{BridgeError, Result};
use crate::protocol::channel::{LineReader, StatusReporter};
use crate::protocol::framing::FrameWriter;
use crate::protocol::messages::{Status, TtsRequest, round2};
use crate::tts::generator::{SpeechGenerator, SynthesisDefaults, SynthesisParams};
use std::io::{BufRead, Write};

/// Error message when an utterance produced no samples.
pub const NO_AUDIO_GENERATED: &str = "No audio generated";

/// Counters reported when the request stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtsSummary {
    pub requests: u64,
    pub utterances: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct UtteranceProgress {
    chunks: usize,
    samples: usize,
}

/// One TTS session over a single request stream.
pub struct TtsServer<G: SpeechGenerator, C: Clock = SystemClock> {
    generator: G,
    defaults: SynthesisDefaults,
    output_rate: u32,
    clock: C,
    summary: TtsSummary,
}

impl<G: SpeechGenerator> TtsServer<G> {
    pub fn new(generator: G, defaults: SynthesisDefaults) -> Self {
        Self::with_clock(generator, defaults, SystemClock)
    }
}

impl<G: SpeechGenerator, C: Clock> TtsServer<G, C> {
    pub fn with_clock(generator: G, defaults: SynthesisDefaults, clock: C) -> Self {
        Self {
            generator,
            defaults,
            output_rate: defaults::TELEPHONY_SAMPLE_RATE,
            clock,
            summary: TtsSummary::default(),
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Warm the generator with the default voice.
    pub fn warm_up(&mut self) -> Result<()> {
        let params = self.defaults.warm_up_params();
        self.generator.warm_up(&params)
    }

    /// Serve request lines until end of input.
    ///
    /// Malformed requests are reported and skipped. Every accepted request
    /// ends with exactly one utterance boundary on `frames`, whether or not
    /// it produced audio. Only fatal errors and output I/O errors stop the
    /// loop.
    pub fn run<R: BufRead, W: Write, E: Write>(
        &mut self,
        requests: &mut LineReader<R>,
        frames: &mut FrameWriter<W>,
        status: &mut StatusReporter<E>,
    ) -> Result<TtsSummary> {
        while let Some(line) = requests.next_line()? {
            let request = match TtsRequest::parse_line(&line) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    status.error(&e)?;
                    continue;
                }
            };
            self.summary.requests += 1;
            let params = self.defaults.resolve(request);
            self.speak(&params, frames, status)?;
        }

        let summary = self.summary;
        status.log(|| {
            format!(
                "input ended after {} requests, {} utterances, {} failures",
                summary.requests, summary.utterances, summary.failures
            )
        })?;
        Ok(summary)
    }

    /// Synthesize one utterance and close it with a boundary.
    ///
    /// Recoverable failures are reported here; a fatal error closes the
    /// utterance and is returned unreported.
    pub fn speak<W: Write, E: Write>(
        &mut self,
        params: &SynthesisParams,
        frames: &mut FrameWriter<W>,
        status: &mut StatusReporter<E>,
    ) -> Result<()> {
        status.status(&Status::Generating {
            text_length: params.text.chars().count(),
        })?;
        status.log(|| format!("voice {:?}", params.voice))?;

        let started = self.clock.now();
        let mut progress = UtteranceProgress::default();
        let outcome = stream_utterance(
            &mut self.generator,
            params,
            self.output_rate,
            frames,
            status,
            &mut progress,
        );

        match outcome {
            Ok(()) if progress.samples == 0 => {
                self.summary.failures += 1;
                status.status(&Status::error(NO_AUDIO_GENERATED))?;
                frames.finish_utterance()?;
            }
            Ok(()) => {
                let bytes = frames.finish_utterance()?;
                let gen_time = self.clock.elapsed(started).as_secs_f64();
                let audio_duration = bytes as f64 / 2.0 / self.output_rate as f64;
                let rtf = if gen_time > 0.0 {
                    audio_duration / gen_time
                } else {
                    0.0
                };
                self.summary.utterances += 1;
                status.status(&Status::Done {
                    audio_duration: round2(audio_duration),
                    gen_time: round2(gen_time),
                    rtf: round2(rtf),
                    chunks: progress.chunks,
                    bytes,
                })?;
            }
            // Fatal errors are reported by the caller that stops the server
            Err(e) if e.is_fatal() => {
                self.summary.failures += 1;
                frames.finish_utterance()?;
                return Err(e);
            }
            Err(e) => {
                self.summary.failures += 1;
                status.error(&e)?;
                frames.finish_utterance()?;
            }
        }
        Ok(())
    }
}

/// Pull chunks from the generator, resample each to the output rate and
/// write it before pulling the next.
///
/// The resampler is created for the first chunk's rate and drained after the
/// last chunk; it is dropped with the utterance on error.
fn stream_utterance<G: SpeechGenerator, W: Write, E: Write>(
    generator: &mut G,
    params: &SynthesisParams,
    output_rate: u32,
    frames: &mut FrameWriter<W>,
    status: &mut StatusReporter<E>,
    progress: &mut UtteranceProgress,
) -> Result<()> {
    let mut resampler: Option<StreamingResampler> = None;

    for chunk in generator.generate(params)? {
        let chunk = chunk?;
        progress.chunks += 1;

        let resampler = match resampler.take() {
            Some(r) if r.input_rate() != chunk.sample_rate => {
                return Err(BridgeError::Generation {
                    message: format!(
                        "sample rate changed mid-utterance from {} to {}",
                        r.input_rate(),
                        chunk.sample_rate
                    ),
                    source: None,
                });
            }
            Some(r) => resampler.insert(r),
            None => resampler.insert(StreamingResampler::new(chunk.sample_rate, output_rate)?),
        };

        let converted = resampler.resample_chunk(&chunk.samples, false)?;
        if converted.is_empty() {
            continue;
        }
        frames.write_samples(&quantize_all(&converted))?;
        progress.samples += converted.len();
        status.status(&Status::Chunk {
            n: progress.chunks,
            samples: converted.len(),
            bytes: frames.utterance_bytes(),
        })?;
    }

    if let Some(mut resampler) = resampler {
        let tail = resampler.resample_chunk(&[], true)?;
        frames.write_samples(&quantize_all(&tail))?;
        progress.samples += tail.len();
    }
    Ok(())
}

/// Run the TTS process lifecycle.
///
/// Reports `loading`, loads the generator, warms it up, reports `ready` and
/// writes a leading boundary so the reader discards anything that reached
/// the audio stream during startup. Then serves requests until input ends.
/// `shutdown` is always the last status written.
pub fn run_tts<G, L, R, W, E>(
    model: &str,
    defaults: SynthesisDefaults,
    load: L,
    requests: R,
    audio: W,
    status: &mut StatusReporter<E>,
) -> Result<TtsSummary>
where
    G: SpeechGenerator,
    L: FnOnce() -> Result<G>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let outcome = serve(model, defaults, load, requests, audio, status);
    if let Err(e) = &outcome {
        status.error(e)?;
    }
    status.status(&Status::Shutdown)?;
    outcome
}

fn serve<G, L, R, W, E>(
    model: &str,
    defaults: SynthesisDefaults,
    load: L,
    requests: R,
    audio: W,
    status: &mut StatusReporter<E>,
) -> Result<TtsSummary>
where
    G: SpeechGenerator,
    L: FnOnce() -> Result<G>,
    R: BufRead,
    W: Write,
    E: Write,
{
    status.status(&Status::Loading {
        model: model.to_string(),
    })?;
    let mut server = TtsServer::new(load()?, defaults);

    status.status(&Status::WarmingUp)?;
    match server.warm_up() {
        Ok(()) => {}
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => status.error(&e)?,
    }

    status.status(&Status::Ready {
        model: model.to_string(),
        sample_rate: server.output_rate,
    })?;

    let mut frames = FrameWriter::new(audio);
    frames.write_boundary()?;

    server.run(&mut LineReader::new(requests), &mut frames, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::framing::UTTERANCE_BOUNDARY;
    use crate::tts::generator::{ScriptStep, ScriptedGenerator, VoiceSelection};
    use std::io::Cursor;
    use std::time::Duration;

    fn statuses(bytes: Vec<u8>) -> Vec<serde_json::Value> {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn preset(text: &str) -> SynthesisParams {
        SynthesisParams {
            text: text.to_string(),
            voice: VoiceSelection::Preset {
                voice: None,
                instruct: None,
            },
        }
    }

    /// Advances a clock by a fixed step on each generated chunk.
    struct SteppingGenerator {
        inner: ScriptedGenerator,
        clock: ManualClock,
        step: Duration,
    }

    impl SpeechGenerator for SteppingGenerator {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn generate<'a>(
            &'a mut self,
            params: &SynthesisParams,
        ) -> Result<crate::tts::generator::ChunkStream<'a>> {
            let clock = self.clock.clone();
            let step = self.step;
            let stream = self.inner.generate(params)?;
            Ok(Box::new(stream.inspect(move |_| clock.advance(step))))
        }
    }

    #[test]
    fn test_speak_pads_and_reports_done() {
        let clock = ManualClock::new();
        let generator = SteppingGenerator {
            inner: ScriptedGenerator::new("scripted").with_utterance(vec![
                ScriptStep::Audio(vec![0.2; 12_000]),
                ScriptStep::Audio(vec![0.2; 9_000]),
            ]),
            clock: clock.clone(),
            step: Duration::from_millis(500),
        };
        let mut server = TtsServer::with_clock(generator, SynthesisDefaults::default(), clock);
        let mut frames = FrameWriter::new(Vec::new());
        let mut status = StatusReporter::new(Vec::new(), 0);

        server.speak(&preset("Hello"), &mut frames, &mut status).unwrap();

        // 21000 samples at 24kHz -> 7000 at 8kHz -> 14000 bytes -> padded to 14080
        let out = frames.into_inner();
        assert_eq!(out.len(), 14_080 + 4);
        assert_eq!(&out[14_080..], &UTTERANCE_BOUNDARY);

        let lines = statuses(status.into_inner());
        assert_eq!(lines[0]["status"], "generating");
        assert_eq!(lines[0]["text_length"], 5);
        let done = lines.last().unwrap();
        assert_eq!(done["status"], "done");
        assert_eq!(done["chunks"], 2);
        assert_eq!(done["bytes"], 14_080);
        assert_eq!(done["audio_duration"], 0.88);
        assert_eq!(done["gen_time"], 1.0);
        assert_eq!(done["rtf"], 0.88);
    }

    #[test]
    fn test_chunk_status_tracks_cumulative_bytes() {
        let generator = ScriptedGenerator::new("scripted").with_utterance(vec![
            ScriptStep::Audio(vec![0.1; 3000]),
            ScriptStep::Audio(vec![0.1; 3000]),
        ]);
        let mut server = TtsServer::new(generator, SynthesisDefaults::default());
        let mut frames = FrameWriter::new(Vec::new());
        let mut status = StatusReporter::new(Vec::new(), 0);

        server.speak(&preset("x"), &mut frames, &mut status).unwrap();

        let chunks: Vec<_> = statuses(status.into_inner())
            .into_iter()
            .filter(|l| l["status"] == "chunk")
            .collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0]["n"], 1);
        assert_eq!(chunks[1]["n"], 2);
        let first = chunks[0]["bytes"].as_u64().unwrap();
        let second = chunks[1]["bytes"].as_u64().unwrap();
        assert_eq!(first, chunks[0]["samples"].as_u64().unwrap() * 2);
        assert!(second > first);
    }

    #[test]
    fn test_no_audio_writes_only_boundary() {
        let mut server = TtsServer::new(ScriptedGenerator::new("s"), SynthesisDefaults::default());
        let mut frames = FrameWriter::new(Vec::new());
        let mut status = StatusReporter::new(Vec::new(), 0);

        server.speak(&preset("x"), &mut frames, &mut status).unwrap();

        assert_eq!(frames.into_inner(), UTTERANCE_BOUNDARY.to_vec());
        let lines = statuses(status.into_inner());
        assert_eq!(lines.last().unwrap()["message"], NO_AUDIO_GENERATED);
    }

    #[test]
    fn test_empty_chunks_count_as_no_audio() {
        let generator = ScriptedGenerator::new("s")
            .with_utterance(vec![ScriptStep::Audio(Vec::new()), ScriptStep::Audio(Vec::new())]);
        let mut server = TtsServer::new(generator, SynthesisDefaults::default());
        let mut frames = FrameWriter::new(Vec::new());
        let mut status = StatusReporter::new(Vec::new(), 0);

        server.speak(&preset("x"), &mut frames, &mut status).unwrap();

        assert_eq!(frames.into_inner(), UTTERANCE_BOUNDARY.to_vec());
    }

    #[test]
    fn test_mid_stream_failure_pads_and_closes_utterance() {
        let generator = ScriptedGenerator::new("s").with_utterance(vec![
            ScriptStep::Audio(vec![0.3; 2400]),
            ScriptStep::Fail("decoder diverged".to_string()),
            ScriptStep::Audio(vec![0.3; 2400]),
        ]);
        let mut server = TtsServer::new(generator, SynthesisDefaults::default());
        let mut frames = FrameWriter::new(Vec::new());
        let mut status = StatusReporter::new(Vec::new(), 0);

        server.speak(&preset("x"), &mut frames, &mut status).unwrap();

        let out = frames.into_inner();
        let audio_len = out.len() - UTTERANCE_BOUNDARY.len();
        assert_eq!(audio_len % 320, 0);
        assert_eq!(&out[audio_len..], &UTTERANCE_BOUNDARY);
        let lines = statuses(status.into_inner());
        let last = lines.last().unwrap();
        assert_eq!(last["status"], "error");
        assert_eq!(last["message"], "Generation failed: decoder diverged");
    }

    #[test]
    fn test_rate_change_mid_utterance_is_an_error() {
        let generator = ScriptedGenerator::new("s").with_utterance(vec![
            ScriptStep::AudioAt(24_000, vec![0.1; 4800]),
            ScriptStep::AudioAt(16_000, vec![0.1; 4800]),
        ]);
        let mut server = TtsServer::new(generator, SynthesisDefaults::default());
        let mut frames = FrameWriter::new(Vec::new());
        let mut status = StatusReporter::new(Vec::new(), 0);

        server.speak(&preset("x"), &mut frames, &mut status).unwrap();

        let lines = statuses(status.into_inner());
        let message = lines.last().unwrap()["message"].as_str().unwrap().to_string();
        assert!(message.contains("sample rate changed"));
    }

    #[test]
    fn test_native_rate_audio_passes_through() {
        let generator = ScriptedGenerator::new("s")
            .with_sample_rate(8000)
            .with_utterance(vec![ScriptStep::Audio(vec![0.5; 160])]);
        let mut server = TtsServer::new(generator, SynthesisDefaults::default());
        let mut frames = FrameWriter::new(Vec::new());
        let mut status = StatusReporter::new(Vec::new(), 0);

        server.speak(&preset("x"), &mut frames, &mut status).unwrap();

        let out = frames.into_inner();
        assert_eq!(out.len(), 324);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 16_383);
    }

    #[test]
    fn test_backend_lost_is_fatal_after_boundary() {
        let generator = ScriptedGenerator::new("s").with_utterance(vec![ScriptStep::BackendLost]);
        let mut server = TtsServer::new(generator, SynthesisDefaults::default());
        let mut frames = FrameWriter::new(Vec::new());
        let mut status = StatusReporter::new(Vec::new(), 0);

        let result = server.speak(&preset("x"), &mut frames, &mut status);

        assert!(matches!(result, Err(BridgeError::BackendUnavailable { .. })));
        assert_eq!(frames.into_inner(), UTTERANCE_BOUNDARY.to_vec());
    }

    #[test]
    fn test_run_tts_lifecycle() {
        let generator = ScriptedGenerator::new("scripted")
            .with_utterance(vec![ScriptStep::Audio(vec![0.1; 2400])]);
        let handle = generator.clone();
        let input = Cursor::new("\n{\"text\": \"Hi\"}\n{bad\n{\"text\": \" \"}\n");
        let mut audio = Vec::new();
        let mut status = StatusReporter::new(Vec::new(), 0);

        let summary = run_tts(
            "scripted",
            SynthesisDefaults::default(),
            || Ok(generator),
            input,
            &mut audio,
            &mut status,
        )
        .unwrap();

        assert_eq!(
            summary,
            TtsSummary {
                requests: 1,
                utterances: 1,
                failures: 0
            }
        );
        assert_eq!(handle.warm_ups(), 1);
        assert_eq!(&audio[..4], &UTTERANCE_BOUNDARY);

        let kinds: Vec<String> = statuses(status.into_inner())
            .iter()
            .map(|l| l["status"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            kinds,
            [
                "loading",
                "warming_up",
                "ready",
                "generating",
                "chunk",
                "done",
                "error",
                "error",
                "shutdown"
            ]
        );
    }

    #[test]
    fn test_run_tts_fatal_error_reported_once() {
        let generator = ScriptedGenerator::new("s").with_utterance(vec![ScriptStep::BackendLost]);
        let input = Cursor::new("{\"text\": \"a\"}\n{\"text\": \"b\"}\n");
        let mut status = StatusReporter::new(Vec::new(), 0);

        let result = run_tts(
            "s",
            SynthesisDefaults::default(),
            || Ok(generator),
            input,
            Vec::new(),
            &mut status,
        );

        assert!(result.is_err());
        let lines = statuses(status.into_inner());
        let errors = lines.iter().filter(|l| l["status"] == "error").count();
        assert_eq!(errors, 1);
        assert_eq!(lines.last().unwrap()["status"], "shutdown");
    }
}
