//! STT server loop: frames in, speech events and transcripts out.

use crate::audio::frame::FrameSource;
use crate::audio::vad::{SegmentEvent, SegmentationEngine, SegmenterConfig};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::protocol::channel::{JsonLineWriter, StatusReporter};
use crate::protocol::messages::{Status, SttEvent};
use crate::stt::transcriber::{Transcriber, TranscriptionAdapter};
use std::io::Write;

/// Counters reported when the input ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SttSummary {
    pub frames: u64,
    pub utterances: u64,
    pub transcripts: u64,
}

/// One STT session over a single input stream.
pub struct SttServer<T: Transcriber, C: Clock = SystemClock> {
    engine: SegmentationEngine,
    adapter: TranscriptionAdapter<T, C>,
    summary: SttSummary,
}

impl<T: Transcriber, C: Clock> SttServer<T, C> {
    pub fn new(engine: SegmentationEngine, adapter: TranscriptionAdapter<T, C>) -> Self {
        Self {
            engine,
            adapter,
            summary: SttSummary::default(),
        }
    }

    /// Pull frames until the source ends, then finalize any open utterance.
    ///
    /// Recoverable transcription failures are reported on the status channel
    /// and the loop continues. Fatal errors and I/O errors end the loop and
    /// are returned to the caller.
    pub fn run<S: FrameSource, O: Write, E: Write>(
        &mut self,
        source: &mut S,
        events: &mut JsonLineWriter<O>,
        status: &mut StatusReporter<E>,
    ) -> Result<SttSummary> {
        while let Some(frame) = source.next_frame()? {
            self.summary.frames += 1;
            if let Some(event) = self.engine.process_frame(frame) {
                self.handle_event(event, events, status)?;
            }
        }

        if let Some(event) = self.engine.finish() {
            self.handle_event(event, events, status)?;
        }

        let summary = self.summary;
        status.log(|| {
            format!(
                "input ended after {} frames, {} utterances, {} transcripts",
                summary.frames, summary.utterances, summary.transcripts
            )
        })?;
        Ok(summary)
    }

    fn handle_event<O: Write, E: Write>(
        &mut self,
        event: SegmentEvent,
        events: &mut JsonLineWriter<O>,
        status: &mut StatusReporter<E>,
    ) -> Result<()> {
        match event {
            SegmentEvent::SpeechStarted => {
                self.summary.utterances += 1;
                let level = self.engine.last_level();
                events.send(&SttEvent::SpeechStarted)?;
                status.log(|| format!("speech started (rms {level:.0})"))?;
            }
            SegmentEvent::SpeechStopped { reason, segment } => {
                events.send(&SttEvent::SpeechStopped)?;

                let Some(segment) = segment else {
                    status.log(|| format!("speech stopped ({reason:?}), too short to transcribe"))?;
                    return Ok(());
                };
                status.log(|| {
                    format!(
                        "speech stopped ({reason:?}), {}ms from {}ms",
                        segment.duration_ms, segment.start_ms
                    )
                })?;

                match self.adapter.transcribe_segment(&segment) {
                    Ok(Some(result)) => {
                        self.summary.transcripts += 1;
                        events.send(&result.into_event())?;
                    }
                    Ok(None) => status.log(|| "empty transcript dropped".to_string())?,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => status.error(&e)?,
                }
            }
        }
        Ok(())
    }
}

/// Run the STT process lifecycle.
///
/// Reports `loading`, loads the transcriber, warms it up, reports `ready`,
/// then serves `source` until it ends. `shutdown` is always the last status
/// written, and an error that stopped the server is reported before it.
pub fn run_stt<T, L, S, O, E>(
    config: SegmenterConfig,
    model: &str,
    load: L,
    source: &mut S,
    events: O,
    status: &mut StatusReporter<E>,
) -> Result<SttSummary>
where
    T: Transcriber,
    L: FnOnce() -> Result<T>,
    S: FrameSource,
    O: Write,
    E: Write,
{
    let mut events = JsonLineWriter::new(events);
    let outcome = serve(config, model, load, source, &mut events, status);
    if let Err(e) = &outcome {
        status.error(e)?;
    }
    status.status(&Status::Shutdown)?;
    outcome
}

fn serve<T, L, S, O, E>(
    config: SegmenterConfig,
    model: &str,
    load: L,
    source: &mut S,
    events: &mut JsonLineWriter<O>,
    status: &mut StatusReporter<E>,
) -> Result<SttSummary>
where
    T: Transcriber,
    L: FnOnce() -> Result<T>,
    S: FrameSource,
    O: Write,
    E: Write,
{
    status.status(&Status::Loading {
        model: model.to_string(),
    })?;
    let adapter = TranscriptionAdapter::new(load()?);

    status.status(&Status::WarmingUp)?;
    match adapter.warm_up() {
        Ok(()) => {}
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => status.error(&e)?,
    }

    status.status(&Status::Ready {
        model: model.to_string(),
        sample_rate: config.sample_rate,
    })?;
    status.log(|| {
        format!(
            "frames of {} samples, threshold {}",
            config.frame_samples(),
            config.energy_threshold
        )
    })?;

    let mut server = SttServer::new(SegmentationEngine::new(config), adapter);
    server.run(source, events, status)
}
