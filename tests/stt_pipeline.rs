//! End-to-end STT runs over in-memory streams.

use serde_json::Value;
use std::io::Cursor;
use telebridge::audio::frame::FrameReader;
use telebridge::audio::pcm::encode_s16le;
use telebridge::audio::vad::SegmenterConfig;
use telebridge::audio::wav::WavFrameSource;
use telebridge::protocol::channel::StatusReporter;
use telebridge::stt::{MockTranscriber, run_stt};

const FRAME: usize = 240;
const LOUD: i16 = 1000;

/// Build a raw S16LE stream from (amplitude, frame count) runs.
fn stream(pattern: &[(i16, usize)]) -> Vec<u8> {
    encode_s16le(&samples(pattern))
}

fn samples(pattern: &[(i16, usize)]) -> Vec<i16> {
    let mut out = Vec::new();
    for &(amplitude, frames) in pattern {
        for i in 0..frames * FRAME {
            out.push(if i % 2 == 0 { amplitude } else { -amplitude });
        }
    }
    out
}

struct Run {
    events: Vec<Value>,
    status: Vec<Value>,
}

impl Run {
    fn types(&self) -> Vec<&str> {
        self.events
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect()
    }
}

fn parse_lines(bytes: &[u8]) -> Vec<Value> {
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn run(config: SegmenterConfig, input: Vec<u8>, transcriber: MockTranscriber) -> Run {
    let mut source = FrameReader::new(Cursor::new(input), config.frame_samples(), config.sample_rate);
    let mut events = Vec::new();
    let mut status = StatusReporter::new(Vec::new(), 0);

    run_stt(
        config,
        "mock",
        || Ok(transcriber),
        &mut source,
        &mut events,
        &mut status,
    )
    .unwrap();

    Run {
        events: parse_lines(&events),
        status: parse_lines(&status.into_inner()),
    }
}

#[test]
fn silence_speech_silence_yields_one_transcript() {
    let transcriber = MockTranscriber::new("mock").with_response(" Hello world ");
    let handle = transcriber.clone();

    let result = run(
        SegmenterConfig::default(),
        stream(&[(0, 4), (LOUD, 5), (0, 40)]),
        transcriber,
    );

    assert_eq!(
        result.types(),
        ["speech_started", "speech_stopped", "transcript"]
    );
    let transcript = &result.events[2];
    assert_eq!(transcript["text"], "Hello world");
    // 4 pre-roll + 5 voiced + 30 trailing silent frames
    assert_eq!(transcript["duration"], 1.17);

    // Warm-up, then the segment resampled to 16kHz
    assert_eq!(handle.calls(), vec![16_000, 39 * FRAME * 2]);
}

#[test]
fn status_stream_brackets_the_session() {
    let result = run(
        SegmenterConfig::default(),
        stream(&[(0, 10)]),
        MockTranscriber::new("mock"),
    );

    let kinds: Vec<&str> = result
        .status
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["loading", "warming_up", "ready", "shutdown"]);
    assert_eq!(result.status[2]["sample_rate"], 8000);
    assert!(result.events.is_empty());
}

#[test]
fn short_blip_is_not_transcribed() {
    let config = SegmenterConfig {
        silence_frames: 3,
        ..SegmenterConfig::default()
    };
    let transcriber = MockTranscriber::new("mock");
    let handle = transcriber.clone();

    let result = run(config, stream(&[(LOUD, 5), (0, 10)]), transcriber);

    assert_eq!(result.types(), ["speech_started", "speech_stopped"]);
    assert_eq!(handle.calls().len(), 1);
}

#[test]
fn end_of_stream_finalizes_open_utterance() {
    let result = run(
        SegmenterConfig::default(),
        stream(&[(LOUD, 20)]),
        MockTranscriber::new("mock").with_response("cut off"),
    );

    assert_eq!(
        result.types(),
        ["speech_started", "speech_stopped", "transcript"]
    );
    assert_eq!(result.events[2]["duration"], 0.6);
}

#[test]
fn trailing_partial_frame_is_ignored() {
    let mut input = stream(&[(0, 3)]);
    input.extend_from_slice(&[0x10; 100]);

    let result = run(SegmenterConfig::default(), input, MockTranscriber::new("mock"));

    assert!(result.events.is_empty());
}

#[test]
fn max_duration_splits_long_speech() {
    let config = SegmenterConfig {
        max_speech_ms: 600,
        ..SegmenterConfig::default()
    };

    let result = run(config, stream(&[(LOUD, 40)]), MockTranscriber::new("mock"));

    assert_eq!(
        result.types(),
        [
            "speech_started",
            "speech_stopped",
            "transcript",
            "speech_started",
            "speech_stopped",
            "transcript"
        ]
    );
}

#[test]
fn blank_transcripts_are_dropped() {
    let result = run(
        SegmenterConfig::default(),
        stream(&[(LOUD, 10), (0, 30)]),
        MockTranscriber::new("mock").with_response("   "),
    );

    assert_eq!(result.types(), ["speech_started", "speech_stopped"]);
}

#[test]
fn started_and_stopped_strictly_alternate() {
    // Deterministic runs of varying length, some below the confirmation count
    let mut seed = 0x2545_f491u32;
    let mut pattern = Vec::new();
    for _ in 0..60 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let amplitude = if pattern.len() % 2 == 0 { LOUD } else { 0 };
        pattern.push((amplitude, 1 + (seed % 45) as usize));
    }

    let result = run(
        SegmenterConfig::default(),
        stream(&pattern),
        MockTranscriber::new("mock"),
    );

    let markers: Vec<&str> = result
        .types()
        .into_iter()
        .filter(|t| *t != "transcript")
        .collect();
    assert!(!markers.is_empty());
    assert_eq!(markers.len() % 2, 0);
    for pair in markers.chunks(2) {
        assert_eq!(pair, ["speech_started", "speech_stopped"]);
    }
}

#[test]
fn transcription_failure_does_not_stop_the_server() {
    let result = run(
        SegmenterConfig::default(),
        stream(&[(LOUD, 10), (0, 30), (LOUD, 10), (0, 30)]),
        MockTranscriber::new("mock").with_failure(),
    );

    // Warm-up failure plus one per utterance
    let errors = result
        .status
        .iter()
        .filter(|s| s["status"] == "error")
        .count();
    assert_eq!(errors, 3);
    assert_eq!(result.types().len(), 4);
    assert_eq!(result.status.last().unwrap()["status"], "shutdown");
}

#[test]
fn wav_file_input_matches_raw_stream() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("call.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for sample in samples(&[(0, 4), (LOUD, 5), (0, 40)]) {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();

    let config = SegmenterConfig::default();
    let file = std::io::BufReader::new(std::fs::File::open(&path).unwrap());
    let mut source = WavFrameSource::from_reader(file, config.frame_samples(), 8000).unwrap();
    let mut events = Vec::new();
    let mut status = StatusReporter::new(Vec::new(), 0);

    run_stt(
        config,
        "mock",
        || Ok(MockTranscriber::new("mock").with_response("from wav")),
        &mut source,
        &mut events,
        &mut status,
    )
    .unwrap();

    let events = parse_lines(&events);
    assert_eq!(events.len(), 3);
    assert_eq!(events[2]["text"], "from wav");
    assert_eq!(events[2]["duration"], 1.17);
}
