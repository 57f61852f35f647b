use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, stderr, stdin, stdout};
use std::path::Path;
use telebridge::audio::frame::{FrameReader, FrameSource};
use telebridge::audio::wav::WavFrameSource;
use telebridge::cli::{Cli, Commands, SttArgs};
use telebridge::config::Config;
use telebridge::defaults;
use telebridge::protocol::channel::StatusReporter;
use telebridge::stt::{WhisperTranscriber, run_stt};
use telebridge::tts::{ToneGenerator, run_tts};
use telebridge::version_string;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Stt(args) => {
            args.apply(&mut config);
            config.validate()?;
            stt_command(&config, &args, cli.verbose)
        }
        Commands::Tts(args) => {
            args.apply(&mut config);
            config.validate()?;
            tts_command(&config, cli.verbose)
        }
    }
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path).with_context(|| format!("loading config {}", path.display()))?
    } else if let Some(default_path) = Config::default_path() {
        // Try default path, fall back to defaults
        Config::load_or_default(&default_path)
            .with_context(|| format!("loading config {}", default_path.display()))?
    } else {
        Config::default()
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides()?)
}

fn stt_command(config: &Config, args: &SttArgs, verbose: u8) -> Result<()> {
    let segmenter = config.vad.to_segmenter_config(defaults::TELEPHONY_SAMPLE_RATE);
    let whisper = config.stt.whisper_config();
    let model = config.stt.model.clone();

    let mut source: Box<dyn FrameSource> = match &args.input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Box::new(WavFrameSource::from_reader(
                BufReader::new(file),
                segmenter.frame_samples(),
                segmenter.sample_rate,
            )?)
        }
        None => Box::new(FrameReader::new(
            stdin().lock(),
            segmenter.frame_samples(),
            segmenter.sample_rate,
        )),
    };

    let mut status = StatusReporter::new(stderr().lock(), verbose);
    status.log(|| format!("telebridge {} stt", version_string()))?;
    run_stt(
        segmenter,
        &model,
        || WhisperTranscriber::new(whisper),
        &mut source,
        stdout().lock(),
        &mut status,
    )?;
    Ok(())
}

fn tts_command(config: &Config, verbose: u8) -> Result<()> {
    let tts = &config.tts;
    let mut status = StatusReporter::new(stderr().lock(), verbose);
    status.log(|| format!("telebridge {} tts", version_string()))?;
    run_tts(
        &tts.model,
        tts.synthesis_defaults(),
        || ToneGenerator::new(&tts.model, tts.model_sample_rate),
        stdin().lock(),
        stdout().lock(),
        &mut status,
    )?;
    Ok(())
}
