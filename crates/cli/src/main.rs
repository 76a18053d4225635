mod settings;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use downsampler_core::pipeline::transcode_logger::LogTranscodeLogger;
use downsampler_core::{AudioCodec, ChannelExecutor, DownsampleUseCase, TranscodeReport};

use settings::{Overrides, Settings};

/// Re-encode the audio of a media file as low-rate mono.
#[derive(Parser)]
#[command(name = "downsample")]
struct Cli {
    /// Input media file.
    input: PathBuf,

    /// Output file; the container follows the extension (m4a, wav, ...).
    output: PathBuf,

    /// Target sample rate in Hz [default: 16000].
    #[arg(long)]
    rate: Option<u32>,

    /// Encoder bit rate in bits per second, for lossy codecs [default: 16000].
    #[arg(long)]
    bit_rate: Option<u32>,

    /// Output codec: aac, opus, mp3, flac or pcm [default: aac].
    #[arg(long)]
    codec: Option<String>,

    /// Stream index of the audio track to use (default: first audio track).
    #[arg(long)]
    track: Option<usize>,

    /// Buffers queued ahead of the encoder [default: 8].
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Settings file to read instead of the per-user one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Store the effective settings as the new per-user defaults.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let file_settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };
    let settings = file_settings.merge(&overrides(&cli)?);
    validate_settings(&settings)?;

    if cli.save_settings {
        let path = Settings::default_path().ok_or("No configuration directory on this system")?;
        settings.save_to(&path)?;
        log::info!("Saved settings to {}", path.display());
    }

    let report = run_downsample(&cli, &settings)?;
    println!(
        "Wrote {} ({}, {} samples at {} Hz)",
        report.destination.display(),
        report.duration,
        report.samples_written,
        settings.rate
    );
    Ok(())
}

/// Runs the pipeline and waits on this thread for its completion.
fn run_downsample(
    cli: &Cli,
    settings: &Settings,
) -> Result<TranscodeReport, Box<dyn std::error::Error>> {
    let (executor, completions) = ChannelExecutor::new();
    let (result_tx, result_rx) = crossbeam_channel::bounded(1);

    let mut handle = DownsampleUseCase::new(settings.to_config())
        .with_logger(Box::new(LogTranscodeLogger::default()))
        .execute(
            &cli.input,
            &cli.output,
            Arc::new(executor),
            Box::new(move |result| {
                let _ = result_tx.send(result);
            }),
        )?;

    if !completions.run_next() {
        handle.join();
        return Err("Pipeline stopped without reporting a result".into());
    }
    handle.join();

    let result = result_rx
        .try_recv()
        .map_err(|_| "Pipeline stopped without reporting a result")?;
    Ok(result?)
}

fn overrides(cli: &Cli) -> Result<Overrides, Box<dyn std::error::Error>> {
    let codec = match &cli.codec {
        Some(name) => Some(parse_codec(name)?),
        None => None,
    };
    Ok(Overrides {
        rate: cli.rate,
        bit_rate: cli.bit_rate,
        codec,
        queue_capacity: cli.queue_capacity,
        track: cli.track,
    })
}

fn parse_codec(name: &str) -> Result<AudioCodec, Box<dyn std::error::Error>> {
    AudioCodec::parse(name).ok_or_else(|| {
        let known: Vec<String> = AudioCodec::ALL.iter().map(|c| c.to_string()).collect();
        format!("Unknown codec '{name}', expected one of: {}", known.join(", ")).into()
    })
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if cli.input == cli.output {
        return Err("Input and output must be different files".into());
    }
    if cli.output.extension().is_none() {
        return Err(format!(
            "Output needs a file extension to pick a container: {}",
            cli.output.display()
        )
        .into());
    }
    if let Some(path) = &cli.config {
        if !path.exists() {
            return Err(format!("Settings file not found: {}", path.display()).into());
        }
    }
    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if !(1000..=192_000).contains(&settings.rate) {
        return Err(format!(
            "Sample rate must be between 1000 and 192000 Hz, got {}",
            settings.rate
        )
        .into());
    }
    if settings.codec.is_lossy() && settings.bit_rate == 0 {
        return Err(format!("{} needs a bit rate above 0", settings.codec).into());
    }
    if settings.queue_capacity == 0 {
        return Err("Queue capacity must be at least 1".into());
    }
    Ok(())
}
