use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::media::domain::media_asset::TrackSelector;
use crate::media::domain::sample_sink::SampleSink;
use crate::media::domain::sample_source::SampleSource;
use crate::media::infrastructure::asset_prober::open_asset;
use crate::media::infrastructure::ffmpeg_sample_sink::FfmpegSampleSink;
use crate::media::infrastructure::ffmpeg_sample_source::FfmpegSampleSource;
use crate::pipeline::completion::CompletionExecutor;
use crate::pipeline::transcode_logger::{NullTranscodeLogger, TranscodeLogger};
use crate::pipeline::transcode_pump::{PumpHandle, TranscodeCompletion, TranscodePump};
use crate::shared::constants::{DEFAULT_BIT_RATE, DEFAULT_QUEUE_CAPACITY, DEFAULT_TARGET_SAMPLE_RATE};
use crate::shared::error::TranscodeError;
use crate::shared::format_descriptor::{AudioCodec, FormatDescriptor};
use crate::shared::timestamp::Timestamp;

/// Everything about a downsample run except its paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownsampleConfig {
    pub target_sample_rate: u32,
    pub codec: AudioCodec,
    pub bit_rate: u32,
    pub queue_capacity: usize,
    pub track: TrackSelector,
}

impl Default for DownsampleConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_TARGET_SAMPLE_RATE,
            codec: AudioCodec::Aac,
            bit_rate: DEFAULT_BIT_RATE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            track: TrackSelector::FirstAudio,
        }
    }
}

impl DownsampleConfig {
    pub fn writer_format(&self) -> FormatDescriptor {
        FormatDescriptor::writer(self.target_sample_rate)
            .with_codec(self.codec)
            .with_bit_rate(self.bit_rate)
    }
}

/// Probes the input, wires an ffmpeg source to an ffmpeg sink and starts
/// a [`TranscodePump`] between them.
pub struct DownsampleUseCase {
    config: DownsampleConfig,
    logger: Box<dyn TranscodeLogger>,
}

impl DownsampleUseCase {
    pub fn new(config: DownsampleConfig) -> Self {
        Self {
            config,
            logger: Box::new(NullTranscodeLogger),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn TranscodeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Sets up the pipeline and returns once the pump is running.
    ///
    /// Setup problems come back as `Err` and `on_complete` is never called.
    /// Otherwise `on_complete` receives the outcome exactly once, through
    /// `executor`.
    pub fn execute(
        self,
        source_path: &Path,
        destination_path: &Path,
        executor: Arc<dyn CompletionExecutor>,
        on_complete: TranscodeCompletion,
    ) -> Result<PumpHandle, TranscodeError> {
        // 1. Probe and open the decoder before touching the destination
        let asset = open_asset(source_path)?;
        let source = FfmpegSampleSource::open(&asset, self.config.track)?;

        // 2. Create the output
        let sink = FfmpegSampleSink::open(destination_path, self.config.writer_format())?
            .with_queue_capacity(self.config.queue_capacity);

        log::info!(
            "Downsampling {} ({} Hz, {} ch, {}) -> {} ({} Hz mono {})",
            source_path.display(),
            source.track().sample_rate,
            source.track().channels,
            asset.duration(),
            destination_path.display(),
            self.config.target_sample_rate,
            self.config.codec
        );

        // 3. Start both sessions at zero and run until the asset's end
        self.run_pipeline(
            Box::new(source),
            Box::new(sink),
            asset.duration(),
            executor,
            on_complete,
        )
    }

    /// Starts already-opened ends and hands them to a pump.
    pub fn run_pipeline(
        self,
        mut source: Box<dyn SampleSource>,
        mut sink: Box<dyn SampleSink>,
        end: Timestamp,
        executor: Arc<dyn CompletionExecutor>,
        on_complete: TranscodeCompletion,
    ) -> Result<PumpHandle, TranscodeError> {
        source.start()?;
        sink.start(Timestamp::ZERO)?;

        TranscodePump::new(source, sink, end)
            .with_logger(self.logger)
            .run(executor, on_complete)
    }
}

/// Downsamples the first audio track of `source_path` to a mono AAC file
/// at `target_sample_rate`.
pub fn downsample_file(
    source_path: &Path,
    destination_path: &Path,
    target_sample_rate: u32,
    executor: Arc<dyn CompletionExecutor>,
    on_complete: TranscodeCompletion,
) -> Result<PumpHandle, TranscodeError> {
    let config = DownsampleConfig {
        target_sample_rate,
        ..DownsampleConfig::default()
    };
    DownsampleUseCase::new(config).execute(source_path, destination_path, executor, on_complete)
}
