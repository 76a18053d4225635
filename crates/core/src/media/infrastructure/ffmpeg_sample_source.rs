use std::path::PathBuf;

use crate::media::domain::media_asset::{AudioTrack, MediaAsset, TrackSelector};
use crate::media::domain::sample_source::SampleSource;
use crate::media::infrastructure::channel_layout::frame_layout;
use crate::shared::error::TranscodeError;
use crate::shared::format_descriptor::FormatDescriptor;
use crate::shared::pipeline_status::PipelineStatus;
use crate::shared::sample_buffer::SampleBuffer;
use crate::shared::timestamp::Timestamp;

const DECODED_FORMAT: ffmpeg_next::format::Sample =
    ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed);

/// Decodes one audio stream via ffmpeg-next, one frame per pull.
///
/// Decoded frames are converted to interleaved f32 at the stream's native
/// rate and layout; the resulting vector is handed to the caller as is.
pub struct FfmpegSampleSource {
    path: PathBuf,
    track: AudioTrack,
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Audio,
    converter: Option<ffmpeg_next::software::resampling::Context>,
    time_base: ffmpeg_next::Rational,
    status: PipelineStatus,
    error: Option<TranscodeError>,
    next_pts: Timestamp,
    input_exhausted: bool,
    buffers_read: u64,
}

// Safety: FfmpegSampleSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSampleSource {}

impl FfmpegSampleSource {
    /// Opens the track picked by `selector` for decoding.
    ///
    /// Track selection happens before any file is touched, so an asset with
    /// no audio fails with `NoAudioTrack` without further I/O.
    pub fn open(asset: &MediaAsset, selector: TrackSelector) -> Result<Self, TranscodeError> {
        let track = asset.select_audio_track(selector)?;
        let path = asset.path().to_path_buf();

        ffmpeg_next::init().map_err(|e| TranscodeError::open_failed(&path, e))?;
        let ictx =
            ffmpeg_next::format::input(&path).map_err(|e| TranscodeError::open_failed(&path, e))?;

        let stream = ictx.stream(track.index).ok_or_else(|| {
            TranscodeError::open_failed(&path, format!("stream {} disappeared", track.index))
        })?;
        let time_base = stream.time_base();
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().audio())
            .map_err(|e| TranscodeError::open_failed(&path, e))?;

        log::debug!(
            "Opened {} stream {} ({}, {} Hz, {} ch)",
            path.display(),
            track.index,
            track.codec_name,
            track.sample_rate,
            track.channels
        );

        Ok(Self {
            path,
            track,
            ictx,
            decoder,
            converter: None,
            time_base,
            status: PipelineStatus::Idle,
            error: None,
            next_pts: Timestamp::ZERO,
            input_exhausted: false,
            buffers_read: 0,
        })
    }

    pub fn track(&self) -> &AudioTrack {
        &self.track
    }

    fn fail(&mut self, error: TranscodeError) {
        if self.status.can_transition_to(PipelineStatus::Failed) {
            log::warn!("Decoding {} failed: {error}", self.path.display());
            self.status = PipelineStatus::Failed;
            self.error = Some(error);
        }
    }

    /// Pulls the next non-empty frame already sitting in the decoder.
    fn receive(&mut self) -> Result<Option<SampleBuffer>, TranscodeError> {
        let mut decoded = ffmpeg_next::util::frame::audio::Audio::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    if let Some(buffer) = self.convert(&decoded)? {
                        return Ok(Some(buffer));
                    }
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
                    return Ok(None)
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(TranscodeError::DecodeFailed(e.to_string())),
            }
        }
    }

    /// Reads packets until one for our stream reaches the decoder, or EOF.
    fn feed(&mut self) -> Result<(), TranscodeError> {
        let mut packet = ffmpeg_next::Packet::empty();
        loop {
            match packet.read(&mut self.ictx) {
                Ok(()) => {
                    if packet.stream() != self.track.index {
                        continue;
                    }
                    return self
                        .decoder
                        .send_packet(&packet)
                        .map_err(|e| TranscodeError::DecodeFailed(e.to_string()));
                }
                Err(ffmpeg_next::Error::Eof) => {
                    self.input_exhausted = true;
                    return self
                        .decoder
                        .send_eof()
                        .map_err(|e| TranscodeError::DecodeFailed(e.to_string()));
                }
                Err(e) => return Err(TranscodeError::DecodeFailed(e.to_string())),
            }
        }
    }

    fn convert(
        &mut self,
        decoded: &ffmpeg_next::util::frame::audio::Audio,
    ) -> Result<Option<SampleBuffer>, TranscodeError> {
        if decoded.samples() == 0 {
            return Ok(None);
        }

        let pts = decoded
            .timestamp()
            .map(|ts| {
                Timestamp::new(
                    ts * self.time_base.numerator() as i64,
                    self.time_base.denominator(),
                )
            })
            .unwrap_or(self.next_pts);

        let mut converter = match self.converter.take() {
            Some(c) => c,
            None => {
                let layout = frame_layout(decoded).ok_or_else(|| {
                    TranscodeError::DecodeFailed(format!(
                        "unsupported channel count {}",
                        decoded.channels()
                    ))
                })?;
                ffmpeg_next::software::resampling::Context::get(
                    decoded.format(),
                    layout,
                    decoded.rate(),
                    DECODED_FORMAT,
                    layout,
                    decoded.rate(),
                )
                .map_err(|e| TranscodeError::DecodeFailed(e.to_string()))?
            }
        };

        let mut packed = ffmpeg_next::util::frame::audio::Audio::empty();
        converter
            .run(decoded, &mut packed)
            .map_err(|e| TranscodeError::DecodeFailed(e.to_string()))?;
        self.converter = Some(converter);

        Ok(self.wrap(&packed, pts))
    }

    /// Drains samples the converter is still holding after the last frame.
    /// Runs at most once; the converter is dropped afterwards.
    fn flush_converter(&mut self) -> Option<SampleBuffer> {
        let mut converter = self.converter.take()?;
        let mut packed = ffmpeg_next::util::frame::audio::Audio::empty();
        match converter.flush(&mut packed) {
            Ok(_) => self.wrap(&packed, self.next_pts),
            Err(e) => {
                log::debug!("Converter flush returned non-fatal error: {e}");
                None
            }
        }
    }

    fn wrap(
        &mut self,
        packed: &ffmpeg_next::util::frame::audio::Audio,
        pts: Timestamp,
    ) -> Option<SampleBuffer> {
        let frames = packed.samples();
        if frames == 0 {
            return None;
        }
        let channels = packed.channels().max(1) as u16;
        let rate = if packed.rate() > 0 {
            packed.rate()
        } else {
            self.track.sample_rate
        };

        let samples = extract_interleaved_f32(packed, frames * channels as usize);
        let buffer = SampleBuffer::new(samples, rate, channels, pts);
        self.next_pts = buffer.end_pts();
        self.buffers_read += 1;
        Some(buffer)
    }
}

impl SampleSource for FfmpegSampleSource {
    fn reader_format(&self) -> FormatDescriptor {
        self.track.reader_format()
    }

    fn start(&mut self) -> Result<(), TranscodeError> {
        if self.status != PipelineStatus::Idle {
            return Err(TranscodeError::start_failed(
                "source",
                format!("source is {:?}, expected Idle", self.status),
            ));
        }
        self.status = PipelineStatus::Reading;
        Ok(())
    }

    fn status(&self) -> PipelineStatus {
        self.status
    }

    fn pull_next(&mut self) -> Option<SampleBuffer> {
        if self.status != PipelineStatus::Reading {
            return None;
        }

        loop {
            match self.receive() {
                Ok(Some(buffer)) => return Some(buffer),
                Ok(None) => {}
                Err(e) => {
                    self.fail(e);
                    return None;
                }
            }

            if self.input_exhausted {
                if let Some(buffer) = self.flush_converter() {
                    return Some(buffer);
                }
                log::debug!(
                    "Finished reading {} ({} buffers)",
                    self.path.display(),
                    self.buffers_read
                );
                self.status = PipelineStatus::Completed;
                return None;
            }

            if let Err(e) = self.feed() {
                self.fail(e);
                return None;
            }
        }
    }

    fn cancel(&mut self) {
        if self.status.can_transition_to(PipelineStatus::Cancelled) {
            self.status = PipelineStatus::Cancelled;
        }
    }

    fn take_error(&mut self) -> Option<TranscodeError> {
        self.error.take()
    }
}

/// Copies `len` interleaved f32 samples out of a packed frame.
fn extract_interleaved_f32(frame: &ffmpeg_next::util::frame::audio::Audio, len: usize) -> Vec<f32> {
    let bytes = &frame.data(0)[..len * std::mem::size_of::<f32>()];
    match bytemuck::try_cast_slice::<u8, f32>(bytes) {
        Ok(floats) => floats.to_vec(),
        Err(_) => bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}
