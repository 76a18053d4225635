use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::media::domain::readiness::{readiness_channel, ReadinessNotifier, ReadinessSignal};
use crate::media::domain::sample_sink::{SampleSink, SinkCompletion, SinkReport};
use crate::media::infrastructure::channel_layout::layout_for_channels;
use crate::shared::constants::{DEFAULT_QUEUE_CAPACITY, ENCODER_THREAD_NAME, FALLBACK_FRAME_SIZE};
use crate::shared::error::TranscodeError;
use crate::shared::format_descriptor::{AudioCodec, FormatDescriptor};
use crate::shared::pipeline_status::{PipelineStatus, StatusCell};
use crate::shared::sample_buffer::SampleBuffer;
use crate::shared::timestamp::Timestamp;

type ErrorSlot = Arc<Mutex<Option<TranscodeError>>>;

const INPUT_FORMAT: ffmpeg_next::format::Sample =
    ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed);

/// Encodes pushed PCM into a mono file via ffmpeg-next on a worker thread.
///
/// Layout: `push → bounded queue → encoder thread [resample → fifo → encode
/// → mux]`. The queue capacity is the backpressure window; the worker
/// signals readiness each time it takes a buffer off the queue.
pub struct FfmpegSampleSink {
    path: PathBuf,
    format: FormatDescriptor,
    queue_capacity: usize,
    encoder: Option<EncoderState>,
    status: StatusCell,
    error: ErrorSlot,
    input_tx: Option<Sender<SampleBuffer>>,
    finish_tx: Option<Sender<FinishRequest>>,
    notifier: ReadinessNotifier,
    readiness: ReadinessSignal,
    worker: Option<JoinHandle<()>>,
    finalize_requested: bool,
}

struct FinishRequest {
    end: Timestamp,
    on_complete: SinkCompletion,
}

impl FfmpegSampleSink {
    /// Creates the output container and opens the encoder.
    ///
    /// The container is picked from the extension of `path`. If anything
    /// fails after the file was created, the file is removed again.
    pub fn open(path: &Path, format: FormatDescriptor) -> Result<Self, TranscodeError> {
        format
            .validate()
            .map_err(|reason| TranscodeError::create_failed(path, reason))?;
        if format.channels != 1 {
            return Err(TranscodeError::create_failed(
                path,
                format!("only mono output is supported, got {} channels", format.channels),
            ));
        }

        ffmpeg_next::init().map_err(|e| TranscodeError::create_failed(path, e))?;

        let codec = ffmpeg_next::encoder::find(codec_id(format.codec)).ok_or_else(|| {
            TranscodeError::create_failed(
                path,
                format!("no {} encoder in this ffmpeg build", format.codec),
            )
        })?;
        let sample_format = pick_sample_format(&codec).ok_or_else(|| {
            TranscodeError::create_failed(
                path,
                format!("{} encoder takes no f32/s16/s32 input", format.codec),
            )
        })?;

        let octx =
            ffmpeg_next::format::output(&path).map_err(|e| TranscodeError::create_failed(path, e))?;

        let encoder = match EncoderState::new(path, octx, codec, sample_format, &format) {
            Ok(state) => state,
            Err(e) => {
                remove_partial(path);
                return Err(TranscodeError::create_failed(path, e));
            }
        };

        log::debug!(
            "Created {} ({} {} Hz mono, {} bps, frame size {})",
            path.display(),
            format.codec,
            format.sample_rate,
            format.bit_rate,
            encoder.frame_size
        );

        let (notifier, readiness) = readiness_channel();
        Ok(Self {
            path: path.to_path_buf(),
            format,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            encoder: Some(encoder),
            status: StatusCell::new(),
            error: Arc::new(Mutex::new(None)),
            input_tx: None,
            finish_tx: None,
            notifier,
            readiness,
            worker: None,
            finalize_requested: false,
        })
    }

    /// Number of buffers accepted ahead of the encoder. Takes effect at `start`.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    fn worker_error(&self) -> Option<TranscodeError> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SampleSink for FfmpegSampleSink {
    fn writer_format(&self) -> FormatDescriptor {
        self.format
    }

    fn start(&mut self, session_origin: Timestamp) -> Result<(), TranscodeError> {
        if self.status.get() != PipelineStatus::Idle {
            return Err(TranscodeError::start_failed(
                "sink",
                format!("sink is {:?}, expected Idle", self.status.get()),
            ));
        }
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| TranscodeError::start_failed("sink", "encoder already consumed"))?;

        if let Err(e) = encoder.begin(session_origin) {
            self.status.transition(PipelineStatus::Failed);
            encoder.discard();
            return Err(TranscodeError::start_failed("sink", e));
        }

        let (input_tx, input_rx) = crossbeam_channel::bounded::<SampleBuffer>(self.queue_capacity);
        let (finish_tx, finish_rx) = crossbeam_channel::bounded::<FinishRequest>(1);

        let notifier = self.notifier.clone();
        let status = self.status.clone();
        let error = self.error.clone();
        let worker = std::thread::Builder::new()
            .name(ENCODER_THREAD_NAME.to_string())
            .spawn(move || run_encoder(encoder, input_rx, finish_rx, notifier, status, error))
            .map_err(|e| {
                self.status.transition(PipelineStatus::Failed);
                remove_partial(&self.path);
                TranscodeError::start_failed("sink", e)
            })?;

        self.input_tx = Some(input_tx);
        self.finish_tx = Some(finish_tx);
        self.worker = Some(worker);
        self.status.transition(PipelineStatus::Writing);
        log::debug!("Writing session for {} anchored at {session_origin}", self.path.display());
        Ok(())
    }

    fn status(&self) -> PipelineStatus {
        self.status.get()
    }

    fn is_ready_for_more(&self) -> bool {
        self.status.get() == PipelineStatus::Writing
            && self.input_tx.as_ref().is_some_and(|tx| !tx.is_full())
    }

    fn readiness(&self) -> ReadinessSignal {
        self.readiness.clone()
    }

    fn push(&mut self, buffer: SampleBuffer) -> Result<(), TranscodeError> {
        if let Some(e) = self.worker_error() {
            return Err(e.into_append_failed());
        }
        let tx = self.input_tx.as_ref().ok_or_else(|| {
            TranscodeError::AppendFailed(format!(
                "sink is {:?} and not accepting input",
                self.status.get()
            ))
        })?;

        match tx.try_send(buffer) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TranscodeError::AppendFailed(
                "push while the sink was not ready".to_string(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(self
                .worker_error()
                .map(TranscodeError::into_append_failed)
                .unwrap_or_else(|| {
                    TranscodeError::AppendFailed("encoder worker stopped".to_string())
                })),
        }
    }

    fn mark_finished(&mut self) {
        if self.input_tx.take().is_some() {
            log::debug!("Input finished for {}", self.path.display());
        }
    }

    fn finalize(&mut self, end: Timestamp, on_complete: SinkCompletion) {
        self.mark_finished();
        let Some(finish_tx) = self.finish_tx.take() else {
            on_complete(Err(TranscodeError::FinalizeFailed {
                path: self.path.clone(),
                reason: "sink was never started or is already finalized".to_string(),
            }));
            return;
        };

        self.finalize_requested = true;
        if let Err(err) = finish_tx.send(FinishRequest { end, on_complete }) {
            let request = err.into_inner();
            let reason = self
                .worker_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "encoder worker stopped".to_string());
            (request.on_complete)(Err(TranscodeError::FinalizeFailed {
                path: self.path.clone(),
                reason,
            }));
        }
    }

    fn take_error(&mut self) -> Option<TranscodeError> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl Drop for FfmpegSampleSink {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            log::debug!("Sink for {} dropped before start", self.path.display());
            encoder.discard();
            return;
        }
        if self.finalize_requested {
            return;
        }
        // Closing both channels tells the worker to abandon the file.
        self.input_tx = None;
        self.finish_tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Encoder thread for {} panicked", self.path.display());
            }
        }
    }
}

/// Encoder thread body: drain the queue, then finish or discard the file.
fn run_encoder(
    mut encoder: EncoderState,
    input_rx: Receiver<SampleBuffer>,
    finish_rx: Receiver<FinishRequest>,
    notifier: ReadinessNotifier,
    status: StatusCell,
    error: ErrorSlot,
) {
    let record = |e: &TranscodeError| {
        status.transition(PipelineStatus::Failed);
        *error.lock().unwrap_or_else(|p| p.into_inner()) = Some(e.clone());
    };

    if let Err(e) = encoder.encode_queue(&input_rx, &notifier) {
        log::warn!("Encoding {} failed: {e}", encoder.path.display());
        record(&e);
        drop(input_rx);
        notifier.notify();
        encoder.discard();
        if let Ok(request) = finish_rx.recv() {
            (request.on_complete)(Err(e));
        }
        return;
    }

    match finish_rx.recv() {
        Ok(FinishRequest { end, on_complete }) => {
            let outcome = encoder.finish(end);
            match &outcome {
                Ok(report) => {
                    status.transition(PipelineStatus::Completed);
                    log::debug!(
                        "Finalized {} ({} samples, {})",
                        report.path.display(),
                        report.samples_written,
                        report.duration
                    );
                }
                Err(e) => record(e),
            }
            on_complete(outcome);
        }
        Err(_) => {
            status.transition(PipelineStatus::Cancelled);
            encoder.discard();
        }
    }
}

/// ffmpeg state owned by the encoder thread.
struct EncoderState {
    path: PathBuf,
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::audio::Encoder,
    stream_index: usize,
    enc_time_base: ffmpeg_next::Rational,
    ost_time_base: ffmpeg_next::Rational,
    sample_format: ffmpeg_next::format::Sample,
    frame_size: usize,
    pad_last_frame: bool,
    target_rate: u32,
    resampler: Option<InputResampler>,
    fifo: VecDeque<f32>,
    samples_encoded: u64,
    session_origin: Timestamp,
}

struct InputResampler {
    context: ffmpeg_next::software::resampling::Context,
    rate: u32,
    channels: u16,
}

// Safety: EncoderState is built on the caller's thread and then moved to the
// encoder thread, which is its only user from then on.
unsafe impl Send for EncoderState {}

impl EncoderState {
    fn new(
        path: &Path,
        mut octx: ffmpeg_next::format::context::Output,
        codec: ffmpeg_next::Codec,
        sample_format: ffmpeg_next::format::Sample,
        format: &FormatDescriptor,
    ) -> Result<Self, ffmpeg_next::Error> {
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let mut ost = octx.add_stream(Some(codec))?;
        let stream_index = ost.index();

        let rate = format.sample_rate as i32;
        let enc_time_base = ffmpeg_next::Rational(1, rate);
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()?;
        encoder_ctx.set_rate(rate);
        encoder_ctx.set_channel_layout(ffmpeg_next::ChannelLayout::MONO);
        encoder_ctx.set_format(sample_format);
        encoder_ctx.set_time_base(enc_time_base);
        if format.codec.is_lossy() {
            encoder_ctx.set_bit_rate(format.bit_rate as usize);
        }
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_as(codec)?;
        ost.set_parameters(&encoder);

        let frame_size = match encoder.frame_size() as usize {
            0 => FALLBACK_FRAME_SIZE,
            n => n,
        };
        let pad_last_frame = !codec.capabilities().intersects(
            ffmpeg_next::codec::Capabilities::SMALL_LAST_FRAME
                | ffmpeg_next::codec::Capabilities::VARIABLE_FRAME_SIZE,
        );

        Ok(Self {
            path: path.to_path_buf(),
            octx,
            encoder,
            stream_index,
            enc_time_base,
            ost_time_base: enc_time_base,
            sample_format,
            frame_size,
            pad_last_frame,
            target_rate: format.sample_rate,
            resampler: None,
            fifo: VecDeque::new(),
            samples_encoded: 0,
            session_origin: Timestamp::ZERO,
        })
    }

    fn begin(&mut self, session_origin: Timestamp) -> Result<(), ffmpeg_next::Error> {
        self.octx.write_header()?;
        self.ost_time_base = self
            .octx
            .stream(self.stream_index)
            .map(|s| s.time_base())
            .unwrap_or(self.enc_time_base);
        self.session_origin = session_origin;
        Ok(())
    }

    /// Encodes buffers until the sending side closes the queue.
    fn encode_queue(
        &mut self,
        input_rx: &Receiver<SampleBuffer>,
        notifier: &ReadinessNotifier,
    ) -> Result<(), TranscodeError> {
        for buffer in input_rx.iter() {
            // A slot just freed up: let the producer refill while we encode.
            notifier.notify();
            self.append(buffer)?;
        }
        self.flush_resampler();
        Ok(())
    }

    fn append(&mut self, buffer: SampleBuffer) -> Result<(), TranscodeError> {
        if buffer.end_pts() <= self.session_origin {
            log::debug!("Dropping buffer at {} before session start", buffer.pts());
            return Ok(());
        }
        if buffer.is_empty() {
            return Ok(());
        }

        let (rate, channels, frames) = (buffer.sample_rate(), buffer.channels(), buffer.frames());
        let layout = layout_for_channels(channels).ok_or_else(|| {
            TranscodeError::AppendFailed(format!("unsupported channel count {channels}"))
        })?;

        if self.resampler.is_none() {
            let context = ffmpeg_next::software::resampling::Context::get(
                INPUT_FORMAT,
                layout,
                rate,
                INPUT_FORMAT,
                ffmpeg_next::ChannelLayout::MONO,
                self.target_rate,
            )
            .map_err(|e| TranscodeError::AppendFailed(e.to_string()))?;
            self.resampler = Some(InputResampler {
                context,
                rate,
                channels,
            });
        }
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };
        if resampler.rate != rate || resampler.channels != channels {
            return Err(TranscodeError::AppendFailed(format!(
                "input changed from {} Hz/{} ch to {rate} Hz/{channels} ch mid-stream",
                resampler.rate, resampler.channels
            )));
        }

        let mut input = ffmpeg_next::util::frame::audio::Audio::new(INPUT_FORMAT, frames, layout);
        input.set_rate(rate);
        let src: &[u8] = bytemuck::cast_slice(buffer.samples());
        input.data_mut(0)[..src.len()].copy_from_slice(src);
        drop(buffer);

        let mut mono = ffmpeg_next::util::frame::audio::Audio::empty();
        resampler
            .context
            .run(&input, &mut mono)
            .map_err(|e| TranscodeError::AppendFailed(e.to_string()))?;
        self.fifo.extend(mono_samples(&mono));

        while self.fifo.len() >= self.frame_size {
            self.encode_chunk(self.frame_size)?;
        }
        Ok(())
    }

    fn flush_resampler(&mut self) {
        let Some(resampler) = self.resampler.as_mut() else {
            return;
        };
        let mut mono = ffmpeg_next::util::frame::audio::Audio::empty();
        match resampler.context.flush(&mut mono) {
            Ok(_) => self.fifo.extend(mono_samples(&mono)),
            Err(e) => log::debug!("Resampler flush returned non-fatal error: {e}"),
        }
    }

    fn encode_chunk(&mut self, n: usize) -> Result<(), TranscodeError> {
        let mut chunk: Vec<f32> = self.fifo.drain(..n).collect();
        if self.pad_last_frame && chunk.len() < self.frame_size {
            chunk.resize(self.frame_size, 0.0);
        }

        let mut frame = ffmpeg_next::util::frame::audio::Audio::new(
            self.sample_format,
            chunk.len(),
            ffmpeg_next::ChannelLayout::MONO,
        );
        frame.set_rate(self.target_rate);
        frame.set_pts(Some(self.samples_encoded as i64));
        write_plane(&mut frame, self.sample_format, &chunk);
        self.samples_encoded += n as u64;

        self.encoder
            .send_frame(&frame)
            .map_err(|e| TranscodeError::AppendFailed(e.to_string()))?;
        self.write_packets()
            .map_err(|e| TranscodeError::AppendFailed(e.to_string()))
    }

    fn write_packets(&mut self) -> Result<(), ffmpeg_next::Error> {
        let mut packet = ffmpeg_next::Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.enc_time_base, self.ost_time_base);
                    packet.write_interleaved(&mut self.octx)?;
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
                    return Ok(())
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Ends the session at `end`, flushes everything and closes the file.
    fn finish(mut self, end: Timestamp) -> Result<SinkReport, TranscodeError> {
        let keep = samples_to_keep(
            self.fifo.len(),
            self.samples_encoded,
            self.session_origin,
            end,
            self.target_rate,
        );
        if keep < self.fifo.len() {
            log::debug!("Trimming {} samples past {end}", self.fifo.len() - keep);
            self.fifo.truncate(keep);
        }

        match self.drain_and_close() {
            Ok(()) => {
                let report = SinkReport {
                    path: self.path.clone(),
                    samples_written: self.samples_encoded,
                    duration: Timestamp::from_samples(self.samples_encoded, self.target_rate),
                };
                // Dropping the output context closes the file.
                drop(self);
                Ok(report)
            }
            Err(reason) => {
                let path = self.path.clone();
                self.discard();
                Err(TranscodeError::FinalizeFailed { path, reason })
            }
        }
    }

    fn drain_and_close(&mut self) -> Result<(), String> {
        while !self.fifo.is_empty() {
            let n = self.frame_size.min(self.fifo.len());
            self.encode_chunk(n).map_err(|e| e.to_string())?;
        }
        self.encoder.send_eof().map_err(|e| e.to_string())?;
        self.write_packets().map_err(|e| e.to_string())?;
        self.octx.write_trailer().map_err(|e| e.to_string())
    }

    /// Closes the output without a trailer and deletes it.
    fn discard(self) {
        let path = self.path.clone();
        drop(self);
        log::warn!("Discarding unfinished output {}", path.display());
        remove_partial(&path);
    }
}

/// How many buffered samples fit before `end`, given what was already
/// encoded. An `end` at or before the origin means "no limit".
fn samples_to_keep(
    buffered: usize,
    encoded: u64,
    origin: Timestamp,
    end: Timestamp,
    rate: u32,
) -> usize {
    if end <= origin {
        return buffered;
    }
    let budget = (end.to_samples(rate) - origin.to_samples(rate)).max(0) as u64;
    let remaining = budget.saturating_sub(encoded);
    buffered.min(remaining as usize)
}

fn mono_samples(frame: &ffmpeg_next::util::frame::audio::Audio) -> Vec<f32> {
    let n = frame.samples();
    if n == 0 {
        return Vec::new();
    }
    let bytes = &frame.data(0)[..n * std::mem::size_of::<f32>()];
    match bytemuck::try_cast_slice::<u8, f32>(bytes) {
        Ok(floats) => floats.to_vec(),
        Err(_) => bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}

/// Copies mono f32 samples into the frame's plane in the encoder's format.
fn write_plane(
    frame: &mut ffmpeg_next::util::frame::audio::Audio,
    format: ffmpeg_next::format::Sample,
    samples: &[f32],
) {
    use ffmpeg_next::format::Sample;

    let dst = frame.data_mut(0);
    match format {
        Sample::I16(_) => {
            let converted: Vec<i16> = samples
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect();
            let src: &[u8] = bytemuck::cast_slice(&converted);
            dst[..src.len()].copy_from_slice(src);
        }
        Sample::I32(_) => {
            let converted: Vec<i32> = samples
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32)
                .collect();
            let src: &[u8] = bytemuck::cast_slice(&converted);
            dst[..src.len()].copy_from_slice(src);
        }
        _ => {
            let src: &[u8] = bytemuck::cast_slice(samples);
            dst[..src.len()].copy_from_slice(src);
        }
    }
}

fn codec_id(codec: AudioCodec) -> ffmpeg_next::codec::Id {
    match codec {
        AudioCodec::LinearPcm => ffmpeg_next::codec::Id::PCM_S16LE,
        AudioCodec::Aac => ffmpeg_next::codec::Id::AAC,
        AudioCodec::Opus => ffmpeg_next::codec::Id::OPUS,
        AudioCodec::Mp3 => ffmpeg_next::codec::Id::MP3,
        AudioCodec::Flac => ffmpeg_next::codec::Id::FLAC,
    }
}

/// Picks the encoder input format: f32 first, then s16, then s32.
///
/// Output is mono, so planar and packed variants share one memory layout.
fn pick_sample_format(codec: &ffmpeg_next::Codec) -> Option<ffmpeg_next::format::Sample> {
    use ffmpeg_next::format::sample::Type;
    use ffmpeg_next::format::Sample;

    let supported: Vec<Sample> = match codec.audio().ok().and_then(|a| a.formats()) {
        Some(formats) => formats.collect(),
        None => return Some(Sample::F32(Type::Planar)),
    };
    let preference = [
        Sample::F32(Type::Planar),
        Sample::F32(Type::Packed),
        Sample::I16(Type::Packed),
        Sample::I16(Type::Planar),
        Sample::I32(Type::Packed),
        Sample::I32(Type::Planar),
    ];
    preference.into_iter().find(|f| supported.contains(f))
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove partial output {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::infrastructure::asset_prober::open_asset;
    use crate::shared::error::ErrorKind;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::time::Duration;

    fn tone(seconds: f64, rate: u32, channels: u16, chunk: usize) -> Vec<SampleBuffer> {
        let total = (seconds * rate as f64) as usize;
        let mut buffers = Vec::new();
        let mut start = 0;
        while start < total {
            let n = chunk.min(total - start);
            let mut samples = Vec::with_capacity(n * channels as usize);
            for i in start..start + n {
                let v = ((i as f64 / rate as f64) * 440.0 * std::f64::consts::TAU).sin() as f32 * 0.5;
                samples.extend(std::iter::repeat(v).take(channels as usize));
            }
            buffers.push(SampleBuffer::new(
                samples,
                rate,
                channels,
                Timestamp::from_samples(start as u64, rate),
            ));
            start += n;
        }
        buffers
    }

    fn push_all(sink: &mut FfmpegSampleSink, buffers: Vec<SampleBuffer>) {
        let signal = sink.readiness();
        for buffer in buffers {
            while !sink.is_ready_for_more() {
                signal.wait();
            }
            sink.push(buffer).unwrap();
        }
    }

    fn finalize_and_wait(
        sink: &mut FfmpegSampleSink,
        end: Timestamp,
    ) -> Result<SinkReport, TranscodeError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        sink.finalize(
            end,
            Box::new(move |result| {
                tx.send(result).unwrap();
            }),
        );
        rx.recv_timeout(Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn test_open_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.m4a");
        let err = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::CreateFailed);
        assert!(!path.exists());
    }

    #[test]
    fn test_open_unknown_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.notacontainer");
        let err = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::CreateFailed);
        assert!(!path.exists());
    }

    #[rstest]
    #[case::stereo(FormatDescriptor { channels: 2, ..FormatDescriptor::writer(16000) })]
    #[case::zero_rate(FormatDescriptor::writer(0))]
    #[case::zero_bit_rate(FormatDescriptor::writer(16000).with_bit_rate(0))]
    fn test_open_rejects_format(#[case] format: FormatDescriptor) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let err = FfmpegSampleSink::open(&path, format).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CreateFailed);
        assert!(!path.exists());
    }

    #[test]
    fn test_not_ready_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        assert!(!sink.is_ready_for_more());
        assert_eq!(sink.status(), PipelineStatus::Idle);

        let buffer = SampleBuffer::new(vec![0.0; 160], 16000, 1, Timestamp::ZERO);
        let err = sink.push(buffer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AppendFailed);
    }

    #[test]
    fn test_dropped_before_start_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        drop(sink);
        assert!(!path.exists());
    }

    #[test]
    fn test_start_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        sink.start(Timestamp::ZERO).unwrap();
        let err = sink.start(Timestamp::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StartFailed);
    }

    #[test]
    fn test_encodes_aac_at_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        sink.start(Timestamp::ZERO).unwrap();
        assert_eq!(sink.status(), PipelineStatus::Writing);

        push_all(&mut sink, tone(2.0, 44100, 2, 4096));
        let report = finalize_and_wait(&mut sink, Timestamp::from_seconds(2.0)).unwrap();
        drop(sink);

        assert_eq!(report.path, path);
        assert_relative_eq!(report.duration.seconds(), 2.0, epsilon = 0.1);

        let asset = open_asset(&path).unwrap();
        let track = asset.audio_tracks().next().unwrap();
        assert_eq!(track.sample_rate, 16000);
        assert_eq!(track.channels, 1);
        assert_eq!(track.codec_name, "aac");
        assert_relative_eq!(asset.duration().seconds(), 2.0, epsilon = 0.15);
    }

    #[test]
    fn test_encodes_pcm_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let format = FormatDescriptor::writer(8000).with_codec(AudioCodec::LinearPcm);
        let mut sink = FfmpegSampleSink::open(&path, format).unwrap();
        sink.start(Timestamp::ZERO).unwrap();

        push_all(&mut sink, tone(1.0, 16000, 1, 1000));
        let report = finalize_and_wait(&mut sink, Timestamp::from_seconds(1.0)).unwrap();

        assert!((report.samples_written as i64 - 8000).abs() <= 32);
        assert!(report.samples_written <= 8000);
        let asset = open_asset(&path).unwrap();
        let track = asset.audio_tracks().next().unwrap();
        assert_eq!(track.sample_rate, 8000);
        assert_eq!(track.codec_name, "pcm_s16le");
    }

    #[test]
    fn test_status_completed_after_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        sink.start(Timestamp::ZERO).unwrap();
        push_all(&mut sink, tone(0.5, 16000, 1, 1024));
        finalize_and_wait(&mut sink, Timestamp::from_seconds(0.5)).unwrap();
        assert_eq!(sink.status(), PipelineStatus::Completed);
        assert!(!sink.is_ready_for_more());
    }

    #[test]
    fn test_mid_stream_format_change_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        sink.start(Timestamp::ZERO).unwrap();

        let mut buffers = tone(0.1, 44100, 2, 1024);
        buffers.extend(tone(0.1, 48000, 1, 1024));
        let signal = sink.readiness();
        for buffer in buffers {
            while !sink.is_ready_for_more() && sink.status() == PipelineStatus::Writing {
                signal.wait();
            }
            if sink.push(buffer).is_err() {
                break;
            }
        }

        let err = finalize_and_wait(&mut sink, Timestamp::from_seconds(0.2)).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::AppendFailed | ErrorKind::FinalizeFailed
        ));
        drop(sink);
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_without_finalize_discards_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        sink.start(Timestamp::ZERO).unwrap();
        push_all(&mut sink, tone(0.5, 44100, 1, 2048));
        sink.mark_finished();
        drop(sink);
        assert!(!path.exists());
    }

    #[rstest]
    #[case::queue_full(false)]
    #[case::after_mark_finished(true)]
    fn test_push_rejected_without_room(#[case] finish_first: bool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000))
            .unwrap()
            .with_queue_capacity(1);
        sink.start(Timestamp::ZERO).unwrap();

        let err = if finish_first {
            sink.mark_finished();
            assert!(!sink.is_ready_for_more());
            sink.push(tone(0.1, 48000, 2, 4800).remove(0)).unwrap_err()
        } else {
            // The worker holds one buffer while it encodes, so back to back
            // pushes of long buffers overrun a one-slot queue.
            tone(40.0, 48000, 2, 480_000)
                .into_iter()
                .find_map(|buffer| sink.push(buffer).err())
                .unwrap()
        };

        assert_eq!(err.kind(), ErrorKind::AppendFailed);
        assert!(!err.to_string().contains("rejected buffer: sink rejected buffer"));
    }

    #[test]
    fn test_push_reports_worker_error_unwrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        sink.start(Timestamp::ZERO).unwrap();

        let stored = TranscodeError::AppendFailed("unsupported channel count 9".to_string());
        *sink.error.lock().unwrap() = Some(stored.clone());

        let buffer = SampleBuffer::new(vec![0.0; 160], 16000, 1, Timestamp::ZERO);
        assert_eq!(sink.push(buffer).unwrap_err(), stored);
    }

    #[test]
    fn test_finalize_twice_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let mut sink = FfmpegSampleSink::open(&path, FormatDescriptor::writer(16000)).unwrap();
        sink.start(Timestamp::ZERO).unwrap();
        finalize_and_wait(&mut sink, Timestamp::ZERO).unwrap();
        let err = finalize_and_wait(&mut sink, Timestamp::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FinalizeFailed);
    }

    #[rstest]
    #[case::no_limit(500, 0, Timestamp::ZERO, Timestamp::ZERO, 500)]
    #[case::fits(500, 1000, Timestamp::ZERO, Timestamp::from_seconds(1.0), 500)]
    #[case::trims_tail(500, 15800, Timestamp::ZERO, Timestamp::from_seconds(1.0), 200)]
    #[case::already_past(500, 17000, Timestamp::ZERO, Timestamp::from_seconds(1.0), 0)]
    #[case::offset_origin(500, 0, Timestamp::from_seconds(1.0), Timestamp::from_seconds(1.01), 160)]
    fn test_samples_to_keep(
        #[case] buffered: usize,
        #[case] encoded: u64,
        #[case] origin: Timestamp,
        #[case] end: Timestamp,
        #[case] expected: usize,
    ) {
        assert_eq!(samples_to_keep(buffered, encoded, origin, end, 16000), expected);
    }
}
