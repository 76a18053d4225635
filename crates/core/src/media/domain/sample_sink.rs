use std::path::PathBuf;

use crate::media::domain::readiness::ReadinessSignal;
use crate::shared::error::TranscodeError;
use crate::shared::format_descriptor::FormatDescriptor;
use crate::shared::pipeline_status::PipelineStatus;
use crate::shared::sample_buffer::SampleBuffer;
use crate::shared::timestamp::Timestamp;

/// What a sink wrote once finalization finished.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkReport {
    pub path: PathBuf,
    /// Samples per channel handed to the encoder, at the writer rate.
    pub samples_written: u64,
    pub duration: Timestamp,
}

/// Called once when finalization finishes, on the sink's own worker.
pub type SinkCompletion = Box<dyn FnOnce(Result<SinkReport, TranscodeError>) + Send>;

/// Accepts PCM buffers, re-encodes them and writes the output container.
///
/// A sink that is dropped without `finalize` discards whatever it wrote.
pub trait SampleSink: Send {
    fn writer_format(&self) -> FormatDescriptor;

    /// Begins a writing session anchored at `session_origin`.
    fn start(&mut self, session_origin: Timestamp) -> Result<(), TranscodeError>;

    fn status(&self) -> PipelineStatus;

    /// Backpressure: callers must not `push` while this is `false`.
    fn is_ready_for_more(&self) -> bool;

    /// Signalled whenever the sink may have become ready again.
    fn readiness(&self) -> ReadinessSignal;

    fn push(&mut self, buffer: SampleBuffer) -> Result<(), TranscodeError>;

    /// No more buffers will be pushed.
    fn mark_finished(&mut self);

    /// Ends the session at `end` and completes the file asynchronously.
    /// `on_complete` fires exactly once, from the sink's worker context.
    fn finalize(&mut self, end: Timestamp, on_complete: SinkCompletion);

    fn take_error(&mut self) -> Option<TranscodeError>;
}
