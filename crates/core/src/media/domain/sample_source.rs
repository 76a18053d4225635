use crate::shared::error::TranscodeError;
use crate::shared::format_descriptor::FormatDescriptor;
use crate::shared::pipeline_status::PipelineStatus;
use crate::shared::sample_buffer::SampleBuffer;

/// Produces decoded PCM buffers from one audio track, in presentation order.
///
/// Implementations are opened against a `MediaAsset` by their own
/// constructor; the pump only drives them through this interface.
pub trait SampleSource: Send {
    fn reader_format(&self) -> FormatDescriptor;

    /// Moves the source from `Idle` to `Reading`.
    fn start(&mut self) -> Result<(), TranscodeError>;

    fn status(&self) -> PipelineStatus;

    /// Returns the next buffer, or `None` once the track is exhausted or
    /// decoding failed. `status()` tells the two apart afterwards.
    fn pull_next(&mut self) -> Option<SampleBuffer>;

    /// Stops reading. Later pulls return `None`.
    fn cancel(&mut self);

    /// The error behind a `Failed` status, handed out once.
    fn take_error(&mut self) -> Option<TranscodeError>;
}
