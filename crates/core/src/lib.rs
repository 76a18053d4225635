pub mod media;
pub mod pipeline;
pub mod shared;

pub use media::domain::media_asset::{MediaAsset, TrackSelector};
pub use pipeline::completion::{
    ChannelExecutor, CompletionExecutor, CompletionQueue, InlineExecutor, ThreadExecutor,
};
pub use pipeline::downsample_use_case::{downsample_file, DownsampleConfig, DownsampleUseCase};
pub use pipeline::transcode_pump::{PumpHandle, PumpOutcome, PumpState, TranscodeReport};
pub use shared::error::{ErrorKind, TranscodeError};
pub use shared::format_descriptor::AudioCodec;
