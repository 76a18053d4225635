pub mod completion;
pub mod downsample_use_case;
pub mod transcode_logger;
pub mod transcode_pump;
