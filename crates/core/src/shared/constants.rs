/// Encoder bit rate in bits per second for the downsampled output.
pub const DEFAULT_BIT_RATE: u32 = 16_000;

/// Sample rate used when the caller does not ask for one.
pub const DEFAULT_TARGET_SAMPLE_RATE: u32 = 16_000;

pub const OUTPUT_CHANNELS: u16 = 1;

/// Buffers the sink accepts before it reports not-ready.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Frame size for codecs that accept any number of samples per frame.
pub const FALLBACK_FRAME_SIZE: usize = 1024;

pub const PUMP_THREAD_NAME: &str = "downsample-pump";
pub const ENCODER_THREAD_NAME: &str = "downsample-encoder";
