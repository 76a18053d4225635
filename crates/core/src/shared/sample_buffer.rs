use crate::shared::timestamp::Timestamp;

/// A chunk of decoded audio: interleaved f32 PCM normalized to [-1.0, 1.0].
///
/// Buffers move from the source through the pump into the sink and are
/// never duplicated on the way, so the type intentionally has no `Clone`.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    pts: Timestamp,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, pts: Timestamp) -> Self {
        debug_assert!(channels > 0, "channels must be positive");
        debug_assert_eq!(
            samples.len() % channels.max(1) as usize,
            0,
            "interleaved sample count must be a multiple of channels"
        );
        Self {
            samples,
            sample_rate,
            channels,
            pts,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn pts(&self) -> Timestamp {
        self.pts
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Timestamp {
        Timestamp::from_samples(self.frames() as u64, self.sample_rate)
    }

    /// Presentation time just past the last sample.
    pub fn end_pts(&self) -> Timestamp {
        self.pts.add_samples(self.frames() as u64, self.sample_rate)
    }
}
