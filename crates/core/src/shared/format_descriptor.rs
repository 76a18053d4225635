use serde::{Deserialize, Serialize};

use crate::shared::constants::{DEFAULT_BIT_RATE, OUTPUT_CHANNELS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// Uncompressed PCM: the native decode format on the reader side,
    /// 16-bit little endian on the writer side.
    #[serde(rename = "pcm")]
    LinearPcm,
    Aac,
    Opus,
    Mp3,
    Flac,
}

impl AudioCodec {
    pub const ALL: &[AudioCodec] = &[
        AudioCodec::LinearPcm,
        AudioCodec::Aac,
        AudioCodec::Opus,
        AudioCodec::Mp3,
        AudioCodec::Flac,
    ];

    /// Whether the encoder needs a target bit rate.
    pub fn is_lossy(&self) -> bool {
        matches!(self, AudioCodec::Aac | AudioCodec::Opus | AudioCodec::Mp3)
    }

    pub fn parse(name: &str) -> Option<AudioCodec> {
        match name.to_ascii_lowercase().as_str() {
            "pcm" | "lpcm" | "wav" => Some(AudioCodec::LinearPcm),
            "aac" => Some(AudioCodec::Aac),
            "opus" => Some(AudioCodec::Opus),
            "mp3" => Some(AudioCodec::Mp3),
            "flac" => Some(AudioCodec::Flac),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioCodec::LinearPcm => write!(f, "pcm"),
            AudioCodec::Aac => write!(f, "aac"),
            AudioCodec::Opus => write!(f, "opus"),
            AudioCodec::Mp3 => write!(f, "mp3"),
            AudioCodec::Flac => write!(f, "flac"),
        }
    }
}

/// Codec, rate, layout and bit rate of one side of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
}

impl FormatDescriptor {
    /// The decode side: linear PCM at the track's native rate and layout.
    pub fn reader(sample_rate: u32, channels: u16) -> Self {
        Self {
            codec: AudioCodec::LinearPcm,
            sample_rate,
            channels,
            bit_rate: 0,
        }
    }

    /// The encode side: mono at `sample_rate`, default codec and bit rate.
    pub fn writer(sample_rate: u32) -> Self {
        Self {
            codec: AudioCodec::Aac,
            sample_rate,
            channels: OUTPUT_CHANNELS,
            bit_rate: DEFAULT_BIT_RATE,
        }
    }

    pub fn with_codec(mut self, codec: AudioCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".to_string());
        }
        if self.channels == 0 {
            return Err("channel count must be positive".to_string());
        }
        if self.codec.is_lossy() && self.bit_rate == 0 {
            return Err(format!("{} requires a non-zero bit rate", self.codec));
        }
        Ok(())
    }
}
