use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::shared::error::TranscodeError;
use crate::shared::format_descriptor::FormatDescriptor;
use crate::shared::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Subtitle,
    Other,
}

/// One stream of a media file as seen by the prober.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub index: usize,
    pub kind: TrackKind,
    pub codec_name: String,
    /// Zero for non-audio tracks.
    pub sample_rate: u32,
    pub channels: u16,
}

/// An audio stream chosen for decoding.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioTrack {
    pub index: usize,
    pub codec_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioTrack {
    pub fn reader_format(&self) -> FormatDescriptor {
        FormatDescriptor::reader(self.sample_rate, self.channels)
    }
}

/// Which audio stream of an asset to decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSelector {
    #[default]
    FirstAudio,
    StreamIndex(usize),
}

/// A probed input file: its streams and overall duration.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaAsset {
    path: PathBuf,
    tracks: Vec<Track>,
    duration: Timestamp,
}

impl MediaAsset {
    pub fn new(path: impl Into<PathBuf>, tracks: Vec<Track>, duration: Timestamp) -> Self {
        Self {
            path: path.into(),
            tracks,
            duration,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn duration(&self) -> Timestamp {
        self.duration
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    /// Resolves `selector` to an audio track, or `NoAudioTrack`.
    pub fn select_audio_track(&self, selector: TrackSelector) -> Result<AudioTrack, TranscodeError> {
        let track = match selector {
            TrackSelector::FirstAudio => self.audio_tracks().next(),
            TrackSelector::StreamIndex(index) => self.audio_tracks().find(|t| t.index == index),
        };
        track
            .map(|t| AudioTrack {
                index: t.index,
                codec_name: t.codec_name.clone(),
                sample_rate: t.sample_rate,
                channels: t.channels,
            })
            .ok_or_else(|| TranscodeError::NoAudioTrack {
                path: self.path.clone(),
            })
    }
}
