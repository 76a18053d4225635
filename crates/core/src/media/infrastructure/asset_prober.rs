use std::path::Path;

use crate::media::domain::media_asset::{MediaAsset, Track, TrackKind};
use crate::shared::error::TranscodeError;
use crate::shared::timestamp::Timestamp;

/// Probes `path` with libavformat and lists its streams.
///
/// Nothing is decoded; audio streams are opened just far enough to learn
/// their native rate and channel count.
pub fn open_asset(path: &Path) -> Result<MediaAsset, TranscodeError> {
    ffmpeg_next::init().map_err(|e| TranscodeError::open_failed(path, e))?;

    let ictx = ffmpeg_next::format::input(path).map_err(|e| TranscodeError::open_failed(path, e))?;

    let tracks: Vec<Track> = ictx.streams().map(|stream| describe(&stream)).collect();
    let duration = asset_duration(&ictx);

    log::debug!(
        "Probed {}: {} streams, {} audio, duration {duration}",
        path.display(),
        tracks.len(),
        tracks.iter().filter(|t| t.kind == TrackKind::Audio).count()
    );

    Ok(MediaAsset::new(path, tracks, duration))
}

fn describe(stream: &ffmpeg_next::format::stream::Stream) -> Track {
    let params = stream.parameters();
    let kind = match params.medium() {
        ffmpeg_next::media::Type::Audio => TrackKind::Audio,
        ffmpeg_next::media::Type::Video => TrackKind::Video,
        ffmpeg_next::media::Type::Subtitle => TrackKind::Subtitle,
        _ => TrackKind::Other,
    };
    let codec_name = params.id().name().to_string();

    let (sample_rate, channels) = if kind == TrackKind::Audio {
        ffmpeg_next::codec::context::Context::from_parameters(params)
            .and_then(|ctx| ctx.decoder().audio())
            .map(|decoder| (decoder.rate(), decoder.channels() as u16))
            .unwrap_or((0, 0))
    } else {
        (0, 0)
    };

    Track {
        index: stream.index(),
        kind,
        codec_name,
        sample_rate,
        channels,
    }
}

/// Container duration, falling back to the longest audio stream.
fn asset_duration(ictx: &ffmpeg_next::format::context::Input) -> Timestamp {
    let container = ictx.duration();
    if container > 0 {
        return Timestamp::new(container, ffmpeg_next::ffi::AV_TIME_BASE as i32);
    }

    ictx.streams()
        .filter(|s| s.parameters().medium() == ffmpeg_next::media::Type::Audio)
        .filter(|s| s.duration() > 0)
        .map(|s| {
            let tb = s.time_base();
            let seconds = s.duration() as f64 * tb.numerator() as f64 / tb.denominator() as f64;
            Timestamp::from_seconds(seconds)
        })
        .max()
        .unwrap_or(Timestamp::ZERO)
}
