pub mod asset_prober;
pub mod channel_layout;
pub mod ffmpeg_sample_sink;
pub mod ffmpeg_sample_source;

#[cfg(test)]
pub(crate) mod test_media;
