pub mod media_asset;
pub mod readiness;
pub mod sample_sink;
pub mod sample_source;
