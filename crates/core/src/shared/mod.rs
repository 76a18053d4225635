pub mod constants;
pub mod error;
pub mod format_descriptor;
pub mod pipeline_status;
pub mod sample_buffer;
pub mod timestamp;
