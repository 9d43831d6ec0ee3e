//! Media description model.
//!
//! The types here mirror ffprobe's JSON output and are produced by
//! [`crate::external::FfprobeRunner`].

mod info;

pub use info::{CodecType, FormatInfo, MediaInfo, StreamInfo};
