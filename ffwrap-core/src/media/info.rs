//! Media description parsed from `ffprobe -print_format json` output.
//!
//! ffprobe writes most numbers as JSON strings and uses `"N/A"` for unknown
//! values, so numeric fields here go through lenient deserializers: anything
//! that does not parse becomes `None` rather than failing the whole document.
//! Only the document shape is strict: `format`, `streams` and each stream's
//! `index` must be present.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::{parse_rational, safe_float, safe_int};

/// Media stream types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    #[default]
    #[serde(other)]
    Other,
}

impl From<&str> for CodecType {
    fn from(s: &str) -> Self {
        match s {
            "video" => CodecType::Video,
            "audio" => CodecType::Audio,
            "subtitle" => CodecType::Subtitle,
            "data" => CodecType::Data,
            "attachment" => CodecType::Attachment,
            _ => CodecType::Other,
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecType::Video => write!(f, "video"),
            CodecType::Audio => write!(f, "audio"),
            CodecType::Subtitle => write!(f, "subtitle"),
            CodecType::Data => write!(f, "data"),
            CodecType::Attachment => write!(f, "attachment"),
            CodecType::Other => write!(f, "other"),
        }
    }
}

/// Stream information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Stream index, unique within a file
    pub index: u32,

    #[serde(default)]
    pub codec_type: CodecType,

    #[serde(default)]
    pub codec_name: Option<String>,

    #[serde(default)]
    pub codec_long_name: Option<String>,

    #[serde(default)]
    pub profile: Option<String>,

    // ---- Video ----
    #[serde(default, deserialize_with = "lenient_u32")]
    pub width: Option<u32>,

    #[serde(default, deserialize_with = "lenient_u32")]
    pub height: Option<u32>,

    #[serde(default)]
    pub pix_fmt: Option<String>,

    #[serde(default)]
    pub r_frame_rate: Option<String>,

    #[serde(default)]
    pub avg_frame_rate: Option<String>,

    // ---- Audio ----
    #[serde(default, deserialize_with = "lenient_u32")]
    pub sample_rate: Option<u32>,

    #[serde(default, deserialize_with = "lenient_u32")]
    pub channels: Option<u32>,

    #[serde(default)]
    pub channel_layout: Option<String>,

    // ---- Timing ----
    #[serde(default, deserialize_with = "lenient_f64")]
    pub start_time: Option<f64>,

    /// Duration in seconds as reported by ffprobe
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,

    /// Duration in `time_base` units
    #[serde(default, deserialize_with = "lenient_i64")]
    pub duration_ts: Option<i64>,

    #[serde(default)]
    pub time_base: Option<String>,

    #[serde(default, deserialize_with = "lenient_u64")]
    pub bit_rate: Option<u64>,

    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "lenient_flags")]
    pub disposition: BTreeMap<String, bool>,
}

impl StreamInfo {
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.codec_type == CodecType::Video
    }

    #[must_use]
    pub fn is_audio(&self) -> bool {
        self.codec_type == CodecType::Audio
    }

    #[must_use]
    pub fn is_subtitle(&self) -> bool {
        self.codec_type == CodecType::Subtitle
    }

    /// Value of a disposition flag, false when absent.
    #[must_use]
    pub fn disposition_flag(&self, name: &str) -> bool {
        self.disposition.get(name).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.disposition_flag("default")
    }

    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.disposition_flag("forced")
    }

    /// `language` tag, if present.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.tag("language")
    }

    /// `title` tag, if present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.tag("title")
    }

    /// Tag lookup, matching the key case-insensitively.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        lookup_tag(&self.tags, key)
    }

    /// Duration in seconds, falling back to `duration_ts * time_base`.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        if let Some(duration) = self.duration.filter(|d| *d > 0.0) {
            return Some(duration);
        }
        let ticks = self.duration_ts? as f64;
        let time_base = self.time_base.as_deref()?;
        let secs = match time_base.split_once('/') {
            Some((num, den)) => {
                let num = num.trim().parse::<f64>().ok()?;
                let den = den.trim().parse::<f64>().ok()?;
                if den == 0.0 {
                    return None;
                }
                ticks * num / den
            }
            None => ticks * parse_rational(time_base)?,
        };
        (secs > 0.0).then_some(secs)
    }

    /// Frame rate from `r_frame_rate`, or `avg_frame_rate` when the former is
    /// missing or `0/0`.
    #[must_use]
    pub fn frame_rate(&self) -> Option<f64> {
        [self.r_frame_rate.as_deref(), self.avg_frame_rate.as_deref()]
            .into_iter()
            .flatten()
            .filter_map(parse_rational)
            .find(|rate| *rate > 0.0)
    }
}

/// Container format information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub filename: Option<String>,

    #[serde(default, deserialize_with = "lenient_u32")]
    pub nb_streams: Option<u32>,

    #[serde(default, deserialize_with = "lenient_u32")]
    pub nb_programs: Option<u32>,

    #[serde(default)]
    pub format_name: Option<String>,

    #[serde(default)]
    pub format_long_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub start_time: Option<f64>,

    /// Duration in seconds
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,

    /// Size in bytes
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: Option<u64>,

    /// Bitrate in bits per second
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bit_rate: Option<u64>,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub probe_score: Option<i64>,

    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: BTreeMap<String, String>,
}

impl FormatInfo {
    /// Duration in seconds, only when positive.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.filter(|d| *d > 0.0)
    }

    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        lookup_tag(&self.tags, key)
    }
}

/// Complete media information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// Parses a full `-show_format -show_streams` document.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Stream with the given ffprobe index.
    #[must_use]
    pub fn stream(&self, index: u32) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index == index)
    }

    pub fn streams_of_type(&self, codec_type: CodecType) -> impl Iterator<Item = &StreamInfo> {
        self.streams
            .iter()
            .filter(move |s| s.codec_type == codec_type)
    }

    pub fn video_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams_of_type(CodecType::Video)
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams_of_type(CodecType::Audio)
    }

    pub fn subtitle_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams_of_type(CodecType::Subtitle)
    }

    /// Container duration, or the first video stream's when the container
    /// does not report one.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.format
            .duration_secs()
            .or_else(|| self.video_streams().find_map(StreamInfo::duration_secs))
    }
}

fn lookup_tag<'a>(tags: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    tags.get(key)
        .or_else(|| {
            tags.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

// ---- Lenient field deserializers ----

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(safe_float))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(safe_int))
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(safe_int)
        .and_then(|v| u64::try_from(v).ok()))
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(safe_int)
        .and_then(|v| u32::try_from(v).ok()))
}

fn lenient_tags<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let value = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    Ok(value
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Null => None,
            other => Some((k, other.to_string())),
        })
        .collect())
}

fn lenient_flags<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, bool>, D::Error> {
    let value = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    Ok(value
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let flag = match &v {
                Value::Bool(b) => *b,
                other => safe_int(other).is_some_and(|i| i != 0),
            };
            (k, flag)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_long_name": "H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10",
                "profile": "High",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "pix_fmt": "yuv420p",
                "r_frame_rate": "24000/1001",
                "avg_frame_rate": "24000/1001",
                "time_base": "1/1000",
                "start_time": "0.000000",
                "duration_ts": 60060,
                "disposition": {"default": 1, "forced": 0},
                "tags": {"language": "und", "BPS": 4000000}
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "sample_rate": "48000",
                "channels": 6,
                "channel_layout": "5.1",
                "r_frame_rate": "0/0",
                "avg_frame_rate": "0/0",
                "duration": "60.032000",
                "bit_rate": "N/A",
                "disposition": {"default": 0, "forced": 0},
                "tags": {"LANGUAGE": "eng", "title": "Surround"}
            },
            {
                "index": 2,
                "codec_name": "subrip",
                "codec_type": "subtitle",
                "duration": "N/A",
                "disposition": {"default": 0, "forced": 1},
                "tags": {"language": "fre"}
            },
            {
                "index": 3,
                "codec_type": "attachment",
                "tags": {"filename": "font.ttf", "mimetype": "font/ttf"}
            }
        ],
        "format": {
            "filename": "movie.mkv",
            "nb_streams": 4,
            "nb_programs": 0,
            "format_name": "matroska,webm",
            "format_long_name": "Matroska / WebM",
            "start_time": "0.000000",
            "duration": "60.060000",
            "size": "31457280",
            "bit_rate": "4190000",
            "probe_score": 100,
            "tags": {"ENCODER": "Lavf60.16.100"}
        }
    }"#;

    #[test]
    fn test_parse_full_document() {
        let info = MediaInfo::from_json_str(SAMPLE).unwrap();
        assert_eq!(info.streams.len(), 4);
        assert_eq!(info.format.format_name.as_deref(), Some("matroska,webm"));
        assert_eq!(info.format.size, Some(31_457_280));
        assert_eq!(info.format.bit_rate, Some(4_190_000));
        assert_eq!(info.format.probe_score, Some(100));
        assert_eq!(info.format.duration_secs(), Some(60.06));
        assert_eq!(info.format.tag("encoder"), Some("Lavf60.16.100"));
    }

    #[test]
    fn test_stream_lookup_and_types() {
        let info = MediaInfo::from_json_str(SAMPLE).unwrap();
        assert_eq!(info.video_streams().count(), 1);
        assert_eq!(info.audio_streams().count(), 1);
        assert_eq!(info.subtitle_streams().count(), 1);
        assert_eq!(info.streams_of_type(CodecType::Attachment).count(), 1);
        assert_eq!(info.stream(1).and_then(|s| s.codec_name.as_deref()), Some("aac"));
        assert!(info.stream(9).is_none());
    }

    #[test]
    fn test_lenient_numbers_and_flags() {
        let info = MediaInfo::from_json_str(SAMPLE).unwrap();
        let video = info.stream(0).unwrap();
        assert!(video.is_default());
        assert!(!video.is_forced());
        assert_eq!(video.tag("BPS"), Some("4000000"));

        let audio = info.stream(1).unwrap();
        assert_eq!(audio.sample_rate, Some(48_000));
        assert_eq!(audio.channels, Some(6));
        assert_eq!(audio.bit_rate, None);
        assert_eq!(audio.language(), Some("eng"));
        assert_eq!(audio.title(), Some("Surround"));

        let subtitle = info.stream(2).unwrap();
        assert!(subtitle.is_forced());
        assert_eq!(subtitle.duration, None);
        assert_eq!(subtitle.duration_secs(), None);
    }

    #[test]
    fn test_stream_duration_and_frame_rate() {
        let info = MediaInfo::from_json_str(SAMPLE).unwrap();
        let video = info.stream(0).unwrap();
        assert_eq!(video.duration_secs(), Some(60.06));
        let fps = video.frame_rate().unwrap();
        assert!((fps - 23.976).abs() < 0.001);

        let audio = info.stream(1).unwrap();
        assert_eq!(audio.frame_rate(), None);
        assert_eq!(audio.duration_secs(), Some(60.032));
    }

    #[test]
    fn test_media_duration_falls_back_to_video_stream() {
        let mut info = MediaInfo::from_json_str(SAMPLE).unwrap();
        info.format.duration = None;
        assert_eq!(info.duration_secs(), Some(60.06));
    }

    #[test]
    fn test_missing_required_keys_fail() {
        assert!(MediaInfo::from_json_str(r#"{"streams": []}"#).is_err());
        assert!(MediaInfo::from_json_str(r#"{"format": {}}"#).is_err());
        assert!(MediaInfo::from_json_str(r#"{"format": {}, "streams": [{"codec_type": "video"}]}"#).is_err());
    }

    #[test]
    fn test_unknown_codec_type() {
        let info = MediaInfo::from_json_str(
            r#"{"format": {}, "streams": [{"index": 0, "codec_type": "hologram"}, {"index": 1}]}"#,
        )
        .unwrap();
        assert_eq!(info.streams[0].codec_type, CodecType::Other);
        assert_eq!(info.streams[1].codec_type, CodecType::Other);
        assert_eq!(CodecType::from("audio"), CodecType::Audio);
        assert_eq!(CodecType::Subtitle.to_string(), "subtitle");
    }
}
