//! Media probing through ffprobe.
//!
//! Metadata is fetched per call and never cached; every lookup that cannot
//! be answered returns a typed error instead of a zero sentinel.

use crate::error::MediaError;
use crate::paths::{classify, MediaKind};
use crate::tool::MediaTool;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub bit_rate: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub bit_rate: Option<String>,
    }
}

/// One stream reported by ffprobe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    /// "video", "audio", "subtitle", ...
    pub codec_type: String,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Bits per second
    pub bit_rate: Option<u64>,
}

/// Container level information.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormatInfo {
    pub duration_secs: Option<f64>,
    /// Bits per second
    pub bit_rate: Option<u64>,
}

/// Parsed ffprobe output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub streams: Vec<StreamInfo>,
    pub format: FormatInfo,
}

impl ProbeResult {
    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }

    pub fn first_audio(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.codec_type == "audio")
    }
}

/// Parses `ffprobe -print_format json -show_streams -show_format` output.
///
/// Numeric fields arrive as strings; unparsable values become `None`.
pub fn parse_ffprobe_output(json_str: &str) -> Result<ProbeResult, serde_json::Error> {
    let ffprobe: ffprobe_json::FfprobeOutput = serde_json::from_str(json_str)?;

    let streams = ffprobe
        .streams
        .unwrap_or_default()
        .into_iter()
        .map(|stream| StreamInfo {
            codec_type: stream.codec_type.unwrap_or_default(),
            codec_name: stream.codec_name,
            width: stream.width,
            height: stream.height,
            bit_rate: stream.bit_rate.as_deref().and_then(parse_bit_rate),
        })
        .collect();

    let format = ffprobe
        .format
        .map(|format| FormatInfo {
            duration_secs: format
                .duration
                .as_deref()
                .and_then(|d| d.trim().parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d >= 0.0),
            bit_rate: format.bit_rate.as_deref().and_then(parse_bit_rate),
        })
        .unwrap_or_default();

    Ok(ProbeResult { streams, format })
}

fn parse_bit_rate(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

/// Video stream summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub codec: Option<String>,
}

/// What an operation learns about one input.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub duration_secs: f64,
    pub video: Option<VideoInfo>,
    pub bitrate_kbps: Option<u64>,
    pub audio_codec: Option<String>,
}

fn ensure_media(path: &Path) -> Result<MediaKind, MediaError> {
    match classify(path) {
        MediaKind::Unknown => Err(MediaError::NotAMediaFile(path.to_path_buf())),
        kind => Ok(kind),
    }
}

/// Full probe of a classified media file.
pub fn probe(tool: &dyn MediaTool, path: &Path) -> Result<MediaProbe, MediaError> {
    ensure_media(path)?;
    let result = tool.probe(path)?;

    let duration_secs = result
        .format
        .duration_secs
        .ok_or_else(|| MediaError::probe_unavailable(path, "duration not reported"))?;

    let video = result.first_video().and_then(|stream| match (stream.width, stream.height) {
        (Some(width), Some(height)) => Some(VideoInfo {
            width,
            height,
            codec: stream.codec_name.clone(),
        }),
        _ => None,
    });

    Ok(MediaProbe {
        duration_secs,
        video,
        bitrate_kbps: bitrate_of(&result),
        audio_codec: result.first_audio().and_then(|s| s.codec_name.clone()),
    })
}

/// Duration in seconds.
pub fn duration(tool: &dyn MediaTool, path: &Path) -> Result<f64, MediaError> {
    ensure_media(path)?;
    tool.probe(path)?
        .format
        .duration_secs
        .ok_or_else(|| MediaError::probe_unavailable(path, "duration not reported"))
}

/// Width and height of the first video stream.
pub fn resolution(tool: &dyn MediaTool, path: &Path) -> Result<(u32, u32), MediaError> {
    ensure_media(path)?;
    let result = tool.probe(path)?;
    let stream = result
        .first_video()
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;

    match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(MediaError::probe_unavailable(path, "resolution not reported")),
    }
}

/// Bitrate in kbps, from the first video (or audio) stream, falling back to
/// the container bitrate.
pub fn bitrate(tool: &dyn MediaTool, path: &Path) -> Result<u64, MediaError> {
    ensure_media(path)?;
    let result = tool.probe(path)?;
    bitrate_of(&result).ok_or_else(|| MediaError::probe_unavailable(path, "bitrate not reported"))
}

fn bitrate_of(result: &ProbeResult) -> Option<u64> {
    let primary = result.first_video().or_else(|| result.first_audio());
    primary
        .and_then(|s| s.bit_rate)
        .or(result.format.bit_rate)
        .map(|bps| bps / 1000)
}

/// `(video codec, audio codec)` of the first stream of each type.
pub fn codecs(
    tool: &dyn MediaTool,
    path: &Path,
) -> Result<(Option<String>, Option<String>), MediaError> {
    ensure_media(path)?;
    let result = tool.probe(path)?;
    Ok((
        result.first_video().and_then(|s| s.codec_name.clone()),
        result.first_audio().and_then(|s| s.codec_name.clone()),
    ))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::FakeTool;
    use proptest::prelude::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "bit_rate": "4500000"},
            {"codec_type": "audio", "codec_name": "aac", "bit_rate": "128000"}
        ],
        "format": {"duration": "61.500000", "bit_rate": "4700000"}
    }"#;

    #[test]
    fn test_parse_ffprobe_output_basic() {
        let result = parse_ffprobe_output(SAMPLE).unwrap();
        assert_eq!(result.streams.len(), 2);
        assert_eq!(result.format.duration_secs, Some(61.5));
        let video = result.first_video().unwrap();
        assert_eq!(video.width, Some(1920));
        assert_eq!(video.bit_rate, Some(4_500_000));
        assert_eq!(result.first_audio().unwrap().codec_name.as_deref(), Some("aac"));
    }

    #[test]
    fn test_parse_ffprobe_output_missing_optional_fields() {
        let result = parse_ffprobe_output(r#"{"streams": [{"codec_type": "audio"}]}"#).unwrap();
        assert_eq!(result.format, FormatInfo::default());
        assert_eq!(result.streams[0].codec_name, None);
        assert!(parse_ffprobe_output("{not json").is_err());
    }

    #[test]
    fn test_probe_reports_everything() {
        let tool = FakeTool::new();
        tool.set_probe("/media/a.mp4", parse_ffprobe_output(SAMPLE).unwrap());

        let probe = probe(&tool, Path::new("/media/a.mp4")).unwrap();
        assert_eq!(probe.duration_secs, 61.5);
        assert_eq!(
            probe.video,
            Some(VideoInfo { width: 1920, height: 1080, codec: Some("h264".to_string()) })
        );
        assert_eq!(probe.bitrate_kbps, Some(4500));
        assert_eq!(probe.audio_codec.as_deref(), Some("aac"));
    }

    #[test]
    fn test_unknown_extension_is_not_media() {
        let tool = FakeTool::new();
        let err = duration(&tool, Path::new("/media/notes.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAMediaFile);
    }

    #[test]
    fn test_missing_duration_is_probe_unavailable() {
        let tool = FakeTool::new();
        tool.set_probe("/media/a.mp3", ProbeResult::default());
        let err = duration(&tool, Path::new("/media/a.mp3")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProbeUnavailable);
    }

    #[test]
    fn test_resolution_without_video_stream() {
        let tool = FakeTool::new();
        tool.set_probe("/media/song.mp3", FakeTool::audio_probe(30.0));
        let err = resolution(&tool, Path::new("/media/song.mp3")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoVideoStream);
    }

    #[test]
    fn test_bitrate_falls_back_to_container() {
        let tool = FakeTool::new();
        let mut result = parse_ffprobe_output(SAMPLE).unwrap();
        for stream in &mut result.streams {
            stream.bit_rate = None;
        }
        tool.set_probe("/media/a.mkv", result);
        assert_eq!(bitrate(&tool, Path::new("/media/a.mkv")).unwrap(), 4700);
    }

    #[test]
    fn test_codecs() {
        let tool = FakeTool::new();
        tool.set_probe("/media/a.webm", parse_ffprobe_output(SAMPLE).unwrap());
        let (v, a) = codecs(&tool, Path::new("/media/a.webm")).unwrap();
        assert_eq!(v.as_deref(), Some("h264"));
        assert_eq!(a.as_deref(), Some("aac"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_parse_ffprobe_output_dimensions(
            width in 1u32..8000,
            height in 1u32..8000,
            duration in 0.1f64..10000.0,
        ) {
            let json = format!(
                r#"{{"streams": [{{"codec_type": "video", "width": {}, "height": {}}}],
                    "format": {{"duration": "{}"}}}}"#,
                width, height, duration
            );
            let result = parse_ffprobe_output(&json).unwrap();
            let video = result.first_video().unwrap();
            prop_assert_eq!(video.width, Some(width));
            prop_assert_eq!(video.height, Some(height));
            prop_assert!((result.format.duration_secs.unwrap() - duration).abs() < 1e-6);
        }
    }
}
