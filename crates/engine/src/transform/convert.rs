use super::{require_media, Outcome, TransformEngine};
use crate::error::MediaError;
use crate::paths::{classify, derived_path, extension_of, MediaKind, MediaPath};
use crate::progress::ProgressSink;
use crate::tool::Invocation;
use std::path::Path;
use tracing::info;

/// Encoders for one target container. `video: None` drops the video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPlan {
    pub video: Option<String>,
    pub audio: &'static str,
}

/// Codec table keyed by target extension (lowercase, without the dot).
pub fn codec_plan(extension: &str, default_codec: &str) -> Option<CodecPlan> {
    let (video, audio) = match extension {
        "mp4" | "mkv" | "mov" => (Some(default_codec.to_string()), "aac"),
        "webm" => (Some("libvpx-vp9".to_string()), "libopus"),
        "avi" => (Some("mpeg4".to_string()), "aac"),
        "mp3" => (None, "libmp3lame"),
        "wav" => (None, "pcm_s16le"),
        "ogg" => (None, "libvorbis"),
        "flac" => (None, "flac"),
        _ => return None,
    };
    Some(CodecPlan { video, audio })
}

fn build_convert(input: &Path, plan: &CodecPlan) -> Invocation {
    let mut inv = Invocation::ffmpeg();
    inv.arg("-i").arg(input);
    match &plan.video {
        Some(vcodec) => {
            inv.args(["-c:v", vcodec.as_str()]);
        }
        None => {
            inv.arg("-vn");
        }
    }
    inv.args(["-c:a", plan.audio]);
    inv
}

impl TransformEngine {
    pub(super) fn convert(
        &self,
        input: &MediaPath,
        extension: &str,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        require_media(input)?;

        let ext = extension.trim().trim_start_matches('.').to_lowercase();
        let plan = codec_plan(&ext, self.default_codec())
            .ok_or_else(|| MediaError::UnsupportedExtension(extension.to_string()))?;

        let target_kind = classify(Path::new(&format!("x.{}", ext)));
        if target_kind == MediaKind::Video && input.is_audio() {
            return Err(MediaError::NotAVideoFile(input.path.clone()));
        }

        let output = if extension_of(&input.path).as_deref() == Some(ext.as_str()) {
            derived_path(&input.path, &format!("__converted.{}", ext))
        } else {
            derived_path(&input.path, &format!(".{}", ext))
        };

        self.encode(
            build_convert(&input.path, &plan),
            &output,
            || self.duration_hint(&input.path),
            progress,
        )?;

        info!("converted {} -> {}", input.path.display(), output.display());
        Ok(Outcome::Written(output))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::FakeTool;
    use crate::transform::Operation;
    use media_batch_config::Settings;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn convert(ext: &str) -> Operation {
        Operation::Convert { extension: ext.to_string() }
    }

    fn engine(tool: &Arc<FakeTool>) -> TransformEngine {
        let settings = Settings { max_workers: 2, default_codec: "libx264".to_string() };
        TransformEngine::new(tool.clone(), &settings)
    }

    fn file(dir: &TempDir, name: &str) -> MediaPath {
        let path = dir.path().join(name);
        fs::write(&path, b"x").unwrap();
        MediaPath::from_path(path)
    }

    #[test]
    fn test_codec_table() {
        let plan = codec_plan("mkv", "hevc_nvenc").unwrap();
        assert_eq!(plan.video.as_deref(), Some("hevc_nvenc"));
        assert_eq!(plan.audio, "aac");

        let plan = codec_plan("webm", "hevc_nvenc").unwrap();
        assert_eq!(plan.video.as_deref(), Some("libvpx-vp9"));
        assert_eq!(plan.audio, "libopus");

        assert_eq!(codec_plan("avi", "x").unwrap().video.as_deref(), Some("mpeg4"));
        assert_eq!(codec_plan("wav", "x").unwrap(), CodecPlan { video: None, audio: "pcm_s16le" });
        assert_eq!(codec_plan("ogg", "x").unwrap().audio, "libvorbis");
        assert_eq!(codec_plan("flac", "x").unwrap().audio, "flac");
        assert!(codec_plan("gif", "x").is_none());
    }

    #[test]
    fn test_video_to_mp3_drops_video() {
        let dir = TempDir::new().unwrap();
        let input = file(&dir, "talk.mp4");
        let tool = Arc::new(FakeTool::new());

        let outcome = engine(&tool).execute(&input, &convert(".MP3"), None).unwrap();
        assert_eq!(outcome, Outcome::Written(dir.path().join("talk.mp3")));

        let inv = &tool.invocations()[0];
        assert!(inv.args.iter().any(|a| a == "-vn"));
        assert_eq!(inv.value_of("-c:a").unwrap(), "libmp3lame");
    }

    #[test]
    fn test_container_change_uses_settings_codec() {
        let dir = TempDir::new().unwrap();
        let input = file(&dir, "clip.mov");
        let tool = Arc::new(FakeTool::new());

        engine(&tool).execute(&input, &convert("mp4"), None).unwrap();
        let inv = &tool.invocations()[0];
        assert_eq!(inv.value_of("-c:v").unwrap(), "libx264");
        assert_eq!(inv.value_of("-c:a").unwrap(), "aac");
    }

    #[test]
    fn test_same_extension_gets_converted_suffix() {
        let dir = TempDir::new().unwrap();
        let input = file(&dir, "clip.mp4");
        let tool = Arc::new(FakeTool::new());

        let outcome = engine(&tool).execute(&input, &convert("mp4"), None).unwrap();
        assert_eq!(outcome, Outcome::Written(dir.path().join("clip__converted.mp4")));
        assert!(input.path.exists());
    }

    #[test]
    fn test_conversion_errors() {
        let dir = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new());
        let engine = engine(&tool);

        let err = engine.execute(&file(&dir, "clip.mp4"), &convert("gif"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedExtension);

        let err = engine.execute(&file(&dir, "song.wav"), &convert("webm"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAVideoFile);

        let err = engine.execute(&file(&dir, "notes.txt"), &convert("mp3"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAMediaFile);

        assert!(tool.invocations().is_empty());
    }

    #[test]
    fn test_never_writes_over_same_stem_sibling() {
        let dir = TempDir::new().unwrap();
        let mp4 = file(&dir, "a.mp4");
        let mkv = file(&dir, "a.mkv");
        fs::write(&mkv.path, b"original").unwrap();
        let tool = Arc::new(FakeTool::new());
        let engine = engine(&tool);

        let first = engine.execute(&mp4, &convert("mkv"), None).unwrap();
        let second = engine.execute(&mkv, &convert("mkv"), None).unwrap();
        assert_eq!(first, Outcome::Written(dir.path().join("a_mp4.mkv")));
        assert_eq!(second, Outcome::Written(dir.path().join("a_mkv__converted.mkv")));
        assert_eq!(fs::read(&mkv.path).unwrap(), b"original");
    }

    #[test]
    fn test_audio_to_audio() {
        let dir = TempDir::new().unwrap();
        let input = file(&dir, "song.wav");
        let tool = Arc::new(FakeTool::new());

        let outcome = engine(&tool).execute(&input, &convert("flac"), None).unwrap();
        assert_eq!(outcome, Outcome::Written(dir.path().join("song.flac")));
    }
}
