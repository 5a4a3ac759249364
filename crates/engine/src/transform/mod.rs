//! Transform engine: one parameterized executor for every operation.
//!
//! Each operation writes a derived output named from the input stem, so a
//! re-run overwrites the previous result and concurrent jobs on different
//! inputs never share a file.

mod audio;
mod compress;
mod convert;
mod cut;
mod effects;

pub use compress::{scale_filter, CompressDecision};
pub use convert::{codec_plan, CodecPlan};

use crate::error::MediaError;
use crate::loudness::LoudnessMixer;
use crate::pairing::PairingAssigner;
use crate::paths::MediaPath;
use crate::probe;
use crate::progress::{ProgressMonitor, ProgressSink};
use crate::tool::{Invocation, MediaTool};
use media_batch_config::Settings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Video bitrate used when an audio replace also re-encodes the video
pub const REPLACE_VIDEO_BITRATE_KBPS: u32 = 8000;

/// Audio bitrate used when an audio replace also re-encodes the video
pub const REPLACE_AUDIO_BITRATE_KBPS: u32 = 192;

/// Trim strategy for [`Operation::Cut`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimMode {
    /// trim/atrim filters with a full re-encode
    FrameAccurate,
    /// input seek plus stream copy, aligned to keyframes
    FastSeek,
}

/// Where an audio operation takes its track from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Fixed(PathBuf),
    /// Drawn from a shared assigner once per job
    Paired(Arc<PairingAssigner>),
}

impl AudioSource {
    fn resolve(&self) -> PathBuf {
        match self {
            AudioSource::Fixed(path) => path.clone(),
            AudioSource::Paired(assigner) => assigner.next().to_path_buf(),
        }
    }
}

/// An operation and its parameters; shared read-only by every job of a batch.
#[derive(Debug, Clone)]
pub enum Operation {
    Cut {
        start: Option<String>,
        end: Option<String>,
        mode: TrimMode,
    },
    Convert {
        extension: String,
    },
    Compress {
        bitrate_kbps: u32,
        min_resolution: u32,
        /// Falls back to the settings codec when `None`
        vcodec: Option<String>,
        output_dir: Option<PathBuf>,
    },
    AudioReplace {
        audio: AudioSource,
        compress: bool,
    },
    AudioCombine {
        audio: AudioSource,
        compress: bool,
    },
    Upscale {
        factor: u32,
    },
    Reverb,
    DeepVoice {
        rate: f64,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Cut { .. } => "cut",
            Operation::Convert { .. } => "convert",
            Operation::Compress { .. } => "compress",
            Operation::AudioReplace { .. } => "audio_replace",
            Operation::AudioCombine { .. } => "audio_combine",
            Operation::Upscale { .. } => "upscale",
            Operation::Reverb => "reverb",
            Operation::DeepVoice { .. } => "deep_voice",
        }
    }
}

/// Successful result of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written(PathBuf),
    /// Nothing to do; `path` is the untouched input
    Unchanged { path: PathBuf, reason: String },
}

impl Outcome {
    pub fn path(&self) -> &Path {
        match self {
            Outcome::Written(path) => path,
            Outcome::Unchanged { path, .. } => path,
        }
    }
}

pub struct TransformEngine {
    tool: Arc<dyn MediaTool>,
    default_codec: String,
    mixer: LoudnessMixer,
}

impl TransformEngine {
    pub fn new(tool: Arc<dyn MediaTool>, settings: &Settings) -> Self {
        Self {
            tool,
            default_codec: settings.default_codec.clone(),
            mixer: LoudnessMixer::default(),
        }
    }

    /// Replaces the default loudness mixer (divisor 1.5).
    pub fn with_mixer(mut self, mixer: LoudnessMixer) -> Self {
        self.mixer = mixer;
        self
    }

    pub fn tool(&self) -> &dyn MediaTool {
        self.tool.as_ref()
    }

    pub fn default_codec(&self) -> &str {
        &self.default_codec
    }

    /// Runs `operation` on `input`.
    ///
    /// With a progress sink, long-running encodes report through a
    /// [`ProgressMonitor`]; without one they run silently.
    pub fn execute(
        &self,
        input: &MediaPath,
        operation: &Operation,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        if !input.path.exists() {
            return Err(MediaError::InvalidPath(input.path.clone()));
        }
        debug!("{} {}", operation.name(), input.path.display());

        match operation {
            Operation::Cut { start, end, mode } => {
                self.cut(input, start.as_deref(), end.as_deref(), *mode, progress)
            }
            Operation::Convert { extension } => self.convert(input, extension, progress),
            Operation::Compress {
                bitrate_kbps,
                min_resolution,
                vcodec,
                output_dir,
            } => self.compress(
                input,
                *bitrate_kbps,
                *min_resolution,
                vcodec.as_deref().unwrap_or(&self.default_codec),
                output_dir.as_deref(),
                progress,
            ),
            Operation::AudioReplace { audio, compress } => {
                let audio = self.checked_audio(audio)?;
                self.audio_replace(input, &audio, *compress, progress)
            }
            Operation::AudioCombine { audio, compress } => {
                let audio = self.checked_audio(audio)?;
                self.audio_combine(input, &audio, *compress, progress)
            }
            Operation::Upscale { factor } => self.upscale(input, *factor, progress),
            Operation::Reverb => self.reverb(input, progress),
            Operation::DeepVoice { rate } => self.deep_voice(input, *rate, progress),
        }
    }

    fn checked_audio(&self, source: &AudioSource) -> Result<MediaPath, MediaError> {
        let audio = MediaPath::from_path(source.resolve());
        if !audio.path.exists() {
            return Err(MediaError::InvalidPath(audio.path));
        }
        if !audio.is_audio() && !audio.is_video() {
            return Err(MediaError::NotAMediaFile(audio.path));
        }
        Ok(audio)
    }

    /// Runs an encode whose output is `output`, attaching a progress
    /// monitor sized to `total_secs` when a sink is given.
    fn encode(
        &self,
        mut invocation: Invocation,
        output: &Path,
        total_secs: impl FnOnce() -> Option<f64>,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<(), MediaError> {
        match progress {
            Some(sink) => {
                let total = total_secs().unwrap_or(0.0);
                invocation.with_progress_feed().arg(output);
                let mut monitor = ProgressMonitor::new(total, sink);
                self.tool.run_with_progress(&invocation, &mut monitor)?;
            }
            None => {
                invocation.arg(output);
                self.tool.run(&invocation)?;
            }
        }

        if !output.exists() {
            return Err(MediaError::ExternalToolFailure {
                program: invocation.program.as_str().to_string(),
                status: "exit code 0".to_string(),
                diagnostic: format!("expected output {} was not written", output.display()),
            });
        }
        Ok(())
    }

    /// Input duration for progress sizing; a failed probe only costs the
    /// percentage, not the job.
    fn duration_hint(&self, path: &Path) -> Option<f64> {
        match probe::duration(self.tool(), path) {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!("progress without total for {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Requires a video input.
fn require_video(input: &MediaPath) -> Result<(), MediaError> {
    if input.is_video() {
        Ok(())
    } else {
        Err(MediaError::NotAVideoFile(input.path.clone()))
    }
}

/// Requires an input that is either audio or video.
fn require_media(input: &MediaPath) -> Result<(), MediaError> {
    if input.is_video() || input.is_audio() {
        Ok(())
    } else {
        Err(MediaError::NotAMediaFile(input.path.clone()))
    }
}

/// `12.5` -> `"12.5"`, `90.0` -> `"90"`
fn seconds_arg(secs: f64) -> String {
    secs.to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::paths::normalize;
    use crate::testing::FakeTool;
    use tempfile::TempDir;

    pub(super) fn engine_with(tool: Arc<FakeTool>) -> TransformEngine {
        TransformEngine::new(tool, &Settings::default())
    }

    #[test]
    fn test_missing_input_is_invalid_path_for_every_operation() {
        let tool = Arc::new(FakeTool::new());
        let engine = engine_with(tool.clone());
        let input = normalize("/definitely/not/here.mp4");

        let operations = vec![
            Operation::Cut { start: Some("1".into()), end: None, mode: TrimMode::FastSeek },
            Operation::Convert { extension: "mkv".into() },
            Operation::Compress { bitrate_kbps: 2000, min_resolution: 720, vcodec: None, output_dir: None },
            Operation::AudioReplace { audio: AudioSource::Fixed("/x.mp3".into()), compress: false },
            Operation::AudioCombine { audio: AudioSource::Fixed("/x.mp3".into()), compress: false },
            Operation::Upscale { factor: 2 },
            Operation::Reverb,
            Operation::DeepVoice { rate: 0.8 },
        ];
        for op in &operations {
            let err = engine.execute(&input, op, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath, "operation {}", op.name());
        }
        assert!(tool.invocations().is_empty());
    }

    #[test]
    fn test_missing_output_is_tool_failure() {
        struct SilentTool;
        impl MediaTool for SilentTool {
            fn run(&self, _: &Invocation) -> Result<crate::tool::ToolOutput, MediaError> {
                Ok(Default::default())
            }
        }

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.mp4");
        std::fs::write(&input, b"x").unwrap();
        let engine = TransformEngine::new(Arc::new(SilentTool), &Settings::default());

        let err = engine
            .execute(&MediaPath::from_path(input), &Operation::Reverb, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
    }

    #[test]
    fn test_outcome_path() {
        let written = Outcome::Written(PathBuf::from("/m/a__cut.mp4"));
        assert_eq!(written.path(), Path::new("/m/a__cut.mp4"));
        let unchanged = Outcome::Unchanged { path: PathBuf::from("/m/a.mp4"), reason: "small".into() };
        assert_eq!(unchanged.path(), Path::new("/m/a.mp4"));
    }

    #[test]
    fn test_seconds_arg() {
        assert_eq!(seconds_arg(90.0), "90");
        assert_eq!(seconds_arg(12.5), "12.5");
    }
}
