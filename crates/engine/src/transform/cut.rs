use super::{require_video, seconds_arg, Outcome, TransformEngine, TrimMode};
use crate::error::MediaError;
use crate::paths::{derived_path, MediaPath};
use crate::progress::ProgressSink;
use crate::timespec::TimeSpec;
use crate::tool::Invocation;
use std::path::Path;
use tracing::info;

/// Validated cut bounds in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CutRange {
    start: Option<f64>,
    end: Option<f64>,
}

impl CutRange {
    fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, MediaError> {
        let start = TimeSpec::parse_optional(start)?.map(|t| t.seconds());
        let end = TimeSpec::parse_optional(end)?.map(|t| t.seconds());

        match (start, end) {
            (None, None) => Err(MediaError::InvalidRange(
                "at least one of start or end is required".to_string(),
            )),
            (Some(s), Some(e)) if s >= e => Err(MediaError::InvalidRange(format!(
                "start {}s is not before end {}s",
                s, e
            ))),
            _ => Ok(Self { start, end }),
        }
    }

    /// Length of the cut when the end is known.
    fn length(&self) -> Option<f64> {
        self.end.map(|e| e - self.start.unwrap_or(0.0))
    }

    fn trim_args(&self) -> String {
        let mut args = Vec::new();
        if let Some(s) = self.start {
            args.push(format!("start={}", seconds_arg(s)));
        }
        if let Some(e) = self.end {
            args.push(format!("end={}", seconds_arg(e)));
        }
        args.join(":")
    }
}

fn build_fast_seek(input: &Path, range: &CutRange) -> Invocation {
    let mut inv = Invocation::ffmpeg();
    if let Some(s) = range.start {
        inv.arg("-ss").arg(seconds_arg(s));
    }
    inv.arg("-i").arg(input);
    if let Some(len) = range.length() {
        inv.arg("-t").arg(seconds_arg(len));
    }
    inv.args(["-c", "copy", "-avoid_negative_ts", "make_zero"]);
    inv
}

fn build_frame_accurate(input: &Path, range: &CutRange, vcodec: &str) -> Invocation {
    let trim = range.trim_args();
    let mut inv = Invocation::ffmpeg();
    inv.arg("-i")
        .arg(input)
        .arg("-vf")
        .arg(format!("trim={},setpts=PTS-STARTPTS", trim))
        .arg("-af")
        .arg(format!("atrim={},asetpts=PTS-STARTPTS", trim))
        .args(["-c:v", vcodec, "-c:a", "aac"]);
    inv
}

impl TransformEngine {
    pub(super) fn cut(
        &self,
        input: &MediaPath,
        start: Option<&str>,
        end: Option<&str>,
        mode: TrimMode,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        require_video(input)?;
        let range = CutRange::parse(start, end)?;
        let output = derived_path(&input.path, "__cut.mp4");

        let invocation = match mode {
            TrimMode::FastSeek => build_fast_seek(&input.path, &range),
            TrimMode::FrameAccurate => {
                build_frame_accurate(&input.path, &range, self.default_codec())
            }
        };

        self.encode(
            invocation,
            &output,
            || {
                range.length().or_else(|| {
                    self.duration_hint(&input.path)
                        .map(|d| (d - range.start.unwrap_or(0.0)).max(0.0))
                })
            },
            progress,
        )?;

        info!("cut {} -> {}", input.path.display(), output.display());
        Ok(Outcome::Written(output))
    }
}
