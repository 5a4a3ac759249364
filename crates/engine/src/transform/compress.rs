use super::{require_video, Outcome, TransformEngine};
use crate::error::MediaError;
use crate::paths::{derived_path, derived_path_in, MediaPath};
use crate::probe;
use crate::progress::ProgressSink;
use crate::tool::Invocation;
use std::fs;
use std::path::Path;
use tracing::info;

/// What to do with a video of a given size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressDecision {
    /// Both dimensions already below the threshold
    Skip,
    /// Re-encode with this `scale` filter
    Scale(String),
}

/// Landscape scales the height to `min_resolution`, everything else the
/// width; the other side keeps the aspect ratio rounded to even.
pub fn scale_filter(width: u32, height: u32, min_resolution: u32) -> CompressDecision {
    if width < min_resolution && height < min_resolution {
        return CompressDecision::Skip;
    }
    if width > height {
        CompressDecision::Scale(format!("scale=-2:{}", min_resolution))
    } else {
        CompressDecision::Scale(format!("scale={}:-2", min_resolution))
    }
}

fn is_nvenc(vcodec: &str) -> bool {
    vcodec.contains("nvenc")
}

fn build_compress(input: &Path, scale: &str, vcodec: &str, bitrate_kbps: u32) -> Invocation {
    let mut inv = Invocation::ffmpeg();
    if is_nvenc(vcodec) {
        inv.args(["-hwaccel", "cuda"]);
    }
    inv.arg("-i")
        .arg(input)
        .args(["-vf", scale, "-c:v", vcodec])
        .arg("-b:v")
        .arg(format!("{}k", bitrate_kbps))
        .args(["-pix_fmt", "yuv420p", "-c:a", "copy"]);
    inv
}

impl TransformEngine {
    pub(super) fn compress(
        &self,
        input: &MediaPath,
        bitrate_kbps: u32,
        min_resolution: u32,
        vcodec: &str,
        output_dir: Option<&Path>,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Outcome, MediaError> {
        require_video(input)?;
        if bitrate_kbps == 0 || min_resolution == 0 {
            return Err(MediaError::InvalidParameter(format!(
                "bitrate ({}k) and minimum resolution ({}) must be positive",
                bitrate_kbps, min_resolution
            )));
        }

        let (width, height) = probe::resolution(self.tool(), &input.path)?;
        let scale = match scale_filter(width, height, min_resolution) {
            CompressDecision::Skip => {
                info!(
                    "{} is {}x{}, below {}; left as is",
                    input.path.display(),
                    width,
                    height,
                    min_resolution
                );
                return Ok(Outcome::Unchanged {
                    path: input.path.clone(),
                    reason: "already below threshold".to_string(),
                });
            }
            CompressDecision::Scale(scale) => scale,
        };

        let output = match output_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                derived_path_in(dir, &input.path, "__compressed.mp4")
            }
            None => derived_path(&input.path, "__compressed.mp4"),
        };

        self.encode(
            build_compress(&input.path, &scale, vcodec, bitrate_kbps),
            &output,
            || self.duration_hint(&input.path),
            progress,
        )?;

        info!(
            "compressed {} ({}x{}) -> {}",
            input.path.display(),
            width,
            height,
            output.display()
        );
        Ok(Outcome::Written(output))
    }
}
