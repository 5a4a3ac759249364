//! Loudness-aware mixing of two audio tracks.

use crate::error::MediaError;
use crate::tool::{Invocation, MediaTool};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Integrated loudness assumed when measurement fails
pub const DEFAULT_LOUDNESS_LUFS: f64 = -24.0;

/// Fraction of the loudness gap that is compensated (1.0 = full equalization)
pub const DEFAULT_SOFTENING_DIVISOR: f64 = 1.5;

#[derive(Debug, Deserialize)]
struct LoudnormStats {
    input_i: String,
}

/// Analysis pass: `ffmpeg -i <path> -af loudnorm=...:print_format=json -f null -`.
pub fn build_loudness_invocation(path: &Path) -> Invocation {
    let mut inv = Invocation::ffmpeg();
    inv.arg("-nostats")
        .arg("-i")
        .arg(path)
        .args([
            "-af",
            "loudnorm=I=-24:LRA=7:TP=-2:print_format=json",
            "-f",
            "null",
            "-",
        ]);
    inv
}

/// Extracts `input_i` from the JSON block loudnorm prints at the end of
/// stderr. Silence reports `-inf`, which counts as unmeasurable.
pub fn parse_loudnorm_output(stderr: &str) -> Option<f64> {
    let start = stderr.rfind('{')?;
    let end = start + stderr[start..].find('}')?;
    let stats: LoudnormStats = serde_json::from_str(&stderr[start..=end]).ok()?;
    stats
        .input_i
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Integrated loudness of `path` in LUFS, or the default with a warning.
pub fn measure_loudness(tool: &dyn MediaTool, path: &Path) -> f64 {
    let measured = tool
        .run(&build_loudness_invocation(path))
        .map(|output| parse_loudnorm_output(&output.stderr));

    match measured {
        Ok(Some(lufs)) => lufs,
        Ok(None) => {
            warn!(
                "no loudness reported for {}, assuming {} LUFS",
                path.display(),
                DEFAULT_LOUDNESS_LUFS
            );
            DEFAULT_LOUDNESS_LUFS
        }
        Err(e) => {
            warn!(
                "loudness analysis failed for {}: {}; assuming {} LUFS",
                path.display(),
                e,
                DEFAULT_LOUDNESS_LUFS
            );
            DEFAULT_LOUDNESS_LUFS
        }
    }
}

/// Attenuation in dB for `(first, second)`; only the louder one is lowered.
pub fn gain_compensation(first_lufs: f64, second_lufs: f64, divisor: f64) -> (f64, f64) {
    if first_lufs > second_lufs {
        ((first_lufs - second_lufs) / divisor, 0.0)
    } else {
        (0.0, (second_lufs - first_lufs) / divisor)
    }
}

/// Measured levels and applied attenuation of one mix.
#[derive(Debug, Clone, PartialEq)]
pub struct MixPlan {
    pub loudness: (f64, f64),
    pub attenuation_db: (f64, f64),
}

#[derive(Debug, Clone)]
pub struct LoudnessMixer {
    divisor: f64,
}

impl Default for LoudnessMixer {
    fn default() -> Self {
        Self {
            divisor: DEFAULT_SOFTENING_DIVISOR,
        }
    }
}

impl LoudnessMixer {
    pub fn new(divisor: f64) -> Result<Self, MediaError> {
        if !divisor.is_finite() || divisor <= 0.0 {
            return Err(MediaError::InvalidParameter(format!(
                "loudness divisor must be positive, got {}",
                divisor
            )));
        }
        Ok(Self { divisor })
    }

    pub fn divisor(&self) -> f64 {
        self.divisor
    }

    /// Mixes `first` and `second` into an MP3 at `output`, lasting as long
    /// as the longer input.
    pub fn mix(
        &self,
        tool: &dyn MediaTool,
        first: &Path,
        second: &Path,
        output: &Path,
    ) -> Result<MixPlan, MediaError> {
        let loudness = (measure_loudness(tool, first), measure_loudness(tool, second));
        let attenuation_db = gain_compensation(loudness.0, loudness.1, self.divisor);

        tool.run(&build_mix_invocation(first, second, attenuation_db, output))?;
        info!(
            "mixed {} ({:.1} LUFS) and {} ({:.1} LUFS) into {}",
            first.display(),
            loudness.0,
            second.display(),
            loudness.1,
            output.display()
        );

        Ok(MixPlan {
            loudness,
            attenuation_db,
        })
    }
}

pub fn build_mix_invocation(
    first: &Path,
    second: &Path,
    attenuation_db: (f64, f64),
    output: &Path,
) -> Invocation {
    let graph = format!(
        "[0:a]volume=-{:.2}dB[a0];[1:a]volume=-{:.2}dB[a1];[a0][a1]amix=inputs=2:duration=longest[mix]",
        attenuation_db.0, attenuation_db.1
    );
    let mut inv = Invocation::ffmpeg();
    inv.arg("-i")
        .arg(first)
        .arg("-i")
        .arg(second)
        .args(["-filter_complex", graph.as_str(), "-map", "[mix]", "-c:a", "libmp3lame"])
        .arg(output);
    inv
}
