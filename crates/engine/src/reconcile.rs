//! Fitting an audio track to an exact target duration.
//!
//! Short tracks are looped with the concat demuxer (stream copy, no
//! re-encode per copy) and then truncated; long tracks are only truncated.

use crate::error::MediaError;
use crate::paths::scratch_path;
use crate::probe;
use crate::scratch::ScratchFiles;
use crate::tool::{Invocation, MediaTool};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Allowed shortfall of the fitted track, in seconds
pub const DURATION_TOLERANCE_SECS: f64 = 0.5;

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    /// Number of back-to-back copies before truncation (1 = plain truncate)
    pub multiplier: u32,
    pub output: PathBuf,
}

fn check_duration(label: &str, secs: f64) -> Result<(), MediaError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(MediaError::InvalidDuration(format!(
            "{} duration must be positive, got {}",
            label, secs
        )));
    }
    Ok(())
}

/// Copies of a `source_secs` track needed to cover `target_secs`.
pub fn loop_multiplier(source_secs: f64, target_secs: f64) -> Result<u32, MediaError> {
    check_duration("source", source_secs)?;
    check_duration("target", target_secs)?;

    if source_secs >= target_secs {
        return Ok(1);
    }
    let copies = (target_secs / source_secs).ceil();
    Ok(copies.min(u32::MAX as f64) as u32)
}

/// Concat demuxer list: `multiplier` lines of `file '<path>'`.
pub fn concat_list(audio: &Path, multiplier: u32) -> String {
    let escaped = audio.to_string_lossy().replace('\'', r"'\''");
    let mut list = String::new();
    for _ in 0..multiplier {
        list.push_str(&format!("file '{}'\n", escaped));
    }
    list
}

pub fn build_concat_invocation(list: &Path, output: &Path) -> Invocation {
    let mut inv = Invocation::ffmpeg();
    inv.args(["-f", "concat", "-safe", "0", "-i"])
        .arg(list)
        .args(["-c", "copy"])
        .arg(output);
    inv
}

pub fn build_truncate_invocation(input: &Path, target_secs: f64, output: &Path) -> Invocation {
    let mut inv = Invocation::ffmpeg();
    inv.arg("-i")
        .arg(input)
        .arg("-t")
        .arg(target_secs.to_string())
        .args(["-c", "copy"])
        .arg(output);
    inv
}

/// Writes `output` holding `audio` looped and cut to `target_secs`.
///
/// The concat list and the looped intermediate are removed whatever the
/// outcome. The result is probed afterwards and a shortfall beyond
/// [`DURATION_TOLERANCE_SECS`] is reported as `DurationMismatch`.
pub fn reconcile(
    tool: &dyn MediaTool,
    audio: &Path,
    target_secs: f64,
    output: &Path,
) -> Result<ReconcileReport, MediaError> {
    check_duration("target", target_secs)?;
    let source_secs = probe::duration(tool, audio)?;
    let multiplier = loop_multiplier(source_secs, target_secs)?;
    debug!(
        "fitting {} ({:.3}s) to {:.3}s with {} copies",
        audio.display(),
        source_secs,
        target_secs,
        multiplier
    );

    if multiplier == 1 {
        tool.run(&build_truncate_invocation(audio, target_secs, output))?;
    } else {
        let mut scratch = ScratchFiles::new();
        let dir = output.parent().unwrap_or_else(|| Path::new("."));

        let mut list = tempfile::Builder::new()
            .prefix(".concat-")
            .suffix(".txt")
            .tempfile_in(dir)?;
        list.write_all(concat_list(audio, multiplier).as_bytes())?;
        list.flush()?;

        let looped = scratch.track(scratch_path(output, &looped_suffix(output)));
        tool.run(&build_concat_invocation(list.path(), &looped))?;
        tool.run(&build_truncate_invocation(&looped, target_secs, output))?;
    }

    let actual_secs = probe::duration(tool, output)?;
    if actual_secs + DURATION_TOLERANCE_SECS < target_secs {
        return Err(MediaError::DurationMismatch(format!(
            "{} is {:.3}s, expected {:.3}s",
            output.display(),
            actual_secs,
            target_secs
        )));
    }

    info!(
        "fitted {} to {:.3}s (x{})",
        audio.display(),
        target_secs,
        multiplier
    );
    Ok(ReconcileReport {
        multiplier,
        output: output.to_path_buf(),
    })
}

fn looped_suffix(output: &Path) -> String {
    match output.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("__looped.{}", ext),
        None => "__looped".to_string(),
    }
}
