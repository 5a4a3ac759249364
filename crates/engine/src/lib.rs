//! Media Batch
//!
//! Batch media transformer driving ffmpeg / ffprobe: cutting, converting,
//! compressing, audio replacement and mixing over single files, file lists
//! and directories.

pub mod batch;
pub mod error;
pub mod loudness;
pub mod pairing;
pub mod paths;
pub mod probe;
pub mod progress;
pub mod reconcile;
pub mod scratch;
pub mod timespec;
pub mod tool;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use media_batch_config as config;
pub use media_batch_config::Settings;
pub use batch::{discover, BatchOrchestrator, BatchResult, JobResult, TransformJob};
pub use error::{ErrorKind, MediaError};
pub use loudness::{LoudnessMixer, MixPlan};
pub use pairing::{PairingAssigner, PairingPolicy};
pub use paths::{classify, normalize, strip_derived_names, MediaKind, MediaPath};
pub use probe::{MediaProbe, ProbeResult, VideoInfo};
pub use progress::{ProgressMonitor, ProgressReport, ProgressSink, TerminalProgress};
pub use reconcile::{loop_multiplier, reconcile, ReconcileReport};
pub use timespec::TimeSpec;
pub use tool::{check_tools_available, parse_ffmpeg_version, Invocation, MediaTool, Program, SystemTool};
pub use transform::{AudioSource, Operation, Outcome, TransformEngine, TrimMode};
