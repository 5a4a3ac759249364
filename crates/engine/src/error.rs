//! Error taxonomy shared by every engine component.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for probe, transform and batch operations
#[derive(Debug, Error)]
pub enum MediaError {
    /// Input path does not exist or cannot be read
    #[error("Invalid path: {0} does not exist or is not readable")]
    InvalidPath(PathBuf),

    /// Extension is neither a known video nor audio extension
    #[error("Not a media file: {0}")]
    NotAMediaFile(PathBuf),

    /// Operation requires a video input
    #[error("Not a video file: {0}")]
    NotAVideoFile(PathBuf),

    /// Pairing requested against an empty audio pool
    #[error("No audio file available for pairing")]
    NoAudioAvailable,

    /// User supplied time value could not be parsed
    #[error("Invalid time '{0}': expected HH:MM:SS or seconds")]
    InvalidTimeSpec(String),

    /// Start/end bounds do not form a usable range
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Zero, negative or non-finite duration
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Operation parameter outside its accepted domain
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// ffprobe could not report the metadata the operation needs
    #[error("Probe unavailable for {path}: {reason}")]
    ProbeUnavailable { path: PathBuf, reason: String },

    /// Resolution requested on a file without a video stream
    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),

    /// No codec mapping exists for the requested container
    #[error("Unsupported extension: '{0}'")]
    UnsupportedExtension(String),

    /// External process exited non-zero or could not be started
    #[error("{program} failed ({status}): {diagnostic}")]
    ExternalToolFailure {
        program: String,
        status: String,
        diagnostic: String,
    },

    /// Reconciled audio does not match the target duration
    #[error("Duration mismatch: {0}")]
    DurationMismatch(String),

    /// Filesystem error around intermediate files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker panicked while running the job
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Flat classification of [`MediaError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidPath,
    NotAMediaFile,
    NotAVideoFile,
    NoAudioAvailable,
    InvalidTimeSpec,
    InvalidRange,
    InvalidDuration,
    InvalidParameter,
    ProbeUnavailable,
    NoVideoStream,
    UnsupportedExtension,
    ExternalToolFailure,
    DurationMismatch,
    Io,
    WorkerPanicked,
}

impl ErrorKind {
    /// Stable name used in user-facing summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPath => "invalid_path",
            ErrorKind::NotAMediaFile => "not_a_media_file",
            ErrorKind::NotAVideoFile => "not_a_video_file",
            ErrorKind::NoAudioAvailable => "no_audio_available",
            ErrorKind::InvalidTimeSpec => "invalid_time_spec",
            ErrorKind::InvalidRange => "invalid_range",
            ErrorKind::InvalidDuration => "invalid_duration",
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::ProbeUnavailable => "probe_unavailable",
            ErrorKind::NoVideoStream => "no_video_stream",
            ErrorKind::UnsupportedExtension => "unsupported_extension",
            ErrorKind::ExternalToolFailure => "external_tool_failure",
            ErrorKind::DurationMismatch => "duration_mismatch",
            ErrorKind::Io => "io",
            ErrorKind::WorkerPanicked => "worker_panicked",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MediaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::InvalidPath(_) => ErrorKind::InvalidPath,
            MediaError::NotAMediaFile(_) => ErrorKind::NotAMediaFile,
            MediaError::NotAVideoFile(_) => ErrorKind::NotAVideoFile,
            MediaError::NoAudioAvailable => ErrorKind::NoAudioAvailable,
            MediaError::InvalidTimeSpec(_) => ErrorKind::InvalidTimeSpec,
            MediaError::InvalidRange(_) => ErrorKind::InvalidRange,
            MediaError::InvalidDuration(_) => ErrorKind::InvalidDuration,
            MediaError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            MediaError::ProbeUnavailable { .. } => ErrorKind::ProbeUnavailable,
            MediaError::NoVideoStream(_) => ErrorKind::NoVideoStream,
            MediaError::UnsupportedExtension(_) => ErrorKind::UnsupportedExtension,
            MediaError::ExternalToolFailure { .. } => ErrorKind::ExternalToolFailure,
            MediaError::DurationMismatch(_) => ErrorKind::DurationMismatch,
            MediaError::Io(_) => ErrorKind::Io,
            MediaError::WorkerPanicked(_) => ErrorKind::WorkerPanicked,
        }
    }

    pub(crate) fn probe_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MediaError::ProbeUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
