//! Path normalization, extension classification and derived output names.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Video extensions (matched case-insensitively, without the dot)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv"];

/// Audio extensions (matched case-insensitively, without the dot)
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac"];

/// Marker separating the original stem from an operation suffix,
/// e.g. `clip__cut.mp4`.
pub const DERIVED_MARKER: &str = "__";

/// Classification of a path by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Unknown,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Unknown => "unknown",
        }
    }
}

/// Classifies a path from its extension alone.
pub fn classify(path: &Path) -> MediaKind {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_lowercase(),
        None => return MediaKind::Unknown,
    };

    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Audio
    } else {
        MediaKind::Unknown
    }
}

/// A normalized absolute path with its extension classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaPath {
    pub path: PathBuf,
    pub kind: MediaKind,
}

impl MediaPath {
    /// Wraps an already normalized path.
    pub fn from_path(path: PathBuf) -> Self {
        let kind = classify(&path);
        Self { path, kind }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == MediaKind::Audio
    }
}

/// Normalizes user supplied path text.
///
/// Strips surrounding whitespace and quotes, turns `\` into `/`, anchors
/// relative paths at the current directory and collapses `.`/`..`
/// lexically. Never touches the filesystem and never fails.
pub fn normalize(raw: &str) -> MediaPath {
    let trimmed = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim();
    let unified = trimmed.replace('\\', "/");

    let path = PathBuf::from(unified);
    let absolute = if path.is_absolute() {
        path
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path,
        }
    };

    MediaPath::from_path(collapse_dots(&absolute))
}

/// Lexically resolves `.` and `..` components.
///
/// `..` at the root stays at the root.
pub fn collapse_dots(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    _ => false,
                };
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Builds `<dir>/<stem><suffix>` next to `input`.
///
/// For example `/media/clip.mov` with `__cut.mp4` gives `/media/clip__cut.mp4`.
/// When another media file shares the stem (`clip.mp4` beside `clip.mov`)
/// the source extension joins the stem, giving `clip_mov__cut.mp4`, so
/// same-stem inputs never write the same output.
pub fn derived_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match input.extension() {
        Some(ext) if has_same_stem_sibling(input) => {
            format!("{}_{}", stem, ext.to_string_lossy())
        }
        _ => stem,
    };
    input.with_file_name(format!("{}{}", stem, suffix))
}

/// Builds `<dir>/<file name><suffix>` next to `input`.
///
/// Used for intermediates: the full file name keeps `clip.mp4` and
/// `clip.mkv` apart, e.g. `clip.mp4__fitted.mp3`.
pub fn scratch_path(input: &Path, suffix: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}", name, suffix))
}

/// True when a different media file in the same directory has the same stem.
fn has_same_stem_sibling(input: &Path) -> bool {
    let (Some(dir), Some(stem), Some(name)) =
        (input.parent(), input.file_stem(), input.file_name())
    else {
        return false;
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    entries.filter_map(|e| e.ok()).any(|entry| {
        let path = entry.path();
        entry.file_name() != name
            && path.file_stem() == Some(stem)
            && classify(&path) != MediaKind::Unknown
            && path.is_file()
    })
}

/// Like [`derived_path`] but placed inside `dir`.
pub fn derived_path_in(dir: &Path, input: &Path, suffix: &str) -> PathBuf {
    let file_name = derived_path(input, suffix)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    dir.join(file_name)
}

/// Lowercased extension without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Renames derived outputs in `dir` back to their original stem.
///
/// `clip__combine.mp4` becomes `clip.mp4`; if that name is taken the
/// candidates `clip_1.mp4`, `clip_2.mp4`, ... are tried. Only direct
/// children are touched. Returns the `(from, to)` pairs actually renamed.
pub fn strip_derived_names(dir: &Path) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let mut renamed = Vec::new();
    for from in entries {
        let stem = match from.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };
        let base = match stem.find(DERIVED_MARKER) {
            Some(0) | None => continue,
            Some(index) => stem[..index].to_string(),
        };
        let ext = from
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let mut to = dir.join(format!("{}{}", base, ext));
        let mut counter = 1;
        while to.exists() {
            to = dir.join(format!("{}_{}{}", base, counter, ext));
            counter += 1;
        }

        fs::rename(&from, &to)?;
        renamed.push((from, to));
    }

    Ok(renamed)
}
