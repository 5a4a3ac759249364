//! Settings structure, JSON loading and saving

use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default number of concurrent batch workers
pub const DEFAULT_MAX_WORKERS: u32 = 5;

/// Default video codec for encodes that do not name one
pub const DEFAULT_VCODEC: &str = "hevc_nvenc";

/// Error type for settings operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading or writing the settings file
    Io(std::io::Error),
    /// JSON parsing error
    Parse(serde_json::Error),
    /// Settings parsed but hold an unusable value
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to access settings file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse settings: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid settings: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

fn default_max_workers() -> u32 {
    DEFAULT_MAX_WORKERS
}

fn default_vcodec() -> String {
    DEFAULT_VCODEC.to_string()
}

/// `max_workers` is written by hand as often as by the tool, so both
/// `"5"` and `5` are accepted.
fn deserialize_max_workers<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Workers {
        Number(u64),
        Text(String),
    }

    match Workers::deserialize(deserializer)? {
        Workers::Number(n) => u32::try_from(n).map_err(serde::de::Error::custom),
        Workers::Text(s) => s.trim().parse::<u32>().map_err(|_| {
            serde::de::Error::custom(format!("max_workers must be an integer, got '{}'", s))
        }),
    }
}

/// Process-wide settings
///
/// Loaded once at startup and passed by value into the engine and the
/// orchestrator. Changing them goes through [`Settings::save_and_reload`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Maximum number of jobs processed at the same time (>= 1)
    #[serde(
        default = "default_max_workers",
        deserialize_with = "deserialize_max_workers"
    )]
    pub max_workers: u32,
    /// Video codec used by convert, compress and audio re-encodes
    #[serde(default = "default_vcodec", rename = "vcodec")]
    pub default_codec: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            default_codec: default_vcodec(),
        }
    }
}

impl Settings {
    /// Parse settings from a JSON string
    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(content)?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    ///
    /// A missing file is not an error: defaults are returned instead.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::parse_json(&content)
    }

    /// Apply environment variable overrides
    ///
    /// - MEDIA_BATCH_MAX_WORKERS -> max_workers
    /// - MEDIA_BATCH_VCODEC -> default_codec
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MEDIA_BATCH_MAX_WORKERS") {
            if let Ok(workers) = val.trim().parse::<u32>() {
                self.max_workers = workers;
            }
        }

        if let Ok(val) = env::var("MEDIA_BATCH_VCODEC") {
            let val = val.trim();
            if !val.is_empty() {
                self.default_codec = val.to_string();
            }
        }
    }

    /// Check the invariants the rest of the system relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be >= 1".to_string()));
        }
        if self.default_codec.trim().is_empty() {
            return Err(ConfigError::Invalid("vcodec must not be empty".to_string()));
        }
        Ok(())
    }

    /// Load settings from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut settings = Self::load_from_file(path)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Write the whole settings object to `path`
    ///
    /// The JSON is written to a sibling temp file first and renamed over the
    /// target, so readers never see a partial file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        self.validate()?;
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;

        let tmp_path = temp_path_for(path);
        fs::write(&tmp_path, json)?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(ConfigError::Io(e));
        }
        Ok(())
    }

    /// Save then reload from disk, returning what other readers will see
    pub fn save_and_reload<P: AsRef<Path>>(&self, path: P) -> Result<Self, ConfigError> {
        self.save(&path)?;
        Self::load(&path)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Env var tests must not interleave
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        env::remove_var("MEDIA_BATCH_MAX_WORKERS");
        env::remove_var("MEDIA_BATCH_VCODEC");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_max_workers_accepts_number_or_string(
            workers in 1u32..512,
            as_string in proptest::bool::ANY,
            codec in "[a-z0-9_]{3,12}",
        ) {
            let workers_json = if as_string {
                format!("\"{}\"", workers)
            } else {
                workers.to_string()
            };
            let json = format!(
                r#"{{ "max_workers": {}, "vcodec": "{}" }}"#,
                workers_json, codec
            );

            let settings = Settings::parse_json(&json).expect("valid settings JSON");
            prop_assert_eq!(settings.max_workers, workers);
            prop_assert_eq!(settings.default_codec, codec);
        }

        #[test]
        fn prop_env_overrides_max_workers(
            initial in 1u32..64,
            override_workers in 1u32..64,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let mut settings = Settings::parse_json(
                &format!(r#"{{ "max_workers": {} }}"#, initial)
            ).expect("valid JSON");

            env::set_var("MEDIA_BATCH_MAX_WORKERS", override_workers.to_string());
            settings.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(settings.max_workers, override_workers);
        }
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let settings = Settings::parse_json("{}").expect("empty object should parse");
        assert_eq!(settings.max_workers, 5);
        assert_eq!(settings.default_codec, "hevc_nvenc");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from_file(dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_non_numeric_workers_rejected() {
        let result = Settings::parse_json(r#"{ "max_workers": "many" }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_workers_invalid() {
        let settings = Settings::parse_json(r#"{ "max_workers": 0 }"#).unwrap();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_override_vcodec() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut settings = Settings::default();
        env::set_var("MEDIA_BATCH_VCODEC", "libx265");
        settings.apply_env_overrides();
        clear_env_vars();

        assert_eq!(settings.default_codec, "libx265");
    }

    #[test]
    fn test_save_then_reload() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            max_workers: 3,
            default_codec: "libx264".to_string(),
        };

        let reloaded = settings.save_and_reload(&path).unwrap();
        assert_eq!(reloaded, settings);
        assert!(!temp_path_for(&path).exists());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"vcodec\""));
    }

    #[test]
    fn test_save_rejects_invalid_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            max_workers: 0,
            default_codec: "libx264".to_string(),
        };

        assert!(settings.save(&path).is_err());
        assert!(!path.exists());
    }
}
