//! User supplied time values (`90`, `12.5`, `00:01:30`).

use crate::error::MediaError;
use std::fmt;
use std::str::FromStr;

/// A non-negative time offset in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeSpec(f64);

impl TimeSpec {
    pub fn from_seconds(seconds: f64) -> Result<Self, MediaError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(MediaError::InvalidTimeSpec(seconds.to_string()));
        }
        Ok(Self(seconds))
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }

    /// Parses an optional bound; blank text means "not given".
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, MediaError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => text.parse().map(Some),
        }
    }
}

impl FromStr for TimeSpec {
    type Err = MediaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text = raw.trim();
        let invalid = || MediaError::InvalidTimeSpec(raw.to_string());

        if text.contains(':') {
            let parts: Vec<&str> = text.split(':').collect();
            if parts.len() != 3 {
                return Err(invalid());
            }
            let hours: u64 = parts[0].parse().map_err(|_| invalid())?;
            let minutes: u64 = parts[1].parse().map_err(|_| invalid())?;
            let seconds: f64 = parts[2].parse().map_err(|_| invalid())?;
            if minutes >= 60 || !seconds.is_finite() || !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }
            return Ok(Self(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds));
        }

        let seconds: f64 = text.parse().map_err(|_| invalid())?;
        Self::from_seconds(seconds).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hms(self.0))
    }
}

/// Formats seconds as `HH:MM:SS.mmm`.
pub fn format_hms(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let total_ms = (seconds * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) as f64 / 1000.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}
