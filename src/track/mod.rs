//! Tabata track building.
//!
//! A tabata track is one clip from an "active" source followed by one clip
//! from a "rest" source, with that pair looped a fixed number of times.
//! This module provides the value types shared by the session and the
//! builder, and the builder itself.

mod builder;
mod config;
mod download;

pub use builder::{BuildError, BuildId, BuildOutcome, BuildStatus, TrackBuilder};
pub use config::{BuildConfig, ConfigError, DEFAULT_REPETITIONS};
pub use download::{DirectorySink, Download, DownloadSink};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Slack allowed when comparing an interval end with a probed duration.
/// Covers frame-granular containers whose probed length rounds down.
pub const BOUNDS_TOLERANCE_SECONDS: f64 = 0.05;

/// Which half of the tabata pair a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    Active,
    Rest,
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Part::Active => f.write_str("active"),
            Part::Rest => f.write_str("rest"),
        }
    }
}

/// Errors describing an unusable trim interval.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntervalError {
    #[error("interval bounds must be finite (got {start}..{end})")]
    NotFinite { start: f64, end: f64 },

    #[error("interval start {0}s is negative")]
    NegativeStart(f64),

    #[error("interval end {end}s must be after start {start}s")]
    Empty { start: f64, end: f64 },

    #[error("interval end {end}s is past the end of the source ({duration:.3}s)")]
    OutOfBounds { end: f64, duration: f64 },

    #[error("cannot parse interval {0:?}: expected START-END in seconds")]
    Parse(String),
}

/// A trim window in seconds.
///
/// Construction never validates; intervals are checked with
/// [`TimeInterval::validate`] right before a build uses them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: f64,
    pub end: f64,
}

impl TimeInterval {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Default window for the active clip: 0-20 s.
    pub const fn default_active() -> Self {
        Self::new(0.0, 20.0)
    }

    /// Default window for the rest clip: 0-10 s.
    pub const fn default_rest() -> Self {
        Self::new(0.0, 10.0)
    }

    /// Length of the window in seconds. Negative for inverted intervals.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Checks that the bounds are finite, non-negative and ordered.
    pub fn validate(&self) -> Result<(), IntervalError> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(IntervalError::NotFinite {
                start: self.start,
                end: self.end,
            });
        }
        if self.start < 0.0 {
            return Err(IntervalError::NegativeStart(self.start));
        }
        if self.end <= self.start {
            return Err(IntervalError::Empty {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Checks that the window ends within a source of the given duration.
    pub fn check_within(&self, duration: f64) -> Result<(), IntervalError> {
        if self.end > duration + BOUNDS_TOLERANCE_SECONDS {
            return Err(IntervalError::OutOfBounds {
                end: self.end,
                duration,
            });
        }
        Ok(())
    }
}

impl FromStr for TimeInterval {
    type Err = IntervalError;

    /// Parses `START-END` or `START:END`, both in seconds.
    ///
    /// Bounds may use exponent notation (`1e-3-5`); the first separator
    /// that leaves two valid numbers on either side wins.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        s.match_indices(['-', ':'])
            .find_map(|(at, sep)| {
                let start = s[..at].trim().parse::<f64>().ok()?;
                let end = s[at + sep.len()..].trim().parse::<f64>().ok()?;
                Some(Self::new(start, end))
            })
            .ok_or_else(|| IntervalError::Parse(s.to_owned()))
    }
}

/// Formats seconds as a plain decimal string for engine arguments.
///
/// Whole values have no fractional part (`20`), fractions keep their
/// shortest exact representation (`12.5`), and exponent notation is
/// never produced.
pub fn format_seconds(seconds: f64) -> String {
    if seconds == 0.0 {
        // Avoid "-0" for negative zero
        return "0".to_owned();
    }
    seconds.to_string()
}

/// An opaque handle to a user-selected source file.
///
/// Cloning is cheap: the contents are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    /// Wraps in-memory file contents.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    /// Display name of the file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw file contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercased file extension, if the name has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        assert_eq!(TimeInterval::default_active(), TimeInterval::new(0.0, 20.0));
        assert_eq!(TimeInterval::default_rest(), TimeInterval::new(0.0, 10.0));
        assert_eq!(TimeInterval::default_active().duration(), 20.0);
    }

    #[test]
    fn test_validate() {
        assert!(TimeInterval::new(0.0, 0.5).validate().is_ok());
        assert_eq!(
            TimeInterval::new(5.0, 5.0).validate(),
            Err(IntervalError::Empty { start: 5.0, end: 5.0 })
        );
        assert_eq!(
            TimeInterval::new(8.0, 3.0).validate(),
            Err(IntervalError::Empty { start: 8.0, end: 3.0 })
        );
        assert_eq!(
            TimeInterval::new(-1.0, 3.0).validate(),
            Err(IntervalError::NegativeStart(-1.0))
        );
        assert!(matches!(
            TimeInterval::new(0.0, f64::NAN).validate(),
            Err(IntervalError::NotFinite { .. })
        ));
        assert!(matches!(
            TimeInterval::new(0.0, f64::INFINITY).validate(),
            Err(IntervalError::NotFinite { .. })
        ));
    }

    #[test]
    fn test_check_within() {
        let interval = TimeInterval::new(0.0, 30.0);
        assert!(interval.check_within(30.0).is_ok());
        assert!(interval.check_within(29.98).is_ok());
        assert_eq!(
            interval.check_within(25.0),
            Err(IntervalError::OutOfBounds {
                end: 30.0,
                duration: 25.0
            })
        );
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!("0-20".parse::<TimeInterval>(), Ok(TimeInterval::new(0.0, 20.0)));
        assert_eq!("1.5:7.25".parse::<TimeInterval>(), Ok(TimeInterval::new(1.5, 7.25)));
        assert_eq!(" 3 - 9 ".parse::<TimeInterval>(), Ok(TimeInterval::new(3.0, 9.0)));
        assert_eq!("1e-3-5".parse::<TimeInterval>(), Ok(TimeInterval::new(0.001, 5.0)));
        assert_eq!("0-2.5e-1".parse::<TimeInterval>(), Ok(TimeInterval::new(0.0, 0.25)));
        assert_eq!("1e1:2e1".parse::<TimeInterval>(), Ok(TimeInterval::new(10.0, 20.0)));
        assert!("20".parse::<TimeInterval>().is_err());
        assert!("-".parse::<TimeInterval>().is_err());
        assert!("a-b".parse::<TimeInterval>().is_err());
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "0");
        assert_eq!(format_seconds(-0.0), "0");
        assert_eq!(format_seconds(20.0), "20");
        assert_eq!(format_seconds(12.5), "12.5");
        assert_eq!(format_seconds(0.1), "0.1");
        assert_eq!(format_seconds(1e21), "1000000000000000000000");
    }

    #[test]
    fn test_source_file() {
        let file = SourceFile::new("Workout.MP3", vec![1u8, 2, 3]);
        assert_eq!(file.name(), "Workout.MP3");
        assert_eq!(file.bytes(), &[1, 2, 3]);
        assert_eq!(file.extension().as_deref(), Some("mp3"));
        assert_eq!(SourceFile::new("noext", Vec::<u8>::new()).extension(), None);

        let copy = file.clone();
        assert_eq!(copy, file);
    }
}
