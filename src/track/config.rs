//! Build configuration.
//!
//! Every name the builder uses inside the engine filesystem, the loop
//! count and the download metadata live here so none of them are magic
//! values in the pipeline. Configuration files are JSON; missing fields
//! take their defaults.

use crate::audio::engine::check_name;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default number of times the active+rest pair is looped.
pub const DEFAULT_REPETITIONS: u32 = 8;

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("repetitions must be at least 1")]
    ZeroRepetitions,

    #[error("{field} is not a plain file name: {value:?}")]
    InvalidName { field: &'static str, value: String },

    #[error("engine file name {0:?} is used more than once")]
    DuplicateName(String),

    #[error("download file name must not be empty")]
    EmptyDownloadName,
}

/// Settings for one [`TrackBuilder`](super::TrackBuilder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// How many times the active+rest pair is repeated in the output.
    pub repetitions: u32,

    /// Engine file holding the active source.
    pub active_input: String,
    /// Engine file holding the rest source.
    pub rest_input: String,
    /// Trimmed active clip.
    pub active_clip: String,
    /// Trimmed rest clip.
    pub rest_clip: String,
    /// One active+rest pair.
    pub interval_clip: String,
    /// Concat demuxer playlist.
    pub playlist: String,
    /// Final looped track.
    pub output: String,

    /// File name offered for the finished track.
    pub download_name: String,
    /// MIME type of the finished track.
    pub mime_type: String,

    /// Probe the sources and reject intervals that run past their end.
    pub check_bounds: bool,

    /// Engine program override. See [`FfmpegEngine::new`](crate::audio::FfmpegEngine::new).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_program: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            repetitions: DEFAULT_REPETITIONS,
            active_input: "input1.mp3".to_owned(),
            rest_input: "input2.mp3".to_owned(),
            active_clip: "active_cut.mp3".to_owned(),
            rest_clip: "rest_cut.mp3".to_owned(),
            interval_clip: "interval.mp3".to_owned(),
            playlist: "concat.txt".to_owned(),
            output: "output.mp3".to_owned(),
            download_name: "tabata-track.mp3".to_owned(),
            mime_type: "audio/mpeg".to_owned(),
            check_bounds: true,
            engine_program: None,
        }
    }
}

impl BuildConfig {
    /// Engine-side file names paired with the field they come from.
    fn engine_names(&self) -> [(&'static str, &str); 7] {
        [
            ("active_input", &self.active_input),
            ("rest_input", &self.rest_input),
            ("active_clip", &self.active_clip),
            ("rest_clip", &self.rest_clip),
            ("interval_clip", &self.interval_clip),
            ("playlist", &self.playlist),
            ("output", &self.output),
        ]
    }

    /// Every file a build creates in the engine filesystem.
    pub fn scratch_files(&self) -> impl Iterator<Item = &str> {
        self.engine_names().into_iter().map(|(_, name)| name)
    }

    /// Checks the configuration for values the builder cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repetitions == 0 {
            return Err(ConfigError::ZeroRepetitions);
        }
        let mut seen = HashSet::new();
        for (field, name) in self.engine_names() {
            if check_name(name).is_err() {
                return Err(ConfigError::InvalidName {
                    field,
                    value: name.to_owned(),
                });
            }
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateName(name.to_owned()));
            }
        }
        if self.download_name.trim().is_empty() {
            return Err(ConfigError::EmptyDownloadName);
        }
        Ok(())
    }

    /// Contents of the concat demuxer playlist: one `file` line per loop.
    pub fn playlist_contents(&self) -> String {
        vec![format!("file {}", self.interval_clip); self.repetitions as usize].join("\n")
    }

    /// Loads and validates a configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
