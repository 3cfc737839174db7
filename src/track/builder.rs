//! The track building pipeline.
//!
//! A build drives the engine through a fixed sequence:
//!
//! 1. load the engine (first build only)
//! 2. copy both sources into the engine filesystem
//! 3. stream-copy trim each source to its interval
//! 4. join the two clips into one active+rest pair
//! 5. loop the pair with the concat demuxer
//! 6. read the result back and deliver it as a download
//!
//! Intervals are validated before the engine is touched. The engine sits
//! behind a mutex, so concurrent builds on one builder run one after the
//! other instead of racing on the shared file names.

use super::config::{BuildConfig, ConfigError};
use super::download::{Download, DownloadSink};
use super::{format_seconds, IntervalError, Part, SourceFile, TimeInterval};
use crate::audio::engine::{Engine, EngineError, FileData};
use crate::audio::ffmpeg::FfmpegEngine;
use crate::audio::probe::probe_duration;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Errors that abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The builder's configuration is unusable.
    #[error("invalid build configuration: {0}")]
    Config(#[from] ConfigError),

    /// An interval was rejected before the engine was used.
    #[error("invalid {part} interval: {source}")]
    Validation {
        part: Part,
        #[source]
        source: IntervalError,
    },

    /// The engine failed to load or to run a step.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The download sink could not take the finished track.
    #[error("failed to deliver {filename}: {source}")]
    Sink {
        filename: String,
        #[source]
        source: io::Error,
    },
}

/// Result of a build that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The track was handed to the download sink.
    Downloaded { filename: String, size: usize },
    /// The engine returned something other than audio bytes; nothing was
    /// delivered.
    InvalidOutput,
}

/// Identifier attached to one build's log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildId(Uuid);

impl BuildId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group is plenty to tell builds apart in a log
        let id = self.0.simple().to_string();
        f.write_str(&id[..8])
    }
}

/// Observable "build in progress" state of a [`TrackBuilder`].
///
/// Counts builds that have started but not yet returned, including ones
/// waiting for the engine. Cloning shares the underlying counter.
#[derive(Debug, Clone, Default)]
pub struct BuildStatus(Arc<AtomicUsize>);

impl BuildStatus {
    /// Returns true while at least one build is queued or running.
    pub fn is_busy(&self) -> bool {
        self.pending() > 0
    }

    /// Number of builds queued or running.
    pub fn pending(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> PendingGuard<'_> {
        self.0.fetch_add(1, Ordering::SeqCst);
        PendingGuard(&self.0)
    }
}

/// Decrements the pending count when a build returns, however it returns.
struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Builds tabata tracks with a single shared engine.
#[derive(Debug)]
pub struct TrackBuilder<E: Engine> {
    engine: Mutex<E>,
    config: BuildConfig,
    status: BuildStatus,
}

impl TrackBuilder<FfmpegEngine> {
    /// Creates a builder backed by `ffmpeg`, honouring
    /// [`BuildConfig::engine_program`].
    pub fn with_ffmpeg(config: BuildConfig) -> Self {
        let engine = FfmpegEngine::new(config.engine_program.clone());
        Self::new(engine, config)
    }
}

impl<E: Engine> TrackBuilder<E> {
    /// Creates a builder around an unloaded (or already loaded) engine.
    ///
    /// The engine is loaded lazily by the first build.
    pub fn new(engine: E, config: BuildConfig) -> Self {
        Self {
            engine: Mutex::new(engine),
            config,
            status: BuildStatus::default(),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Returns a handle reporting whether a build is in progress.
    pub fn status(&self) -> BuildStatus {
        self.status.clone()
    }

    /// Consumes the builder and returns its engine.
    pub fn into_engine(self) -> E {
        self.engine
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds one track and delivers it to `sink`.
    ///
    /// # Arguments
    ///
    /// * `active_file` - Source of the active clip
    /// * `rest_file` - Source of the rest clip
    /// * `active` - Trim window for the active clip
    /// * `rest` - Trim window for the rest clip
    /// * `sink` - Receives the finished track
    ///
    /// # Returns
    ///
    /// [`BuildOutcome::Downloaded`] when a track was delivered, or
    /// [`BuildOutcome::InvalidOutput`] when the engine produced no usable
    /// audio. The latter is logged and is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration fails [`BuildConfig::validate`]
    /// - Either interval is empty, negative, non-finite, or (with bounds
    ///   checking on) runs past the end of its source
    /// - The engine fails to load or any engine step fails
    /// - The sink rejects the track
    pub fn build_track(
        &self,
        active_file: &SourceFile,
        rest_file: &SourceFile,
        active: TimeInterval,
        rest: TimeInterval,
        sink: &mut dyn DownloadSink,
    ) -> Result<BuildOutcome, BuildError> {
        let _pending = self.status.enter();
        let id = BuildId::new();
        let span = tracing::info_span!("build", %id);
        let _entered = span.enter();

        tracing::info!(
            "Building track: active {} [{}..{}], rest {} [{}..{}], {} loops",
            active_file.name(),
            active.start,
            active.end,
            rest_file.name(),
            rest.start,
            rest.end,
            self.config.repetitions
        );

        self.config.validate()?;
        self.validate(Part::Active, active_file, &active)?;
        self.validate(Part::Rest, rest_file, &rest)?;

        let mut engine = self.engine.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Engine lock was poisoned by an earlier panic; continuing");
            poisoned.into_inner()
        });

        if !engine.is_loaded() {
            tracing::info!("Loading engine");
            engine.load()?;
        }

        let result = self.run(&mut *engine, active_file, rest_file, &active, &rest, sink);
        self.cleanup(&mut *engine);

        match &result {
            Ok(BuildOutcome::Downloaded { filename, size }) => {
                tracing::info!("Track ready: {} ({} bytes)", filename, size);
            }
            Ok(BuildOutcome::InvalidOutput) => {}
            Err(e) => tracing::warn!("Build failed: {}", e),
        }
        result
    }

    /// Rejects unusable intervals before any engine work happens.
    fn validate(
        &self,
        part: Part,
        file: &SourceFile,
        interval: &TimeInterval,
    ) -> Result<(), BuildError> {
        let wrap = |source| BuildError::Validation { part, source };
        interval.validate().map_err(wrap)?;

        if !self.config.check_bounds {
            return Ok(());
        }
        match probe_duration(file.bytes(), file.extension().as_deref()) {
            Ok(duration) => {
                tracing::debug!("{} source {} is {:.3}s long", part, file.name(), duration);
                interval.check_within(duration).map_err(wrap)
            }
            Err(e) => {
                tracing::warn!(
                    "Could not probe {} source {}, skipping bounds check: {}",
                    part,
                    file.name(),
                    e
                );
                Ok(())
            }
        }
    }

    /// Runs the engine steps. Expects a loaded engine.
    fn run(
        &self,
        engine: &mut E,
        active_file: &SourceFile,
        rest_file: &SourceFile,
        active: &TimeInterval,
        rest: &TimeInterval,
        sink: &mut dyn DownloadSink,
    ) -> Result<BuildOutcome, BuildError> {
        let cfg = &self.config;

        engine.write_file(&cfg.active_input, active_file.bytes())?;
        engine.write_file(&cfg.rest_input, rest_file.bytes())?;

        tracing::info!("Trimming clips");
        engine.exec(&trim_args(active, &cfg.active_input, &cfg.active_clip))?;
        engine.exec(&trim_args(rest, &cfg.rest_input, &cfg.rest_clip))?;

        tracing::info!("Joining active and rest clips");
        engine.exec(&join_args(&cfg.active_clip, &cfg.rest_clip, &cfg.interval_clip))?;

        tracing::info!("Looping interval {} times", cfg.repetitions);
        engine.write_file(&cfg.playlist, cfg.playlist_contents().as_bytes())?;
        engine.exec(&loop_args(&cfg.playlist, &cfg.output))?;

        match engine.read_file(&cfg.output)? {
            FileData::Binary(bytes) => {
                let size = bytes.len();
                let download = Download {
                    filename: cfg.download_name.clone(),
                    mime_type: cfg.mime_type.clone(),
                    bytes,
                };
                sink.deliver(download).map_err(|source| BuildError::Sink {
                    filename: cfg.download_name.clone(),
                    source,
                })?;
                Ok(BuildOutcome::Downloaded {
                    filename: cfg.download_name.clone(),
                    size,
                })
            }
            FileData::Text(text) => {
                tracing::error!(
                    "Invalid file data from engine: expected audio bytes, got {} characters of text",
                    text.len()
                );
                Ok(BuildOutcome::InvalidOutput)
            }
        }
    }

    /// Removes this build's files from the engine filesystem.
    fn cleanup(&self, engine: &mut E) {
        for name in self.config.scratch_files() {
            match engine.remove_file(name) {
                Ok(()) | Err(EngineError::NotFound(_)) => {}
                Err(e) => tracing::warn!("Failed to remove {} from engine: {}", name, e),
            }
        }
    }
}

/// Stream-copy trim of `input` to `interval`.
fn trim_args(interval: &TimeInterval, input: &str, output: &str) -> Vec<String> {
    vec![
        "-ss".to_owned(),
        format_seconds(interval.start),
        "-to".to_owned(),
        format_seconds(interval.end),
        "-i".to_owned(),
        input.to_owned(),
        "-c".to_owned(),
        "copy".to_owned(),
        output.to_owned(),
    ]
}

/// Byte-level join of two clips with the `concat:` protocol.
fn join_args(first: &str, second: &str, output: &str) -> Vec<String> {
    vec![
        "-i".to_owned(),
        format!("concat:{first}|{second}"),
        "-c".to_owned(),
        "copy".to_owned(),
        output.to_owned(),
    ]
}

/// Concat demuxer over a playlist file.
fn loop_args(playlist: &str, output: &str) -> Vec<String> {
    ["-f", "concat", "-safe", "0", "-i", playlist, "-c", "copy", output]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}
