//! tabata-track - Builds interval-training tracks from two audio files.
//!
//! This library provides the session state and track building pipeline
//! behind the `tabata-track` command.

pub mod audio;
pub mod session;
pub mod track;

// Re-export commonly used types
pub use audio::{Engine, EngineError, FfmpegEngine, FileData};
pub use session::{Session, SessionError, SourceSelection};
pub use track::{
    BuildConfig, BuildError, BuildOutcome, BuildStatus, DirectorySink, Download, DownloadSink,
    SourceFile, TimeInterval, TrackBuilder,
};
