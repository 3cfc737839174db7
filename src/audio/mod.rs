//! Audio processing backends.
//!
//! This module wraps the external tools the track builder relies on:
//! - [`engine`]: the engine contract (a private scratch filesystem plus
//!   command execution) and the test double used by the pipeline tests
//! - [`ffmpeg`]: the production engine, an `ffmpeg` child process
//! - [`probe`]: container duration probing used for interval validation

pub mod engine;
pub mod ffmpeg;
pub mod probe;

pub use engine::{check_name, Engine, EngineError, FileData};
pub use ffmpeg::FfmpegEngine;
pub use probe::{probe_duration, ProbeError};
