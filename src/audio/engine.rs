//! The audio engine contract.
//!
//! An engine owns a private, flat filesystem. Callers copy bytes in with
//! [`Engine::write_file`], run commands against those files with
//! [`Engine::exec`], and copy results back out with [`Engine::read_file`].
//! The engine is opaque: nothing about its internals is observable beyond
//! these operations and the diagnostics it logs.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine program could not be started.
    #[error("failed to start engine program {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The engine program ran but did not identify itself correctly.
    #[error("engine program {} failed its version check: {detail}", .program.display())]
    Load { program: PathBuf, detail: String },

    /// An operation was attempted before [`Engine::load`] succeeded.
    #[error("engine is not loaded")]
    NotLoaded,

    /// A file name is not a plain name inside the engine filesystem.
    #[error("invalid engine file name: {0:?}")]
    InvalidName(String),

    /// The requested file does not exist in the engine filesystem.
    #[error("no such file in engine filesystem: {0}")]
    NotFound(String),

    /// Reading or writing the engine filesystem failed.
    #[error("engine filesystem error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A command exited unsuccessfully.
    #[error("engine command failed ({}): {detail}", exit_label(.code))]
    ExecFailed { code: Option<i32>, detail: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    }
}

/// Payload returned when reading a file back out of an engine.
///
/// Engines normally hand back raw bytes. Some engines can also return
/// decoded text; callers expecting audio must treat that as unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileData {
    Binary(Vec<u8>),
    Text(String),
}

/// An audio processing engine with its own scratch filesystem.
///
/// Calls are strictly sequential: every method blocks until the engine has
/// finished the operation. Implementations are not expected to tolerate
/// concurrent use, which is why the track builder keeps its engine behind a
/// mutex.
pub trait Engine: Send {
    /// Returns true once [`Engine::load`] has succeeded.
    fn is_loaded(&self) -> bool;

    /// Prepares the engine for use.
    ///
    /// Calling this on an already loaded engine is a no-op.
    fn load(&mut self) -> Result<(), EngineError>;

    /// Stores `data` under `name`, replacing any existing file.
    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    /// Runs one engine command. `args` excludes the program name.
    fn exec(&mut self, args: &[String]) -> Result<(), EngineError>;

    /// Reads a file back out of the engine filesystem.
    fn read_file(&mut self, name: &str) -> Result<FileData, EngineError>;

    /// Deletes a file from the engine filesystem.
    fn remove_file(&mut self, name: &str) -> Result<(), EngineError>;
}

/// Checks that `name` is a flat file name usable inside an engine filesystem.
///
/// Rejects empty names, `.` and `..`, path separators and NUL bytes.
/// Also rejects characters that would need escaping in engine arguments:
/// `|` separates inputs of the `concat:` protocol, and whitespace, quotes
/// and `#` change the meaning of a concat playlist line.
pub fn check_name(name: &str) -> Result<(), EngineError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0', '|', '\'', '"', '#'])
        || name.chars().any(char::is_whitespace);
    if bad {
        Err(EngineError::InvalidName(name.to_owned()))
    } else {
        Ok(())
    }
}
