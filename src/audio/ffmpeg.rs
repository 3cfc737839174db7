//! `ffmpeg` child-process engine.
//!
//! Each loaded engine owns a private scratch directory under the system
//! temp directory. Files written to the engine land there, and every
//! command runs with that directory as its working directory so the
//! builder can refer to files by bare name. Everything the engine prints
//! to stderr is forwarded to the `engine` tracing target.

use super::engine::{check_name, Engine, EngineError, FileData};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use uuid::Uuid;

/// Environment variable overriding the engine program location.
pub const FFMPEG_ENV: &str = "TABATA_FFMPEG";

/// Program name looked up on `PATH` when nothing else is configured.
const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Number of trailing stderr lines kept for error reports.
const ERROR_TAIL_LINES: usize = 8;

/// State that only exists once the engine has been loaded.
#[derive(Debug)]
struct Loaded {
    program: PathBuf,
    scratch: PathBuf,
}

impl Drop for Loaded {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.scratch) {
            tracing::warn!(
                "Failed to remove engine scratch directory {}: {}",
                self.scratch.display(),
                e
            );
        }
    }
}

/// Engine backed by an `ffmpeg` executable.
#[derive(Debug, Default)]
pub struct FfmpegEngine {
    /// Explicitly configured program, if any.
    program: Option<PathBuf>,
    loaded: Option<Loaded>,
}

impl FfmpegEngine {
    /// Creates an unloaded engine.
    ///
    /// # Arguments
    ///
    /// * `program` - Path to the `ffmpeg` executable. When `None`, the
    ///   `TABATA_FFMPEG` environment variable is consulted, then `ffmpeg`
    ///   is looked up on `PATH`.
    pub fn new(program: Option<PathBuf>) -> Self {
        Self {
            program,
            loaded: None,
        }
    }

    /// Returns the program this engine runs (or will run once loaded).
    pub fn program(&self) -> PathBuf {
        match &self.loaded {
            Some(loaded) => loaded.program.clone(),
            None => resolve_program(self.program.as_deref(), std::env::var_os(FFMPEG_ENV)),
        }
    }

    /// Returns the scratch directory of a loaded engine.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.scratch.as_path())
    }

    fn loaded(&self) -> Result<&Loaded, EngineError> {
        self.loaded.as_ref().ok_or(EngineError::NotLoaded)
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, EngineError> {
        check_name(name)?;
        Ok(self.loaded()?.scratch.join(name))
    }
}

/// Picks the engine program: explicit path, then environment, then `PATH`.
fn resolve_program(configured: Option<&Path>, from_env: Option<OsString>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    match from_env {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_PROGRAM),
    }
}

/// Reads `reader` line by line, forwarding each line to the log and keeping
/// the last few lines for error reporting. Tolerates non-UTF-8 output.
fn forward_log<R: io::Read>(reader: R) -> io::Result<VecDeque<String>> {
    let mut reader = BufReader::new(reader);
    let mut tail = VecDeque::with_capacity(ERROR_TAIL_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        tracing::debug!(target: "engine", "{}", line);
        if tail.len() == ERROR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_owned());
    }
    Ok(tail)
}

impl Engine for FfmpegEngine {
    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn load(&mut self) -> Result<(), EngineError> {
        if self.loaded.is_some() {
            return Ok(());
        }

        let program = self.program();
        let output = Command::new(&program)
            .args(["-hide_banner", "-version"])
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EngineError::Spawn {
                program: program.clone(),
                source,
            })?;
        let banner = String::from_utf8_lossy(&output.stdout);
        let first_line = banner.lines().next().unwrap_or_default();
        if !output.status.success() || !first_line.starts_with("ffmpeg") {
            return Err(EngineError::Load {
                program,
                detail: format!("unexpected version output {first_line:?}"),
            });
        }
        tracing::info!("Loaded engine: {}", first_line);

        let scratch = std::env::temp_dir().join(format!("tabata-engine-{}", Uuid::new_v4()));
        fs::create_dir_all(&scratch).map_err(|source| EngineError::Io {
            name: scratch.display().to_string(),
            source,
        })?;
        tracing::debug!("Engine scratch directory: {}", scratch.display());

        self.loaded = Some(Loaded { program, scratch });
        Ok(())
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.path_of(name)?;
        fs::write(&path, data).map_err(|source| EngineError::Io {
            name: name.to_owned(),
            source,
        })
    }

    fn exec(&mut self, args: &[String]) -> Result<(), EngineError> {
        let loaded = self.loaded()?;
        tracing::debug!("exec: {} {}", loaded.program.display(), args.join(" "));

        // -nostdin keeps ffmpeg from waiting on the terminal, -y lets repeat
        // builds overwrite their previous outputs.
        let mut child = Command::new(&loaded.program)
            .current_dir(&loaded.scratch)
            .args(["-hide_banner", "-nostdin", "-y"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: loaded.program.clone(),
                source,
            })?;

        let tail = match child.stderr.take() {
            Some(stderr) => forward_log(stderr).map_err(|source| EngineError::Io {
                name: "<stderr>".to_owned(),
                source,
            })?,
            None => VecDeque::new(),
        };
        let status = child.wait().map_err(|source| EngineError::Spawn {
            program: loaded.program.clone(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(EngineError::ExecFailed {
                code: status.code(),
                detail: Vec::from(tail).join(" | "),
            })
        }
    }

    fn read_file(&mut self, name: &str) -> Result<FileData, EngineError> {
        let path = self.path_of(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(FileData::Binary(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(name.to_owned()))
            }
            Err(source) => Err(EngineError::Io {
                name: name.to_owned(),
                source,
            }),
        }
    }

    fn remove_file(&mut self, name: &str) -> Result<(), EngineError> {
        let path = self.path_of(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(name.to_owned()))
            }
            Err(source) => Err(EngineError::Io {
                name: name.to_owned(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_program_precedence() {
        let explicit = PathBuf::from("/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(
            resolve_program(Some(explicit.as_path()), Some("/usr/bin/other".into())),
            explicit
        );
        assert_eq!(
            resolve_program(None, Some("/usr/bin/other".into())),
            PathBuf::from("/usr/bin/other")
        );
        assert_eq!(resolve_program(None, Some(OsString::new())), PathBuf::from("ffmpeg"));
        assert_eq!(resolve_program(None, None), PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_forward_log_keeps_tail() {
        let text: String = (0..20).map(|i| format!("line {i}\n")).collect();
        let tail = forward_log(text.as_bytes()).unwrap();
        assert_eq!(tail.len(), ERROR_TAIL_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("line 12"));
        assert_eq!(tail.back().map(String::as_str), Some("line 19"));
    }

    #[test]
    fn test_forward_log_tolerates_invalid_utf8() {
        let tail = forward_log(&b"ok\n\xff\xfe broken\n\n"[..]).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[1].ends_with("broken"));
    }

    #[test]
    fn test_unloaded_engine_rejects_operations() {
        let mut engine = FfmpegEngine::new(Some(PathBuf::from("ffmpeg")));
        assert!(!engine.is_loaded());
        assert!(matches!(
            engine.write_file("input1.mp3", b"data"),
            Err(EngineError::NotLoaded)
        ));
        assert!(matches!(engine.exec(&[]), Err(EngineError::NotLoaded)));
    }

    #[test]
    fn test_missing_program_fails_to_load() {
        let mut engine =
            FfmpegEngine::new(Some(PathBuf::from("/nonexistent/tabata/ffmpeg-missing")));
        assert!(matches!(engine.load(), Err(EngineError::Spawn { .. })));
        assert!(!engine.is_loaded());
    }

    #[test]
    #[ignore] // Requires ffmpeg on PATH
    fn test_load_creates_scratch_dir() {
        let mut engine = FfmpegEngine::new(None);
        engine.load().unwrap();
        let scratch = engine.scratch_dir().unwrap().to_path_buf();
        assert!(scratch.is_dir());

        engine.write_file("note.txt", b"hello").unwrap();
        assert_eq!(
            engine.read_file("note.txt").unwrap(),
            FileData::Binary(b"hello".to_vec())
        );
        engine.remove_file("note.txt").unwrap();
        assert!(matches!(
            engine.read_file("note.txt"),
            Err(EngineError::NotFound(_))
        ));

        drop(engine);
        assert!(!scratch.exists());
    }
}
