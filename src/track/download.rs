//! Delivery of finished tracks.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A finished track ready to hand to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Suggested file name.
    pub filename: String,
    /// MIME type of `bytes`.
    pub mime_type: String,
    /// Encoded audio.
    pub bytes: Vec<u8>,
}

/// Destination for finished tracks.
pub trait DownloadSink {
    /// Hands one finished track to the user.
    fn deliver(&mut self, download: Download) -> io::Result<()>;
}

/// Collects downloads in memory.
impl DownloadSink for Vec<Download> {
    fn deliver(&mut self, download: Download) -> io::Result<()> {
        self.push(download);
        Ok(())
    }
}

/// Saves downloads into a directory, creating it if needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    saved: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            saved: Vec::new(),
        }
    }

    /// Paths written so far, oldest first.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&mut self, download: Download) -> io::Result<()> {
        // Only the final path component of the suggested name is honoured
        let filename = Path::new(&download.filename)
            .file_name()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unusable download name {:?}", download.filename),
                )
            })?
            .to_owned();

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        fs::write(&path, &download.bytes)?;
        tracing::info!(
            "Saved {} ({} bytes, {})",
            path.display(),
            download.bytes.len(),
            download.mime_type
        );
        self.saved.push(path);
        Ok(())
    }
}
