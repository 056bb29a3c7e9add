//! Plain append-mode file sink

use crate::core::{Result, Sink, SinkError};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default write buffer size (8 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Buffered, append-only file.
///
/// Opened in append mode so that an external rotation tool can move the file
/// without leaving a sparse hole behind.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Open `path` for appending behind a buffer of `buffer_size` bytes,
    /// creating parent directories as needed.
    pub fn with_buffer_size(path: impl Into<PathBuf>, buffer_size: usize) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                SinkError::io_operation(
                    "create log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                SinkError::file_sink(path.display().to_string(), format!("Failed to open: {}", e))
            })?;

        Ok(Self {
            writer: Some(BufWriter::with_capacity(buffer_size, file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| SinkError::closed("file"))
    }
}

impl Sink for FileSink {
    fn write(&mut self, record: &[u8]) -> Result<()> {
        self.writer()?.write_all(record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.log");

        let mut sink = FileSink::new(&path).unwrap();
        sink.write(b"{\"msg\":\"hello\"}\n").unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"msg\":\"hello\"}\n");
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("append.log");
        fs::write(&path, "existing\n").unwrap();

        let mut sink = FileSink::with_buffer_size(&path, 16).unwrap();
        sink.write(b"new\n").unwrap();
        sink.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "existing\nnew\n");
    }

    #[test]
    fn test_buffered_until_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("buffered.log");

        let mut sink = FileSink::new(&path).unwrap();
        sink.write(b"pending\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "pending\n");
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("closed.log")).unwrap();
        sink.close().unwrap();

        assert!(matches!(sink.write(b"x"), Err(SinkError::SinkClosed { .. })));
        // Closing twice is harmless
        sink.close().unwrap();
    }
}
