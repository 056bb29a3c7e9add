//! Rotating file sink
//!
//! Rotates the active file by size, elapsed time or wall-clock day, keeps a
//! bounded number of numbered backups (`app.log.1` is the newest), expires
//! backups past a maximum age and can gzip rotated files.

use crate::core::{Result, Sink, SinkError};
use chrono::{DateTime, Local, Timelike};
use flate2::{write::GzEncoder, Compression};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::file::DEFAULT_BUFFER_SIZE;

/// When the active file is rotated
///
/// # Examples
///
/// ```
/// use sharded_log_sink::sinks::RotationTrigger;
/// use std::time::Duration;
///
/// // Rotate before the file would exceed 100 MiB
/// let by_size = RotationTrigger::Size { max_bytes: 100 * 1024 * 1024 };
///
/// // Rotate every day at 02:00 local time
/// let nightly = RotationTrigger::daily(2);
///
/// // Whichever comes first
/// let either = RotationTrigger::SizeOrInterval {
///     max_bytes: 50 * 1024 * 1024,
///     interval: Duration::from_secs(6 * 3600),
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RotationTrigger {
    /// Rotate before a write would push the file past `max_bytes`
    Size { max_bytes: u64 },

    /// Rotate once `interval` has elapsed since the file was opened
    Interval(Duration),

    /// Rotate on the first write of a new local day at or after `hour`
    Daily { hour: u8 },

    /// Size or interval, whichever comes first
    SizeOrInterval { max_bytes: u64, interval: Duration },

    /// Never rotate; for files rotated by an external tool
    Never,
}

impl Default for RotationTrigger {
    fn default() -> Self {
        RotationTrigger::Size {
            max_bytes: 100 * 1024 * 1024,
        }
    }
}

impl RotationTrigger {
    /// # Panics
    ///
    /// Panics if hour is greater than 23
    #[must_use]
    pub fn daily(hour: u8) -> Self {
        assert!(hour <= 23, "Hour must be between 0 and 23");
        RotationTrigger::Daily { hour }
    }

    fn size_limit(&self) -> Option<u64> {
        match self {
            RotationTrigger::Size { max_bytes }
            | RotationTrigger::SizeOrInterval { max_bytes, .. } => Some(*max_bytes),
            _ => None,
        }
    }

    fn interval(&self) -> Option<Duration> {
        match self {
            RotationTrigger::Interval(interval)
            | RotationTrigger::SizeOrInterval { interval, .. } => Some(*interval),
            _ => None,
        }
    }
}

/// Rotation and retention settings
///
/// # Example
///
/// ```
/// use sharded_log_sink::sinks::{RotationPolicy, RotationTrigger};
/// use std::time::Duration;
///
/// let policy = RotationPolicy::new()
///     .with_trigger(RotationTrigger::Size { max_bytes: 4 * 1024 * 1024 * 1024 })
///     .with_max_backups(10)
///     .with_max_age(Duration::from_secs(7 * 24 * 3600))
///     .with_compression(true);
/// assert_eq!(policy.max_backups, 10);
/// ```
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    pub trigger: RotationTrigger,
    /// Numbered backups to keep; 0 discards the old file on rotation
    pub max_backups: usize,
    /// Backups last modified longer ago than this are deleted on rotation
    pub max_age: Option<Duration>,
    /// Gzip rotated files
    pub compress: bool,
    /// Write buffer size in bytes
    pub buffer_size: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            trigger: RotationTrigger::default(),
            max_backups: 5,
            max_age: None,
            compress: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_trigger(mut self, trigger: RotationTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }
}

/// File sink that rotates according to a [`RotationPolicy`]
///
/// ```no_run
/// use sharded_log_sink::sinks::{RotatingFileSink, RotationPolicy, RotationTrigger};
///
/// let policy = RotationPolicy::new()
///     .with_trigger(RotationTrigger::daily(0))
///     .with_max_backups(7)
///     .with_compression(true);
/// let sink = RotatingFileSink::with_policy("/var/log/app/app.log", policy).unwrap();
/// ```
pub struct RotatingFileSink {
    base_path: PathBuf,
    policy: RotationPolicy,
    writer: Option<BufWriter<File>>,
    current_size: u64,
    opened_at: SystemTime,
}

impl RotatingFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_policy(path, RotationPolicy::default())
    }

    /// # Errors
    ///
    /// Returns an error if the directory or the file cannot be created
    pub fn with_policy<P: AsRef<Path>>(path: P, policy: RotationPolicy) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        if let Some(parent) = base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                SinkError::io_operation(
                    "create log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let (file, current_size, opened_at) = Self::open_active(&base_path)?;
        Ok(Self {
            writer: Some(BufWriter::with_capacity(policy.buffer_size, file)),
            base_path,
            policy,
            current_size,
            opened_at,
        })
    }

    /// Open (or create) the active file, reporting its size and the time it
    /// was last written, which stands in for when it was opened.
    fn open_active(path: &Path) -> Result<(File, u64, SystemTime)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                SinkError::file_sink(path.display().to_string(), format!("Failed to open: {}", e))
            })?;
        let metadata = file.metadata().map_err(|e| {
            SinkError::file_sink(
                path.display().to_string(),
                format!("Cannot access file metadata: {}", e),
            )
        })?;
        let opened_at = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        Ok((file, metadata.len(), opened_at))
    }

    fn should_rotate(&self, incoming: usize) -> bool {
        let size_exceeded = self.policy.trigger.size_limit().is_some_and(|max| {
            self.current_size > 0 && self.current_size + incoming as u64 > max
        });
        let interval_elapsed = self.policy.trigger.interval().is_some_and(|interval| {
            SystemTime::now()
                .duration_since(self.opened_at)
                .unwrap_or(Duration::ZERO)
                >= interval
        });
        let new_day = match self.policy.trigger {
            RotationTrigger::Daily { hour } => {
                let now: DateTime<Local> = Local::now();
                let opened: DateTime<Local> = self.opened_at.into();
                now.date_naive() != opened.date_naive() && now.hour() >= u32::from(hour)
            }
            _ => false,
        };
        size_exceeded || interval_elapsed || new_day
    }

    fn backup_path(&self, index: usize, compressed: bool) -> PathBuf {
        let mut name = self
            .base_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "app.log".into());
        name.push(format!(".{}", index));
        if compressed {
            name.push(".gz");
        }
        self.base_path.with_file_name(name)
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                SinkError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to flush before rotation: {}", e),
                )
            })?;
        }

        if self.policy.max_backups == 0 {
            remove_if_exists(&self.base_path)?;
        } else {
            for compressed in [false, true] {
                remove_if_exists(&self.backup_path(self.policy.max_backups, compressed))?;
            }
            for index in (1..self.policy.max_backups).rev() {
                for compressed in [false, true] {
                    let from = self.backup_path(index, compressed);
                    if from.exists() {
                        fs::rename(&from, self.backup_path(index + 1, compressed)).map_err(|e| {
                            SinkError::file_rotation(
                                from.display().to_string(),
                                format!("Failed to shift backup: {}", e),
                            )
                        })?;
                    }
                }
            }

            let newest = self.backup_path(1, false);
            fs::rename(&self.base_path, &newest).map_err(|e| {
                SinkError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to rotate current log file: {}", e),
                )
            })?;
            if self.policy.compress {
                compress_file(&newest, &self.backup_path(1, true))?;
            }
        }

        let (file, size, _) = Self::open_active(&self.base_path)?;
        self.writer = Some(BufWriter::with_capacity(self.policy.buffer_size, file));
        self.current_size = size;
        self.opened_at = SystemTime::now();

        self.expire_backups();
        Ok(())
    }

    /// Delete backups older than `max_age`. Failures are reported, not fatal.
    fn expire_backups(&self) {
        let Some(max_age) = self.policy.max_age else {
            return;
        };
        let now = SystemTime::now();

        for index in 1..=self.policy.max_backups {
            for compressed in [false, true] {
                let path = self.backup_path(index, compressed);
                let expired = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(|modified| {
                        now.duration_since(modified).unwrap_or(Duration::ZERO) > max_age
                    })
                    .unwrap_or(false);
                if expired {
                    if let Err(e) = fs::remove_file(&path) {
                        eprintln!(
                            "[SINK WARNING] Failed to remove expired backup {}: {}",
                            path.display(),
                            e
                        );
                    }
                }
            }
        }
    }

    /// Get current file size
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }
}

impl Sink for RotatingFileSink {
    fn write(&mut self, record: &[u8]) -> Result<()> {
        if self.writer.is_some() && self.should_rotate(record.len()) {
            if let Err(e) = self.rotate() {
                // Keep logging into whatever file is at the base path
                eprintln!(
                    "[SINK WARNING] Log rotation failed: {}. Continuing with current file.",
                    e
                );
                if self.writer.is_none() {
                    let (file, size, _) = Self::open_active(&self.base_path)?;
                    self.writer = Some(BufWriter::with_capacity(self.policy.buffer_size, file));
                    self.current_size = size;
                }
                self.opened_at = SystemTime::now();
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::closed("rotating_file"))?;
        writer.write_all(record).map_err(|e| {
            SinkError::file_sink(
                self.base_path.display().to_string(),
                format!("Failed to write record: {}", e),
            )
        })?;
        self.current_size += record.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush().map_err(|e| {
                SinkError::file_sink(
                    self.base_path.display().to_string(),
                    format!("Failed to flush: {}", e),
                )
            })?;
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
        "rotating_file"
    }
}

impl Drop for RotatingFileSink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SinkError::file_rotation(
            path.display().to_string(),
            format!("Failed to remove old backup: {}", e),
        )),
    }
}

/// Gzip `src` into `dest` through a temporary file, removing `src` only once
/// the archive is complete.
fn compress_file(src: &Path, dest: &Path) -> Result<()> {
    let mut tmp_name = dest.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = (|| -> io::Result<()> {
        let mut reader = BufReader::with_capacity(64 * 1024, File::open(src)?);
        let output = BufWriter::with_capacity(64 * 1024, File::create(&tmp)?);
        let mut encoder = GzEncoder::new(output, Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?.flush()?;
        fs::rename(&tmp, dest)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(SinkError::io_operation(
            "compress log file",
            format!("Failed to compress {}", src.display()),
            e,
        ));
    }

    if let Err(e) = fs::remove_file(src) {
        eprintln!(
            "[SINK WARNING] Compressed {} but could not remove it: {}",
            src.display(),
            e
        );
    }
    Ok(())
}
