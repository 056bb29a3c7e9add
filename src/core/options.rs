//! File-backed sink options
//!
//! The option set mirrors what a service typically keeps in its config file:
//! where the log goes, how big the queues are, what happens when they fill up
//! and how the file is rotated.
//!
//! ```
//! use sharded_log_sink::{AdmissionPolicy, SinkOptions};
//!
//! let options = SinkOptions::from_json_str(r#"{
//!     "log_path": "/tmp/app/app.log",
//!     "admission_policy": "drop_with_sampling",
//!     "shard_count": 64
//! }"#).unwrap();
//!
//! assert_eq!(options.admission_policy, AdmissionPolicy::DropWithSampling);
//! assert_eq!(options.shard_capacity, 1024);
//! assert!(options.rotate);
//! ```

use super::{
    admission_policy::{AdmissionPolicy, ReadStrategy},
    async_sink::{DEFAULT_SHARD_CAPACITY, DEFAULT_SHARD_COUNT},
    error::{Result, SinkError},
    shard_set::normalize_shard_count,
    sink::Sink,
};
use crate::sinks::{
    FileSink, RotatingFileSink, RotationPolicy, RotationTrigger, DEFAULT_BUFFER_SIZE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BYTES_PER_MB: u64 = 1024 * 1024;
const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkOptions {
    /// Log file location
    pub log_path: PathBuf,

    pub admission_policy: AdmissionPolicy,

    pub read_strategy: ReadStrategy,

    /// Rotate the file; when false the file is only ever appended to
    pub rotate: bool,

    /// Write buffer in bytes
    pub bufio_size: usize,

    pub shard_count: usize,

    pub shard_capacity: usize,

    /// Size threshold for rotation, in MiB
    pub max_file_size_mb: u64,

    pub max_backups: usize,

    /// Backups older than this are deleted; 0 keeps them forever
    pub max_age_days: u64,

    /// Gzip rotated files
    pub compress: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            admission_policy: AdmissionPolicy::default(),
            read_strategy: ReadStrategy::default(),
            rotate: true,
            bufio_size: DEFAULT_BUFFER_SIZE,
            shard_count: DEFAULT_SHARD_COUNT,
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            max_file_size_mb: 4096,
            max_backups: 10,
            max_age_days: 7,
            compress: true,
        }
    }
}

/// `./log/<process>/<process>.log`, named after the running executable
pub fn default_log_path() -> PathBuf {
    let process = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "app".to_string());
    PathBuf::from(".")
        .join("log")
        .join(&process)
        .join(format!("{}.log", process))
}

impl SinkOptions {
    /// Parse options from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: SinkOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            SinkError::io_operation(
                "read sink options",
                format!("Failed to read '{}'", path.display()),
                e,
            )
        })?;
        Self::from_json_str(&json)
    }

    /// Check the options describe a sink that can be built
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.log_path.as_os_str().is_empty() {
            return Err(SinkError::config("log_path", "Log path must not be empty"));
        }
        if self.bufio_size == 0 {
            return Err(SinkError::config("bufio_size", "Buffer size must be at least 1 byte"));
        }
        if self.shard_capacity == 0 {
            return Err(SinkError::config(
                "shard_capacity",
                "Shard capacity must be at least 1",
            ));
        }
        if normalize_shard_count(self.shard_count).is_none() {
            return Err(SinkError::config(
                "shard_count",
                format!("{} shards cannot be rounded to a power of two", self.shard_count),
            ));
        }
        if self.rotate && self.max_file_size_mb == 0 {
            return Err(SinkError::config(
                "max_file_size_mb",
                "Rotation size must be at least 1 MiB",
            ));
        }
        Ok(())
    }

    /// Rotation settings derived from the size, backup and age options
    pub fn rotation_policy(&self) -> RotationPolicy {
        let mut policy = RotationPolicy::new()
            .with_trigger(RotationTrigger::Size {
                max_bytes: self.max_file_size_mb.saturating_mul(BYTES_PER_MB),
            })
            .with_max_backups(self.max_backups)
            .with_compression(self.compress)
            .with_buffer_size(self.bufio_size);
        if self.max_age_days > 0 {
            policy = policy.with_max_age(Duration::from_secs(
                self.max_age_days.saturating_mul(SECS_PER_DAY),
            ));
        }
        policy
    }

    /// Open the file sink these options describe
    pub fn build_sink(&self) -> Result<Box<dyn Sink>> {
        if self.rotate {
            Ok(Box::new(RotatingFileSink::with_policy(
                &self.log_path,
                self.rotation_policy(),
            )?))
        } else {
            Ok(Box::new(FileSink::with_buffer_size(
                &self.log_path,
                self.bufio_size,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let options = SinkOptions::default();
        assert!(options.rotate);
        assert!(options.compress);
        assert_eq!(options.bufio_size, 8 * 1024);
        assert_eq!(options.shard_count * options.shard_capacity, 256 * 1024);
        assert_eq!(options.max_file_size_mb, 4096);
        assert_eq!(options.max_backups, 10);
        assert_eq!(options.max_age_days, 7);
        assert_eq!(options.admission_policy, AdmissionPolicy::Block);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_default_log_path_layout() {
        let path = default_log_path();
        let file = path.file_name().unwrap().to_string_lossy().into_owned();
        let dir = path
            .parent()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();

        assert_eq!(file, format!("{}.log", dir));
        assert!(path.starts_with("./log"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options =
            SinkOptions::from_json_str(r#"{"rotate": false, "bufio_size": 512}"#).unwrap();
        assert!(!options.rotate);
        assert_eq!(options.bufio_size, 512);
        assert_eq!(options.shard_count, DEFAULT_SHARD_COUNT);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let result = SinkOptions::from_json_str("{ not json");
        assert!(matches!(result, Err(SinkError::JsonError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            SinkOptions {
                shard_capacity: 0,
                ..SinkOptions::default()
            },
            SinkOptions {
                bufio_size: 0,
                ..SinkOptions::default()
            },
            SinkOptions {
                shard_count: usize::MAX,
                ..SinkOptions::default()
            },
            SinkOptions {
                max_file_size_mb: 0,
                ..SinkOptions::default()
            },
            SinkOptions {
                log_path: PathBuf::new(),
                ..SinkOptions::default()
            },
        ];
        for options in cases {
            assert!(
                matches!(options.validate(), Err(SinkError::InvalidConfiguration { .. })),
                "expected rejection for {:?}",
                options
            );
        }

        // Size is irrelevant when the file is never rotated
        let plain = SinkOptions {
            rotate: false,
            max_file_size_mb: 0,
            ..SinkOptions::default()
        };
        assert!(plain.validate().is_ok());
    }

    #[test]
    fn test_rotation_policy_mapping() {
        let options = SinkOptions {
            max_file_size_mb: 2,
            max_backups: 3,
            max_age_days: 0,
            compress: false,
            ..SinkOptions::default()
        };
        let policy = options.rotation_policy();

        assert_eq!(
            policy.trigger,
            RotationTrigger::Size {
                max_bytes: 2 * 1024 * 1024
            }
        );
        assert_eq!(policy.max_backups, 3);
        assert_eq!(policy.max_age, None);
        assert!(!policy.compress);

        let aged = SinkOptions {
            max_age_days: 7,
            ..SinkOptions::default()
        }
        .rotation_policy();
        assert_eq!(aged.max_age, Some(Duration::from_secs(7 * 24 * 3600)));
    }

    #[test]
    fn test_from_path_and_build_sink() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("svc").join("svc.log");
        let config_path = dir.path().join("sink.json");
        let options = SinkOptions {
            log_path: log_path.clone(),
            rotate: false,
            ..SinkOptions::default()
        };
        fs::write(&config_path, serde_json::to_string(&options).unwrap()).unwrap();

        let loaded = SinkOptions::from_path(&config_path).unwrap();
        assert_eq!(loaded, options);

        let mut sink = loaded.build_sink().unwrap();
        assert_eq!(sink.name(), "file");
        sink.write(b"{}\n").unwrap();
        sink.close().unwrap();
        assert_eq!(fs::read_to_string(&log_path).unwrap(), "{}\n");

        let rotating = SinkOptions {
            log_path,
            ..SinkOptions::default()
        }
        .build_sink()
        .unwrap();
        assert_eq!(rotating.name(), "rotating_file");
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempdir().unwrap();
        let result = SinkOptions::from_path(dir.path().join("absent.json"));
        assert!(matches!(result, Err(SinkError::IoOperation { .. })));
    }
}
