//! Size-rotated file appender
//!
//! The active file keeps its configured name. When a write would push it past
//! the size limit it is renamed to `<stem>-<UTC timestamp>.<ext>` (optionally
//! gzipped) and a fresh file is opened. Backups beyond the count or age limit
//! are removed after each rotation.

use crate::core::appender::Appender;
use crate::core::error::{LoggerError, Result};
use crate::core::output_format::OutputStyle;
use crate::core::record::Record;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const BACKUP_TIME_LEN: usize = 23;
const COMPRESSED_SUFFIX: &str = ".gz";
const MEGABYTE: u64 = 1024 * 1024;

/// Rotation limits for a log file
///
/// # Examples
///
/// ```
/// use rust_trace_logger::appenders::RotationPolicy;
///
/// let policy = RotationPolicy::new()
///     .with_max_size_mb(50)
///     .with_max_backups(7)
///     .with_max_age_days(30)
///     .with_compression(true);
/// assert_eq!(policy.max_bytes(), 50 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    /// Size limit of the active file in megabytes
    pub max_size_mb: u64,
    /// Exact size limit in bytes; takes precedence over `max_size_mb`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    /// Backups to keep; 0 keeps all
    pub max_backups: usize,
    /// Days to keep backups; 0 keeps them regardless of age
    pub max_age_days: u32,
    /// Gzip rotated files
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_mb: 100,
            max_size_bytes: None,
            max_backups: 0,
            max_age_days: 0,
            compress: false,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_size_mb(mut self, megabytes: u64) -> Self {
        self.max_size_mb = megabytes;
        self.max_size_bytes = None;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = Some(bytes);
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_size_bytes
            .unwrap_or_else(|| self.max_size_mb.saturating_mul(MEGABYTE))
            .max(1)
    }

    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_days > 0).then(|| Duration::from_secs(u64::from(self.max_age_days) * 86_400))
    }

    /// Reject limits that would rotate on every write
    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes.is_none() && self.max_size_mb == 0 {
            return Err(LoggerError::config("rotation", "max_size_mb must be positive"));
        }
        if self.max_size_bytes == Some(0) {
            return Err(LoggerError::config("rotation", "max_size_bytes must be positive"));
        }
        Ok(())
    }
}

/// A rotated file found next to the active one
#[derive(Debug, Clone)]
struct Backup {
    path: PathBuf,
    rotated_at: DateTime<Utc>,
}

/// File appender with size-based rotation
///
/// # Examples
///
/// ```no_run
/// use rust_trace_logger::appenders::{RotatingFileAppender, RotationPolicy};
/// use rust_trace_logger::core::OutputStyle;
///
/// let policy = RotationPolicy::new().with_max_size_mb(10).with_max_backups(5);
/// let appender = RotatingFileAppender::new("/var/log/app.log", policy, OutputStyle::Json).unwrap();
/// ```
pub struct RotatingFileAppender {
    base_path: PathBuf,
    policy: RotationPolicy,
    style: OutputStyle,
    writer: Option<BufWriter<File>>,
    current_size: u64,
}

impl RotatingFileAppender {
    /// Open (or create) the active file, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns error if the policy is invalid or the file cannot be opened
    pub fn new<P: AsRef<Path>>(path: P, policy: RotationPolicy, style: OutputStyle) -> Result<Self> {
        policy.validate()?;
        let base_path = path.as_ref().to_path_buf();

        if let Some(parent) = base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(
                    "create log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let (file, current_size) = Self::open_file(&base_path)?;

        Ok(Self {
            base_path,
            policy,
            style,
            writer: Some(BufWriter::new(file)),
            current_size,
        })
    }

    fn open_file(path: &Path) -> Result<(File, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                LoggerError::file_appender(path.display().to_string(), format!("Failed to open: {}", e))
            })?;

        let size = file
            .metadata()
            .map_err(|e| {
                LoggerError::file_appender(
                    path.display().to_string(),
                    format!("Cannot access file metadata: {}", e),
                )
            })?
            .len();
        Ok((file, size))
    }

    /// `(stem, ext)` used for backup names; `ext` may be empty
    fn name_parts(&self) -> (String, String) {
        let stem = self
            .base_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("app")
            .to_string();
        let ext = self
            .base_path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        (stem, ext)
    }

    fn backup_path(&self, at: DateTime<Utc>) -> PathBuf {
        let (stem, ext) = self.name_parts();
        let stamp = at.format(BACKUP_TIME_FORMAT);
        let name = if ext.is_empty() {
            format!("{}-{}", stem, stamp)
        } else {
            format!("{}-{}.{}", stem, stamp, ext)
        };
        self.base_path.with_file_name(name)
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                LoggerError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to flush before rotation: {}", e),
                )
            })?;
        }

        // Two rotations within one millisecond would collide; step forward.
        let mut at = Utc::now();
        let mut backup = self.backup_path(at);
        while backup.exists() || Self::compressed_path(&backup).exists() {
            at += chrono::Duration::milliseconds(1);
            backup = self.backup_path(at);
        }

        if self.base_path.exists() {
            fs::rename(&self.base_path, &backup).map_err(|e| {
                LoggerError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to rotate current log file: {}", e),
                )
            })?;

            if self.policy.compress {
                Self::compress_file(&backup)?;
            }
        }

        let (file, size) = Self::open_file(&self.base_path)?;
        self.writer = Some(BufWriter::new(file));
        self.current_size = size;

        self.remove_expired_backups();
        Ok(())
    }

    /// Backups of this file, newest first
    fn list_backups(&self) -> Vec<Backup> {
        let (stem, ext) = self.name_parts();
        let prefix = format!("{}-", stem);
        let suffix = if ext.is_empty() { String::new() } else { format!(".{}", ext) };
        let dir = match self.base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };

        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut backups: Vec<Backup> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let rest = name.strip_prefix(&prefix)?;
                let rest = rest.strip_suffix(COMPRESSED_SUFFIX).unwrap_or(rest);
                let stamp = rest.strip_suffix(suffix.as_str())?;
                if stamp.len() != BACKUP_TIME_LEN {
                    return None;
                }
                let rotated_at = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT)
                    .ok()?
                    .and_utc();
                Some(Backup {
                    path: entry.path(),
                    rotated_at,
                })
            })
            .collect();

        backups.sort_by(|a, b| b.rotated_at.cmp(&a.rotated_at).then_with(|| b.path.cmp(&a.path)));
        backups
    }

    fn remove_expired_backups(&self) {
        let backups = self.list_backups();
        let cutoff = self
            .policy
            .max_age()
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .map(|age| Utc::now() - age);

        for (index, backup) in backups.iter().enumerate() {
            let over_count = self.policy.max_backups > 0 && index >= self.policy.max_backups;
            let too_old = cutoff.is_some_and(|cutoff| backup.rotated_at < cutoff);
            if !(over_count || too_old) {
                continue;
            }
            if let Err(e) = fs::remove_file(&backup.path) {
                eprintln!(
                    "[LOGGER WARNING] Failed to remove old backup {}: {}",
                    backup.path.display(),
                    e
                );
            }
        }
    }

    fn compressed_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(COMPRESSED_SUFFIX);
        PathBuf::from(name)
    }

    /// Gzip `path` to `path.gz` using streaming I/O. The original is removed
    /// only after the compressed file is complete.
    fn compress_file(path: &Path) -> Result<()> {
        use std::io::{BufReader, Read};

        let gz_path = Self::compressed_path(path);
        let mut temp_name = gz_path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_gz_path = PathBuf::from(temp_name);

        let input = File::open(path).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to open file for compression: {}", path.display()),
                e,
            )
        })?;
        let mut reader = BufReader::with_capacity(64 * 1024, input);

        let output = File::create(&temp_gz_path).map_err(|e| {
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to create temporary compressed file: {}", temp_gz_path.display()),
                e,
            )
        })?;
        let mut encoder = flate2::write::GzEncoder::new(
            BufWriter::with_capacity(64 * 1024, output),
            flate2::Compression::default(),
        );

        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let bytes_read = reader.read(&mut buffer).map_err(|e| {
                let _ = fs::remove_file(&temp_gz_path);
                LoggerError::io_operation(
                    "compress log file",
                    format!("Failed to read from file: {}", path.display()),
                    e,
                )
            })?;

            if bytes_read == 0 {
                break;
            }

            encoder.write_all(&buffer[..bytes_read]).map_err(|e| {
                let _ = fs::remove_file(&temp_gz_path);
                LoggerError::io_operation("compress log file", "Failed to compress data chunk", e)
            })?;
        }

        let mut inner = encoder.finish().map_err(|e| {
            let _ = fs::remove_file(&temp_gz_path);
            LoggerError::io_operation("compress log file", "Failed to finish compression", e)
        })?;
        inner.flush().map_err(|e| {
            let _ = fs::remove_file(&temp_gz_path);
            LoggerError::io_operation("compress log file", "Failed to flush compressed file", e)
        })?;
        drop(inner);

        fs::rename(&temp_gz_path, &gz_path).map_err(|e| {
            let _ = fs::remove_file(&temp_gz_path);
            LoggerError::io_operation(
                "compress log file",
                format!("Failed to rename compressed file to: {}", gz_path.display()),
                e,
            )
        })?;

        if let Err(e) = fs::remove_file(path) {
            eprintln!(
                "[LOGGER WARNING] Compression succeeded but failed to remove original file {}: {}. \
                 Both compressed and uncompressed versions exist.",
                path.display(),
                e
            );
        }

        Ok(())
    }

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

impl Appender for RotatingFileAppender {
    fn name(&self) -> &str {
        "rotating_file"
    }

    fn append(&mut self, record: &Record) -> Result<()> {
        let mut line = self.style.format(record);
        line.push('\n');
        let len = line.len() as u64;

        if self.current_size > 0 && self.current_size + len > self.policy.max_bytes() {
            if let Err(e) = self.rotate() {
                eprintln!("[LOGGER WARNING] Log rotation failed: {}. Continuing with current file.", e);

                if self.writer.is_none() {
                    let (file, size) = Self::open_file(&self.base_path).map_err(|reopen_err| {
                        eprintln!(
                            "[LOGGER ERROR] Failed to reopen log file after rotation failure: {}",
                            reopen_err
                        );
                        e
                    })?;
                    self.writer = Some(BufWriter::new(file));
                    self.current_size = size;
                }

                // Let the file grow rather than retry rotation on every write
                self.current_size = 0;
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::writer("Writer not initialized"))?;
        // Each line reaches the file before append returns.
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| {
                LoggerError::file_appender(
                    self.base_path.display().to_string(),
                    format!("Failed to write log entry: {}", e),
                )
            })?;
        self.current_size += len;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush().map_err(|e| {
                LoggerError::file_appender(
                    self.base_path.display().to_string(),
                    format!("Failed to flush: {}", e),
                )
            })?;
        }
        Ok(())
    }
}

impl Drop for RotatingFileAppender {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}
