//! Serializable logger configuration

use super::error::{LoggerError, Result};
use super::level::Level;
use super::logger::{LoggerBuilder, Mode};
use super::output_format::OutputStyle;
use super::timestamp::TimestampFormat;
use super::value::Field;
use crate::appenders::RotationPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File output section of [`LoggerConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    pub path: PathBuf,
    #[serde(flatten)]
    pub policy: RotationPolicy,
}

/// Logger options as they appear in a JSON config file
///
/// # Example
///
/// ```
/// use rust_trace_logger::core::LoggerConfig;
///
/// let config = LoggerConfig::from_json(r#"{
///     "service": "checkout",
///     "mode": "prod",
///     "style": "text",
///     "level": "debug",
///     "fields": {"region": "eu-west-1"}
/// }"#).unwrap();
/// let logger = config.into_builder().console(false).build().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub service: String,
    pub mode: Mode,
    pub style: OutputStyle,
    pub level: Level,
    pub console: bool,
    pub colors: bool,
    pub timestamp_format: TimestampFormat,
    pub file: Option<FileConfig>,
    /// Static string fields, added to the prefix in key order
    pub fields: BTreeMap<String, String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            service: String::new(),
            mode: Mode::default(),
            style: OutputStyle::default(),
            level: Level::Info,
            console: true,
            colors: false,
            timestamp_format: TimestampFormat::default(),
            file: None,
            fields: BTreeMap::new(),
        }
    }
}

impl LoggerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LoggerError::config("config", e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation(
                "reading logger config",
                format!("cannot read '{}'", path.display()),
                e,
            )
        })?;
        Self::from_json(&text)
    }

    pub fn into_builder(self) -> LoggerBuilder {
        LoggerBuilder::from_config(self)
    }
}

impl LoggerBuilder {
    /// Builder preloaded with `config`; further builder calls still apply
    pub fn from_config(config: LoggerConfig) -> Self {
        let fields: Vec<Field> = config
            .fields
            .into_iter()
            .flat_map(|(k, v)| [Field::from(k), Field::from(v)])
            .collect();

        let mut builder = LoggerBuilder::new(config.service)
            .mode(config.mode)
            .output_style(config.style)
            .min_level(config.level)
            .console(config.console)
            .colors(config.colors)
            .timestamp_format(config.timestamp_format)
            .fields(fields);

        if let Some(file) = config.file {
            builder = builder.file_writer(file.path, file.policy);
        }
        builder
    }
}
