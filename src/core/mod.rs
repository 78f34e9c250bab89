//! Core logger types and traits

pub mod appender;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod level;
pub mod logger;
pub mod metrics;
pub mod output_format;
pub mod record;
pub mod timestamp;
pub mod value;

pub use appender::Appender;
pub use backend::{AppenderBackend, Backend};
pub use config::{FileConfig, LoggerConfig};
pub use context::Context;
pub use error::{LoggerError, Result};
pub use field::FieldValue;
pub use level::{Level, UNKNOWN_LEVEL};
pub use logger::{Logger, LoggerBuilder, Mode, DEFAULT_SHUTDOWN_TIMEOUT};
pub use metrics::DeliveryMetrics;
pub use output_format::OutputStyle;
pub use record::Record;
pub use timestamp::TimestampFormat;
pub use value::{bind_values, contains_valuer, value, Field, KeyValues, Valuer};
