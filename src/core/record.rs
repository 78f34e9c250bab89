//! Emitted log record handed to appenders

use super::field::FieldValue;
use super::level::Level;

/// A fully resolved record: every field is concrete and keys are strings.
///
/// Fields keep emission order; duplicate keys are kept so the encoder can
/// decide shadowing by position.
#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, FieldValue)>,
    pub stack: Option<String>,
}

impl Record {
    /// Replace newlines, carriage returns and tabs with escape sequences so a
    /// message cannot forge extra log lines.
    fn sanitize_message(message: &str) -> String {
        message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    pub fn new(level: Level, message: &str) -> Self {
        Self {
            level,
            message: Self::sanitize_message(message),
            fields: Vec::new(),
            stack: None,
        }
    }

    /// Pair up an even-length flat sequence; key values are rendered to strings
    #[must_use]
    pub fn with_keyvals(mut self, keyvals: &[FieldValue]) -> Self {
        self.fields = keyvals
            .chunks_exact(2)
            .map(|pair| (pair[0].to_key(), pair[1].clone()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: String) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Last value recorded for `key`
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}
