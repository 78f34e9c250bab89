//! Line encodings for emitted records
//!
//! - Json: one object per line, fields in emission order (default)
//! - Text: `LEVEL<TAB>message<TAB>key=value ...`

use super::field::FieldValue;
use super::record::Record;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// Example: `{"level":"INFO","message":"hello","service":"svc","code":200}`
    #[default]
    Json,

    /// Example: `INFO	hello	service=svc code=200`
    Text,
}

impl OutputStyle {
    pub fn format(&self, record: &Record) -> String {
        match self {
            OutputStyle::Json => Self::format_json(record),
            OutputStyle::Text => Self::format_text(record, record.level.to_str()),
        }
    }

    /// Text rendering with a caller-supplied level label (used for colors)
    pub fn format_text_with_label(record: &Record, label: &str) -> String {
        Self::format_text(record, label)
    }

    fn format_text(record: &Record, label: &str) -> String {
        let mut line = format!("{}\t{}", label, record.message);
        let mut sep = '\t';
        for (key, value) in &record.fields {
            line.push(sep);
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&text_value(value));
            sep = ' ';
        }
        if let Some(ref stack) = record.stack {
            line.push(sep);
            line.push_str("stack=");
            line.push_str(&quote_value(stack));
        }
        line
    }

    // Written by hand so duplicate keys survive in order.
    fn format_json(record: &Record) -> String {
        let mut out = String::with_capacity(64 + record.fields.len() * 24);
        out.push('{');
        push_json_pair(&mut out, "level", &serde_json::Value::from(record.level.to_str()));
        out.push(',');
        push_json_pair(&mut out, "message", &serde_json::Value::from(record.message.as_str()));
        for (key, value) in &record.fields {
            out.push(',');
            push_json_pair(&mut out, key, &value.to_json_value());
        }
        if let Some(ref stack) = record.stack {
            out.push(',');
            push_json_pair(&mut out, "stack", &serde_json::Value::from(stack.as_str()));
        }
        out.push('}');
        out
    }
}

fn push_json_pair(out: &mut String, key: &str, value: &serde_json::Value) {
    // Serializing a string or a Value into a String cannot fail.
    out.push_str(&serde_json::to_string(key).unwrap_or_default());
    out.push(':');
    out.push_str(&serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()));
}

fn escape_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .collect()
}

fn text_value(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => {
            if s.is_empty() || s.contains([' ', '"', '=', '\n', '\r', '\t']) {
                quote_value(s)
            } else {
                s.clone()
            }
        }
        FieldValue::Json(v) => quote_value(&v.to_string()),
        other => other.to_string(),
    }
}

fn quote_value(value: &str) -> String {
    format!(
        "\"{}\"",
        value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    )
}
