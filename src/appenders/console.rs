//! Console appender implementation

use crate::core::{Appender, OutputStyle, Record, Result};
use std::io::Write;

/// Writes one line per record to stdout
pub struct ConsoleAppender {
    style: OutputStyle,
    use_colors: bool,
}

impl ConsoleAppender {
    pub fn new(style: OutputStyle) -> Self {
        Self {
            style,
            use_colors: false,
        }
    }

    /// Color the level label in text style (feature `console`)
    #[must_use]
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn style(&self) -> OutputStyle {
        self.style
    }

    fn render(&self, record: &Record) -> String {
        match self.style {
            OutputStyle::Text if self.use_colors => self.format_colored(record),
            style => style.format(record),
        }
    }

    #[cfg(feature = "console")]
    fn format_colored(&self, record: &Record) -> String {
        use colored::Colorize;
        let label = record.level.to_str().color(record.level.color_code()).to_string();
        OutputStyle::format_text_with_label(record, &label)
    }

    #[cfg(not(feature = "console"))]
    fn format_colored(&self, record: &Record) -> String {
        self.style.format(record)
    }
}

impl Default for ConsoleAppender {
    fn default() -> Self {
        Self::new(OutputStyle::default())
    }
}

impl Appender for ConsoleAppender {
    fn append(&mut self, record: &Record) -> Result<()> {
        let line = self.render(record);
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", line)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
