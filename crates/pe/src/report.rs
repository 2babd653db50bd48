#![forbid(unsafe_code)]

use std::fmt::{self, Write as _};

/// Per-image report buffer. Each scan writes into its own buffer so images
/// scanned on different workers never interleave; the orchestrator emits the
/// finished text in one piece. A quiet writer drops everything.
#[derive(Debug, Default)]
pub struct ReportWriter {
    buf: Option<String>,
}

impl ReportWriter {
    pub fn new(quiet: bool) -> Self {
        Self {
            buf: (!quiet).then(String::new),
        }
    }

    pub fn quiet() -> Self {
        Self::new(true)
    }

    pub fn is_quiet(&self) -> bool {
        self.buf.is_none()
    }

    fn line(&mut self, tabs: usize, args: fmt::Arguments<'_>) {
        if let Some(buf) = &mut self.buf {
            for _ in 0..tabs {
                buf.push('\t');
            }
            // Writing into a `String` cannot fail.
            let _ = buf.write_fmt(args);
            buf.push('\n');
        }
    }

    pub fn write_newline(&mut self) {
        if let Some(buf) = &mut self.buf {
            buf.push('\n');
        }
    }

    pub fn write_normal(&mut self, text: impl fmt::Display, tabs: usize) {
        self.line(tabs, format_args!("{text}"));
    }

    pub fn write_named_normal(&mut self, name: &str, value: impl fmt::Display, tabs: usize) {
        self.line(tabs, format_args!("{name}: {value}"));
    }

    pub fn write_named_hex(&mut self, name: &str, value: impl fmt::UpperHex, tabs: usize) {
        self.line(tabs, format_args!("{name}: {value:#X}"));
    }

    /// Append another report, e.g. a nested image scanned as part of a
    /// process dump.
    pub fn append(&mut self, text: &str) {
        if let Some(buf) = &mut self.buf {
            buf.push_str(text);
        }
    }

    pub fn as_str(&self) -> &str {
        self.buf.as_deref().unwrap_or_default()
    }

    pub fn into_string(self) -> String {
        self.buf.unwrap_or_default()
    }
}
