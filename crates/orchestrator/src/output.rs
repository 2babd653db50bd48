#![forbid(unsafe_code)]

use parking_lot::Mutex;
use std::io::{self, Write};
use tracing::warn;

/// Shared report sink. Each image's report is written in one call, so
/// reports from different workers never interleave.
pub struct Output {
    sink: Option<Mutex<Box<dyn Write + Send>>>,
}

impl Output {
    pub fn stdout() -> Self {
        Self::writer(io::stdout())
    }

    /// A sink that discards everything.
    pub fn quiet() -> Self {
        Self { sink: None }
    }

    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Mutex::new(Box::new(writer))),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.sink.is_none()
    }

    pub fn emit(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(sink) = &self.sink {
            let mut sink = sink.lock();
            if let Err(err) = sink.write_all(text.as_bytes()).and_then(|()| sink.flush()) {
                warn!(%err, "failed to write report");
            }
        }
    }
}
