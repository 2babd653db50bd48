//! Process-wide registry of anomalies found while scanning.
//!
//! Walkers never talk to the registry directly. They collect [`Anomaly`]
//! values in their own scan context, and the orchestrator hands them over
//! with the image's path once the image is done. Attribution therefore
//! never depends on which thread did the work.

#![forbid(unsafe_code)]

mod error;
mod record;
mod report;
mod tier;

pub use error::Error;
pub use record::{Anomaly, AnomalyRecord};
pub use tier::{Tier, TierFilter};

use parking_lot::Mutex;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};
use tracing::{debug, info};

#[derive(Debug)]
enum Mode {
    /// Keep everything and write it once at the end, to the file if one is
    /// set or to the caller's stdout otherwise.
    Batched { file: Option<PathBuf> },
    /// Append each file's records to the sink as soon as they are known.
    Streaming { sink: Mutex<BufWriter<File>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub records: usize,
    pub files: usize,
}

#[derive(Debug)]
pub struct Diagnostics {
    enabled: bool,
    filter: TierFilter,
    mode: Mode,
    records: Mutex<Vec<AnomalyRecord>>,
}

impl Diagnostics {
    /// Build the registry from the warnings section of the run config. A
    /// streaming sink is opened right away so that a bad path fails the run
    /// before any scanning starts.
    pub fn new(config: &config::Warnings) -> Result<Self, Error> {
        let mode = match (config.dynamic, &config.file) {
            (true, None) => return Err(config::Error::StreamingWithoutSink.into()),
            (true, Some(path)) if config.enabled => {
                let file = File::create(path).map_err(|source| Error::OpenSink {
                    path: path.clone(),
                    source,
                })?;
                Mode::Streaming {
                    sink: Mutex::new(BufWriter::new(file)),
                }
            }
            (_, file) => Mode::Batched { file: file.clone() },
        };

        Ok(Self {
            enabled: config.enabled,
            filter: config.warned_type.into(),
            mode,
            records: Mutex::new(Vec::new()),
        })
    }

    /// A registry that drops everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            filter: TierFilter::empty(),
            mode: Mode::Batched { file: None },
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn filter(&self) -> TierFilter {
        self.filter
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming { .. })
    }

    /// Whether an anomaly of `tier` would be recorded at all. Walkers check
    /// this when the anomaly is created, so filtered tiers never exist.
    pub fn accepts(&self, tier: Tier) -> bool {
        self.enabled && self.filter.accepts(tier)
    }

    /// Attribute `anomalies` to `path` and append them. Returns how many
    /// were recorded.
    pub fn record(
        &self,
        path: &str,
        anomalies: impl IntoIterator<Item = Anomaly>,
    ) -> Result<usize, Error> {
        let records: Vec<AnomalyRecord> = anomalies
            .into_iter()
            .filter(|anomaly| self.accepts(anomaly.tier))
            .map(|anomaly| AnomalyRecord::attribute(path, anomaly))
            .collect();
        if records.is_empty() {
            return Ok(0);
        }

        debug!(%path, count = records.len(), "recording anomalies");
        if let Mode::Streaming { sink } = &self.mode {
            let mut sink = sink.lock();
            report::write_records(&mut *sink, &records)?;
            sink.flush()?;
        }

        let count = records.len();
        self.records.lock().extend(records);
        Ok(count)
    }

    /// Copy of every record in discovery order.
    pub fn records(&self) -> Vec<AnomalyRecord> {
        self.records.lock().clone()
    }

    /// Distinct paths that produced at least one record, in discovery order.
    pub fn warned_files(&self) -> Vec<String> {
        let records = self.records.lock();
        let mut files: Vec<String> = Vec::new();
        for record in records.iter() {
            if !files.contains(&record.path) {
                files.push(record.path.clone());
            }
        }
        files
    }

    /// Emit the end-of-run report and empty the registry. In batched mode
    /// the report goes to the configured file, or to `stdout` when there is
    /// none. In streaming mode everything is already on disk, so this only
    /// flushes.
    pub fn finish(&self, stdout: &mut dyn Write) -> Result<Summary, Error> {
        let records = std::mem::take(&mut *self.records.lock());
        let summary = Summary {
            records: records.len(),
            files: {
                let mut paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
                paths.sort_unstable();
                paths.dedup();
                paths.len()
            },
        };
        if !self.enabled {
            return Ok(summary);
        }

        match &self.mode {
            Mode::Batched { file: Some(path) } => {
                let file = File::create(path).map_err(|source| Error::OpenSink {
                    path: path.clone(),
                    source,
                })?;
                let mut out = BufWriter::new(file);
                report::write_report(&mut out, &records)?;
                out.flush()?;
            }
            Mode::Batched { file: None } => {
                report::write_report(stdout, &records)?;
                stdout.flush()?;
            }
            Mode::Streaming { sink } => {
                sink.lock().flush()?;
            }
        }

        info!(records = summary.records, files = summary.files, "warned report written");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{WarnedType, Warnings};
    use pretty_assertions::assert_eq;

    fn enabled(warned_type: WarnedType) -> Diagnostics {
        Diagnostics::new(&Warnings {
            enabled: true,
            warned_type,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn disabled_registry_accepts_nothing() {
        let diagnostics = Diagnostics::disabled();
        assert!(!diagnostics.accepts(Tier::Suspicious));
        let recorded = diagnostics
            .record("a.dll", [Anomaly::new(Tier::Suspicious, "x")])
            .unwrap();
        assert_eq!(recorded, 0);
        assert!(diagnostics.records().is_empty());
    }

    #[test]
    fn filter_drops_unselected_tiers() {
        let diagnostics = enabled(WarnedType::Suspicious);
        diagnostics
            .record(
                "a.dll",
                [
                    Anomaly::new(Tier::Unsupported, "unsupported thing"),
                    Anomaly::new(Tier::Suspicious, "suspicious thing"),
                ],
            )
            .unwrap();

        assert_eq!(
            diagnostics.records(),
            vec![AnomalyRecord {
                path: "a.dll".into(),
                tier: Tier::Suspicious,
                detail: "suspicious thing".into(),
            }]
        );
    }

    #[test]
    fn batched_report_groups_by_path_in_discovery_order() {
        let diagnostics = enabled(WarnedType::All);
        diagnostics.record("b.dll", [Anomaly::new(Tier::Suspicious, "one")]).unwrap();
        diagnostics.record("a.dll", [Anomaly::new(Tier::Unsupported, "two")]).unwrap();
        diagnostics.record("b.dll", [Anomaly::new(Tier::Unsupported, "three")]).unwrap();

        assert_eq!(diagnostics.warned_files(), vec!["b.dll", "a.dll"]);

        let mut out = Vec::new();
        let summary = diagnostics.finish(&mut out).unwrap();
        assert_eq!(summary, Summary { records: 3, files: 2 });
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nWarned files:\n\
             \nPath: b.dll\n\tSuspicious: one\n\tUnsupported: three\n\
             \nPath: a.dll\n\tUnsupported: two\n"
        );
        assert!(diagnostics.records().is_empty());
    }

    #[test]
    fn streaming_requires_a_file() {
        let err = Diagnostics::new(&Warnings {
            enabled: true,
            dynamic: true,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(config::Error::StreamingWithoutSink)));
    }
}
