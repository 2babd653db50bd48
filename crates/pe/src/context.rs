#![forbid(unsafe_code)]

use crate::report::ReportWriter;
use diagnostics::{Anomaly, Diagnostics, Tier};

/// Everything one image scan needs, passed explicitly to every walker.
///
/// Anomalies are collected here and only attributed to `path` when the
/// orchestrator finalizes the scan, so concurrent scans cannot mix up their
/// warnings.
pub struct ScanContext<'a> {
    path: &'a str,
    options: &'a config::Scan,
    diagnostics: &'a Diagnostics,
    out: ReportWriter,
    anomalies: Vec<Anomaly>,
}

impl<'a> ScanContext<'a> {
    pub fn new(path: &'a str, options: &'a config::Scan, diagnostics: &'a Diagnostics) -> Self {
        Self {
            path,
            options,
            diagnostics,
            out: ReportWriter::new(options.quiet),
            anomalies: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        self.path
    }

    pub fn options(&self) -> &config::Scan {
        self.options
    }

    pub fn out(&mut self) -> &mut ReportWriter {
        &mut self.out
    }

    /// Raise an anomaly for the image being scanned. Tiers the registry
    /// does not record are dropped here.
    pub fn warn(&mut self, tier: Tier, detail: impl Into<String>) {
        if self.diagnostics.accepts(tier) {
            self.anomalies.push(Anomaly::new(tier, detail));
        }
    }

    /// Print a `WARNING!` line and raise the matching anomaly.
    pub fn warning(&mut self, tier: Tier, detail: &str, tabs: usize) {
        self.out.write_normal(format_args!("WARNING! {detail}"), tabs);
        self.warn(tier, detail);
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn finish(self) -> (String, Vec<Anomaly>) {
        (self.out.into_string(), self.anomalies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{WarnedType, Warnings};

    #[test]
    fn filtered_tiers_never_materialize() {
        let diagnostics = Diagnostics::new(&Warnings {
            enabled: true,
            warned_type: WarnedType::Suspicious,
            ..Default::default()
        })
        .unwrap();
        let options = config::Scan::default();
        let mut ctx = ScanContext::new("a.dll", &options, &diagnostics);

        ctx.warning(Tier::Unsupported, "Unknown relocation type.", 1);
        ctx.warning(Tier::Suspicious, "Detected unprintable section name. Truncating.", 1);

        assert_eq!(ctx.anomalies().len(), 1);
        let (report, anomalies) = ctx.finish();
        assert!(report.contains("\tWARNING! Unknown relocation type.\n"));
        assert_eq!(anomalies[0].tier, Tier::Suspicious);
    }
}
