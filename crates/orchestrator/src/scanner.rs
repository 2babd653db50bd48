//! Runs the structure walkers over one image and attributes what they
//! found to its path.

#![forbid(unsafe_code)]

use crate::Error;
use diagnostics::{Diagnostics, Tier};
use humansize::{BINARY, format_size};
use pe::{ImageKind, ImageSource, PeFile, ScanContext, walkers};
use tracing::{debug, info, info_span};

/// Images above this size are flagged for performance triage.
pub const OVERSIZE_THRESHOLD: usize = 100 * 1024 * 1024;

pub const NOT_VALID: &str = "Not a valid PE file or architecture.";

pub fn is_oversized(size: usize) -> bool {
    size > OVERSIZE_THRESHOLD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Complete,
    /// Headers did not validate, or a walker could not locate its
    /// structure. The rest of the image was skipped.
    NotValid,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub path: String,
    pub status: ScanStatus,
    pub is_64: Option<bool>,
    pub oversized: bool,
    /// Report text, empty when quiet.
    pub report: String,
    /// Anomalies recorded for this image.
    pub anomalies: usize,
}

pub struct PeScanner<'a> {
    options: &'a config::Scan,
    diagnostics: &'a Diagnostics,
}

impl<'a> PeScanner<'a> {
    pub fn new(options: &'a config::Scan, diagnostics: &'a Diagnostics) -> Self {
        Self {
            options,
            diagnostics,
        }
    }

    pub fn scan(
        &self,
        source: &dyn ImageSource,
        kind: ImageKind,
        path: &str,
    ) -> Result<ScanOutcome, Error> {
        let _span = info_span!("pe_scan", %path).entered();
        let mut ctx = ScanContext::new(path, self.options, self.diagnostics);
        let oversized = is_oversized(source.len());

        let (status, is_64) = match PeFile::parse(source, kind) {
            Ok(pe) => {
                let is_64 = pe.is_64();
                ctx.out().write_newline();
                ctx.out()
                    .write_named_normal("64-Bit File", if is_64 { "Yes" } else { "No" }, 1);

                if oversized {
                    info!(size = %format_size(source.len(), BINARY), "large image");
                    ctx.out().write_newline();
                    ctx.out().write_normal("WARNING! File is over 100MB.", 0);
                }

                match self.walk(&pe, &mut ctx) {
                    Ok(()) => (ScanStatus::Complete, Some(is_64)),
                    Err(err) => {
                        debug!(%err, "walker failed");
                        not_valid(&mut ctx);
                        (ScanStatus::NotValid, Some(is_64))
                    }
                }
            }
            Err(err) => {
                debug!(%err, "headers did not validate");
                not_valid(&mut ctx);
                (ScanStatus::NotValid, None)
            }
        };

        let (report, anomalies) = ctx.finish();
        let anomalies = self.diagnostics.record(path, anomalies)?;
        Ok(ScanOutcome {
            path: path.to_owned(),
            status,
            is_64,
            oversized,
            report,
            anomalies,
        })
    }

    /// The walker order matters: the bound import walker consumes what the
    /// import walker found.
    fn walk(&self, pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<(), pe::Error> {
        walkers::headers::dump(pe, ctx)?;
        walkers::sections::dump(pe, ctx)?;
        walkers::overlay::dump(pe, ctx)?;
        walkers::tls::dump(pe, ctx)?;
        walkers::exports::dump(pe, ctx)?;
        let has_new_bound_imports = walkers::imports::dump(pe, ctx)?;
        walkers::bound_imports::dump(pe, ctx, has_new_bound_imports)?;
        walkers::relocations::dump(pe, ctx)?;
        if self.options.dump_strings() {
            walkers::strings::dump(pe, ctx)?;
        }
        Ok(())
    }
}

fn not_valid(ctx: &mut ScanContext<'_>) {
    ctx.out().write_newline();
    ctx.warning(Tier::Unsupported, NOT_VALID, 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{WarnedType, Warnings};
    use pe::testing::PeBuilder;

    fn diagnostics() -> Diagnostics {
        Diagnostics::new(&Warnings {
            enabled: true,
            warned_type: WarnedType::All,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn oversize_boundary() {
        assert!(!is_oversized(OVERSIZE_THRESHOLD));
        assert!(is_oversized(OVERSIZE_THRESHOLD + 1));
    }

    #[test]
    fn valid_image_runs_every_walker() {
        let diagnostics = diagnostics();
        let options = config::Scan::default();
        let bytes = PeBuilder::new(true)
            .section(".text", vec![0xC3; 4])
            .exports("lib.dll", &["Run"])
            .import("kernel32.dll", &["ExitProcess"])
            .relocation_block(0x400, &[0xA000])
            .build();

        let outcome = PeScanner::new(&options, &diagnostics)
            .scan(&bytes, ImageKind::Data, "lib.dll")
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Complete);
        assert_eq!(outcome.is_64, Some(true));
        assert_eq!(outcome.anomalies, 0);
        for heading in [
            "DOS Header:",
            "Sections:",
            "Export Dir:",
            "Import Dirs:",
            "Relocation Blocks:",
        ] {
            assert!(outcome.report.contains(heading), "missing {heading}");
        }
        assert!(!outcome.report.contains("Strings:"));
    }

    #[test]
    fn invalid_image_is_recorded_as_unsupported() {
        let diagnostics = diagnostics();
        let options = config::Scan::default();
        let bytes = b"MZ not really".to_vec();

        let outcome = PeScanner::new(&options, &diagnostics)
            .scan(&bytes, ImageKind::Data, "junk.bin")
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::NotValid);
        assert!(outcome.report.contains("WARNING! Not a valid PE file or architecture."));

        let records = diagnostics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "junk.bin");
        assert_eq!(records[0].tier, Tier::Unsupported);
    }

    #[test]
    fn strings_are_skipped_when_quiet() {
        let diagnostics = diagnostics();
        let bytes = PeBuilder::new(false).section(".rdata", b"some text".to_vec()).build();

        let loud = config::Scan { strings: true, ..Default::default() };
        let outcome = PeScanner::new(&loud, &diagnostics)
            .scan(&bytes, ImageKind::Data, "a.dll")
            .unwrap();
        assert!(outcome.report.contains("Strings:"));

        let quiet = config::Scan { strings: true, quiet: true, ..Default::default() };
        let outcome = PeScanner::new(&quiet, &diagnostics)
            .scan(&bytes, ImageKind::Data, "a.dll")
            .unwrap();
        assert_eq!(outcome.report, "");
    }
}
