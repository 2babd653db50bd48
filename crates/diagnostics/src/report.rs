#![forbid(unsafe_code)]

use crate::AnomalyRecord;
use std::io::{self, Write};

pub(crate) const HEADER: &str = "Warned files:";

/// Write the records of one file as an indented block. Consecutive records
/// with the same path share one `Path:` line.
pub(crate) fn write_records<W: Write + ?Sized>(
    out: &mut W,
    records: &[AnomalyRecord],
) -> io::Result<()> {
    let mut current: Option<&str> = None;
    for record in records {
        if current != Some(record.path.as_str()) {
            writeln!(out)?;
            writeln!(out, "Path: {}", record.path)?;
            current = Some(record.path.as_str());
        }
        writeln!(out, "\t{}: {}", record.tier, record.detail)?;
    }
    Ok(())
}

/// Full end-of-run report, grouped by path in order of first discovery.
pub(crate) fn write_report<W: Write + ?Sized>(
    out: &mut W,
    records: &[AnomalyRecord],
) -> io::Result<()> {
    let mut grouped: Vec<AnomalyRecord> = Vec::with_capacity(records.len());
    let mut order: Vec<&str> = Vec::new();
    for record in records {
        if !order.contains(&record.path.as_str()) {
            order.push(record.path.as_str());
        }
    }
    for path in order {
        grouped.extend(records.iter().filter(|r| r.path == path).cloned());
    }

    writeln!(out)?;
    writeln!(out, "{HEADER}")?;
    write_records(out, &grouped)
}
