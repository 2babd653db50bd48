#![forbid(unsafe_code)]

use crate::{Error, ImageKind, PeFile, ScanContext};

/// Offset where the data mapped by the loader ends. Anything after it in a
/// file is overlay.
pub fn overlay_offset(pe: &PeFile<'_>) -> u64 {
    pe.sections()
        .iter()
        .filter(|s| s.size_of_raw_data != 0)
        .map(|s| u64::from(s.pointer_to_raw_data) + u64::from(s.size_of_raw_data))
        .fold(u64::from(pe.optional_header().size_of_headers), u64::max)
}

pub fn dump(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<(), Error> {
    // Images in memory have no overlay.
    if pe.kind() != ImageKind::Data {
        return Ok(());
    }

    let offset = overlay_offset(pe);
    let len = pe.len() as u64;
    if offset >= len {
        return Ok(());
    }

    let out = ctx.out();
    out.write_newline();
    out.write_normal("Overlay:", 1);
    out.write_newline();
    out.write_named_hex("Offset", offset, 2);
    out.write_named_hex("Size", len - offset, 2);
    Ok(())
}
