#![forbid(unsafe_code)]

use crate::{Error, ImageKind, PeFile, ScanContext, sanitize::write_sanitized};
use diagnostics::Tier;

pub fn dump(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<(), Error> {
    ctx.out().write_newline();
    if pe.sections().is_empty() {
        ctx.warning(Tier::Suspicious, "No sections.", 1);
        return Ok(());
    }

    ctx.out().write_normal("Sections:", 1);
    for section in pe.sections() {
        ctx.out().write_newline();
        write_sanitized(
            ctx,
            "Name",
            "section name",
            2,
            Tier::Suspicious,
            section.raw_name(),
        );

        let out = ctx.out();
        out.write_named_hex("VirtualAddress", section.virtual_address, 2);
        out.write_named_hex("VirtualSize", section.virtual_size, 2);
        out.write_named_hex("PointerToRawData", section.pointer_to_raw_data, 2);
        out.write_named_hex("SizeOfRawData", section.size_of_raw_data, 2);
        out.write_named_hex("PointerToRelocations", section.pointer_to_relocations, 2);
        out.write_named_hex("PointerToLinenumbers", section.pointer_to_linenumbers, 2);
        out.write_named_hex("NumberOfRelocations", section.number_of_relocations, 2);
        out.write_named_hex("NumberOfLinenumbers", section.number_of_linenumbers, 2);
        out.write_named_hex("Characteristics", section.characteristics, 2);

        let raw_end = u64::from(section.pointer_to_raw_data) + u64::from(section.size_of_raw_data);
        if pe.kind() == ImageKind::Data && raw_end > pe.len() as u64 {
            ctx.warning(
                Tier::Unsupported,
                "Section raw data extends past the end of the file.",
                2,
            );
        }
    }
    Ok(())
}
