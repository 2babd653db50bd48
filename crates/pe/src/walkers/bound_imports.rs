#![forbid(unsafe_code)]

use crate::{
    Error, PeFile, ScanContext,
    layout::{BoundForwarderRef, BoundImportDescriptor, DirectoryEntry},
    sanitize::{MAX_NAME_LENGTH, write_sanitized},
};
use diagnostics::Tier;
use tracing::debug;

const MAX_DESCRIPTORS: usize = 0x1000;
const ENTRY_SIZE: u32 = 8;

/// Dump the bound import directory. `has_new_bound_imports` comes from the
/// import walker: new-style stamps without this directory, or this directory
/// without new-style stamps, are both inconsistent.
pub fn dump(
    pe: &PeFile<'_>,
    ctx: &mut ScanContext<'_>,
    has_new_bound_imports: bool,
) -> Result<(), Error> {
    let Some(dir) = pe.directory(DirectoryEntry::BoundImport) else {
        if has_new_bound_imports {
            ctx.out().write_newline();
            ctx.warning(
                Tier::Unsupported,
                "Seemingly new-style bound imports but no bound import directory.",
                1,
            );
        }
        return Ok(());
    };

    ctx.out().write_newline();
    ctx.out().write_normal("Bound Import Dir:", 1);
    if !has_new_bound_imports {
        ctx.warning(
            Tier::Unsupported,
            "Bound import directory present but no new-style bound imports.",
            2,
        );
    }

    let start = dir.virtual_address;
    let mut rva = start;
    for count in 0.. {
        if count == MAX_DESCRIPTORS {
            ctx.warning(
                Tier::Suspicious,
                "Detected suspiciously large number of bound import descriptors. Stopping.",
                2,
            );
            break;
        }
        let Ok(desc) = pe.read_rva::<BoundImportDescriptor>(rva) else {
            ctx.warning(Tier::Unsupported, "Bound import directory is not terminated.", 2);
            break;
        };
        if desc.time_date_stamp == 0 && desc.offset_module_name == 0 {
            break;
        }
        rva = rva.wrapping_add(ENTRY_SIZE);

        let out = ctx.out();
        out.write_newline();
        out.write_named_hex("TimeDateStamp", desc.time_date_stamp, 2);
        out.write_named_hex("OffsetModuleName", desc.offset_module_name, 2);
        dump_name(pe, ctx, start, desc.offset_module_name, 2);
        ctx.out().write_named_hex(
            "NumberOfModuleForwarderRefs",
            desc.number_of_module_forwarder_refs,
            2,
        );

        for _ in 0..desc.number_of_module_forwarder_refs {
            let Ok(forwarder) = pe.read_rva::<BoundForwarderRef>(rva) else {
                ctx.warning(Tier::Unsupported, "Bound import forwarder is outside the image.", 3);
                return Ok(());
            };
            rva = rva.wrapping_add(ENTRY_SIZE);

            let out = ctx.out();
            out.write_newline();
            out.write_named_hex("TimeDateStamp", forwarder.time_date_stamp, 3);
            out.write_named_hex("OffsetModuleName", forwarder.offset_module_name, 3);
            dump_name(pe, ctx, start, forwarder.offset_module_name, 3);
            ctx.out().write_named_hex("Reserved", forwarder.reserved, 3);
        }
    }
    Ok(())
}

fn dump_name(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>, start: u32, offset: u16, tabs: usize) {
    match pe.read_cstr_rva(start.wrapping_add(offset.into()), MAX_NAME_LENGTH) {
        Ok(name) => {
            write_sanitized(
                ctx,
                "ModuleName",
                "bound module name",
                tabs,
                Tier::Suspicious,
                &name,
            );
        }
        Err(err) => {
            debug!(%err, offset, "unreadable bound module name");
            ctx.warning(Tier::Unsupported, "Bound module name is outside the image.", tabs);
        }
    }
}
