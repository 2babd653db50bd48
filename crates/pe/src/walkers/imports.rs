#![forbid(unsafe_code)]

use crate::{
    Error, ImageKind, PeFile, ScanContext,
    layout::{DirectoryEntry, ImportDescriptor},
    sanitize::{MAX_NAME_LENGTH, write_sanitized},
};
use diagnostics::Tier;
use tracing::debug;

const MAX_DESCRIPTORS: usize = 0x1000;
const MAX_THUNKS: usize = 0x10000;
const DESCRIPTOR_SIZE: u32 = 20;

/// Dump the import directory. Returns whether any descriptor carries the
/// new-style bound stamp, which the bound import walker needs.
pub fn dump(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<bool, Error> {
    let mut has_new_bound_imports = false;
    let Some(dir) = pe.directory(DirectoryEntry::Import) else {
        return Ok(has_new_bound_imports);
    };

    ctx.out().write_newline();
    ctx.out().write_normal("Import Dirs:", 1);

    let mut rva = dir.virtual_address;
    for count in 0.. {
        if count == MAX_DESCRIPTORS {
            ctx.warning(
                Tier::Suspicious,
                "Detected suspiciously large number of import descriptors. Stopping.",
                2,
            );
            break;
        }
        let Ok(desc) = pe.read_rva::<ImportDescriptor>(rva) else {
            ctx.warning(Tier::Unsupported, "Import directory is not terminated.", 2);
            break;
        };
        if desc.is_terminator() {
            break;
        }
        rva = rva.wrapping_add(DESCRIPTOR_SIZE);

        let new_bound = desc.time_date_stamp == ImportDescriptor::NEW_BOUND_STAMP;
        has_new_bound_imports |= new_bound;

        let out = ctx.out();
        out.write_newline();
        out.write_named_hex("OriginalFirstThunk", desc.original_first_thunk, 2);
        out.write_named_hex("TimeDateStamp", desc.time_date_stamp, 2);
        if new_bound {
            out.write_named_normal("Bound", "Yes (New)", 2);
        } else if desc.time_date_stamp != 0 {
            out.write_named_normal("Bound", "Yes (Old)", 2);
        }
        out.write_named_hex("ForwarderChain", desc.forwarder_chain, 2);
        out.write_named_hex("Name (Raw)", desc.name, 2);
        match pe.read_cstr_rva(desc.name, MAX_NAME_LENGTH) {
            Ok(name) => {
                write_sanitized(ctx, "Name", "import module name", 2, Tier::Suspicious, &name);
            }
            Err(err) => {
                debug!(%err, rva = desc.name, "unreadable import module name");
                ctx.warning(Tier::Unsupported, "Import module name is outside the image.", 2);
            }
        }
        ctx.out().write_named_hex("FirstThunk", desc.first_thunk, 2);

        // A bound IAT in memory holds addresses, not names.
        let thunks = if desc.original_first_thunk != 0 {
            desc.original_first_thunk
        } else if pe.kind() == ImageKind::Image && desc.time_date_stamp != 0 {
            ctx.warning(
                Tier::Unsupported,
                "No INT for a bound module in a loaded image. Skipping thunks.",
                2,
            );
            continue;
        } else {
            desc.first_thunk
        };
        dump_thunks(pe, ctx, thunks)?;
    }
    Ok(has_new_bound_imports)
}

fn dump_thunks(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>, start: u32) -> Result<(), Error> {
    let ordinal_flag: u64 = if pe.is_64() { 1 << 63 } else { 1 << 31 };
    let step = pe.pointer_size() as u32;

    ctx.out().write_newline();
    ctx.out().write_normal("Import Thunks:", 2);
    let mut rva = start;
    for count in 0.. {
        if count == MAX_THUNKS {
            ctx.warning(
                Tier::Suspicious,
                "Detected suspiciously large number of import thunks. Stopping.",
                3,
            );
            break;
        }
        let Ok(thunk) = pe.read_pointer_rva(rva) else {
            ctx.warning(Tier::Unsupported, "Import thunk list is not terminated.", 3);
            break;
        };
        if thunk == 0 {
            break;
        }
        rva = rva.wrapping_add(step);

        ctx.out().write_newline();
        ctx.out().write_named_hex("AddressOfData", thunk, 3);
        if thunk & ordinal_flag != 0 {
            ctx.out().write_named_hex("Ordinal", thunk & 0xFFFF, 3);
            continue;
        }

        let by_name = (thunk & 0x7FFF_FFFF) as u32;
        match pe.read_rva::<u16>(by_name) {
            Ok(hint) => ctx.out().write_named_hex("Hint", hint, 3),
            Err(err) => {
                debug!(%err, rva = by_name, "unreadable import hint");
                ctx.warning(Tier::Unsupported, "Import name is outside the image.", 3);
                continue;
            }
        }
        match pe.read_cstr_rva(by_name.wrapping_add(2), MAX_NAME_LENGTH) {
            Ok(name) => {
                write_sanitized(ctx, "Name", "import name", 3, Tier::Suspicious, &name);
            }
            Err(err) => {
                debug!(%err, rva = by_name, "unreadable import name");
                ctx.warning(Tier::Unsupported, "Import name is outside the image.", 3);
            }
        }
    }
    Ok(())
}
