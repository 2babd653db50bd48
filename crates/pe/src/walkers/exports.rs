#![forbid(unsafe_code)]

use crate::{
    Error, PeFile, ScanContext,
    layout::{DirectoryEntry, ExportDirectory},
    sanitize::{MAX_NAME_LENGTH, write_sanitized},
};
use diagnostics::Tier;
use tracing::debug;

const MAX_EXPORTS: u32 = 0x10000;

pub fn dump(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<(), Error> {
    let Some(dir) = pe.directory(DirectoryEntry::Export) else {
        return Ok(());
    };

    ctx.out().write_newline();
    ctx.out().write_normal("Export Dir:", 1);
    ctx.out().write_newline();

    let exports = match pe.read_rva::<ExportDirectory>(dir.virtual_address) {
        Ok(exports) => exports,
        Err(err) => {
            debug!(%err, rva = dir.virtual_address, "unreadable export directory");
            ctx.warning(Tier::Unsupported, "Export directory is outside the image.", 2);
            return Ok(());
        }
    };

    let out = ctx.out();
    out.write_named_hex("Characteristics", exports.characteristics, 2);
    out.write_named_hex("TimeDateStamp", exports.time_date_stamp, 2);
    out.write_named_hex("MajorVersion", exports.major_version, 2);
    out.write_named_hex("MinorVersion", exports.minor_version, 2);
    out.write_named_hex("Name (Raw)", exports.name, 2);
    match pe.read_cstr_rva(exports.name, MAX_NAME_LENGTH) {
        Ok(name) => {
            write_sanitized(ctx, "Name", "export module name", 2, Tier::Suspicious, &name);
        }
        Err(err) => {
            debug!(%err, rva = exports.name, "unreadable export module name");
            ctx.warning(Tier::Unsupported, "Export module name is outside the image.", 2);
        }
    }
    let out = ctx.out();
    out.write_named_hex("OrdinalBase", exports.base, 2);
    out.write_named_hex("NumberOfFunctions", exports.number_of_functions, 2);
    out.write_named_hex("NumberOfNames", exports.number_of_names, 2);
    out.write_named_hex("AddressOfFunctions", exports.address_of_functions, 2);
    out.write_named_hex("AddressOfNames", exports.address_of_names, 2);
    out.write_named_hex("AddressOfNameOrdinals", exports.address_of_name_ordinals, 2);

    if exports.number_of_functions > MAX_EXPORTS || exports.number_of_names > MAX_EXPORTS {
        ctx.warning(
            Tier::Suspicious,
            "Detected suspiciously large number of exports. Skipping.",
            2,
        );
        return Ok(());
    }

    let names = name_table(pe, ctx, &exports);

    ctx.out().write_newline();
    ctx.out().write_normal("Exports:", 1);
    for index in 0..exports.number_of_functions {
        let entry = exports.address_of_functions.wrapping_add(index * 4);
        let function = match pe.read_rva::<u32>(entry) {
            Ok(function) => function,
            Err(err) => {
                debug!(%err, rva = entry, "unreadable export address entry");
                ctx.warning(Tier::Unsupported, "Export address table is outside the image.", 2);
                break;
            }
        };
        if function == 0 {
            continue;
        }

        ctx.out().write_newline();
        ctx.out().write_named_hex("ProcedureNumber", index, 2);
        ctx.out().write_named_hex("Ordinal", exports.base.wrapping_add(index), 2);

        if let Some(name_rva) = names[index as usize] {
            match pe.read_cstr_rva(name_rva, MAX_NAME_LENGTH) {
                Ok(name) => {
                    write_sanitized(ctx, "Name", "export name", 2, Tier::Suspicious, &name);
                }
                Err(err) => {
                    debug!(%err, rva = name_rva, "unreadable export name");
                    ctx.warning(Tier::Unsupported, "Export name is outside the image.", 2);
                }
            }
        } else {
            ctx.out().write_named_normal("ByName", "No", 2);
        }

        if dir.contains(function) {
            ctx.out().write_named_normal("Forwarded", "Yes", 2);
            match pe.read_cstr_rva(function, MAX_NAME_LENGTH) {
                Ok(forwarder) => {
                    write_sanitized(
                        ctx,
                        "Forwarder",
                        "export forwarder",
                        2,
                        Tier::Suspicious,
                        &forwarder,
                    );
                }
                Err(err) => {
                    debug!(%err, rva = function, "unreadable export forwarder");
                    ctx.warning(Tier::Unsupported, "Export forwarder is outside the image.", 2);
                }
            }
        } else {
            ctx.out().write_named_normal("Forwarded", "No", 2);
            ctx.out().write_named_hex("RVA", function, 2);
        }
    }
    Ok(())
}

/// Name RVA for each function index. The first name pointing at an index
/// wins.
fn name_table(
    pe: &PeFile<'_>,
    ctx: &mut ScanContext<'_>,
    exports: &ExportDirectory,
) -> Vec<Option<u32>> {
    let mut names = vec![None; exports.number_of_functions as usize];
    for i in 0..exports.number_of_names {
        let name_rva = pe.read_rva::<u32>(exports.address_of_names.wrapping_add(i * 4));
        let ordinal = pe.read_rva::<u16>(exports.address_of_name_ordinals.wrapping_add(i * 2));
        match (name_rva, ordinal) {
            (Ok(name_rva), Ok(ordinal)) => {
                if let Some(slot) = names.get_mut(usize::from(ordinal)) {
                    slot.get_or_insert(name_rva);
                }
            }
            (Err(err), _) | (_, Err(err)) => {
                debug!(%err, index = i, "unreadable export name entry");
                ctx.warning(Tier::Unsupported, "Export name table is outside the image.", 2);
                break;
            }
        }
    }
    names
}
