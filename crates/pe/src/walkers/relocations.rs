#![forbid(unsafe_code)]

use crate::{
    Error, PeFile, ScanContext,
    layout::{BASE_RELOCATION_BLOCK_SIZE, BaseRelocationBlock, DirectoryEntry},
};
use diagnostics::Tier;

/// Base relocation types the loader applies on the supported architectures.
fn type_name(kind: u16) -> Option<&'static str> {
    Some(match kind {
        0 => "Absolute",
        1 => "High",
        2 => "Low",
        3 => "HighLow",
        4 => "HighAdj",
        10 => "Dir64",
        _ => return None,
    })
}

pub fn dump(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<(), Error> {
    let Some(dir) = pe.directory(DirectoryEntry::BaseReloc) else {
        return Ok(());
    };

    ctx.out().write_newline();
    ctx.out().write_normal("Relocation Blocks:", 1);

    let end = dir.virtual_address.saturating_add(dir.size);
    let mut rva = dir.virtual_address;
    while rva < end {
        let Ok(block) = pe.read_rva::<BaseRelocationBlock>(rva) else {
            ctx.warning(Tier::Unsupported, "Relocation block is outside the image.", 2);
            break;
        };
        let size = block.size_of_block as usize;
        if size < BASE_RELOCATION_BLOCK_SIZE
            || (size - BASE_RELOCATION_BLOCK_SIZE) % 2 != 0
            || u64::from(rva) + size as u64 > u64::from(end)
        {
            ctx.out().write_newline();
            ctx.warning(Tier::Unsupported, "Detected invalid relocation block size.", 2);
            break;
        }

        let out = ctx.out();
        out.write_newline();
        out.write_named_hex("VirtualAddress", block.virtual_address, 2);
        out.write_named_hex("SizeOfBlock", block.size_of_block, 2);
        out.write_normal("Relocations:", 2);

        let count = (size - BASE_RELOCATION_BLOCK_SIZE) / 2;
        let first = rva + BASE_RELOCATION_BLOCK_SIZE as u32;
        let mut unknown = false;
        for i in 0..count as u32 {
            let Ok(entry) = pe.read_rva::<u16>(first + i * 2) else {
                ctx.warning(Tier::Unsupported, "Relocation entry is outside the image.", 3);
                break;
            };
            let kind = entry >> 12;
            let offset = entry & 0x0FFF;

            let out = ctx.out();
            out.write_newline();
            out.write_named_hex("Type", kind, 3);
            match type_name(kind) {
                Some(name) => out.write_named_normal("Type (String)", name, 3),
                None => unknown = true,
            }
            out.write_named_hex("Offset", offset, 3);
        }
        if unknown {
            ctx.warning(Tier::Unsupported, "Detected unknown relocation type.", 2);
        }

        rva += block.size_of_block;
    }
    Ok(())
}
