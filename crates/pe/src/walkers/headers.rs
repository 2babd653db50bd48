#![forbid(unsafe_code)]

use crate::{Error, PeFile, ScanContext, layout::DIRECTORY_NAMES};
use chrono::DateTime;
use diagnostics::Tier;

/// Render a PE time stamp like `Wed Jan 02 02:03:55 1980` (UTC).
pub fn format_time_stamp(stamp: u32) -> String {
    match DateTime::from_timestamp(i64::from(stamp), 0) {
        Some(time) => time.format("%a %b %d %H:%M:%S %Y").to_string(),
        None => "Invalid".to_owned(),
    }
}

pub fn dump(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<(), Error> {
    dump_dos(pe, ctx);
    dump_file(pe, ctx);
    dump_optional(pe, ctx);
    dump_directories(pe, ctx);
    Ok(())
}

fn dump_dos(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) {
    let dos = *pe.dos_header();
    let out = ctx.out();
    out.write_newline();
    out.write_normal("DOS Header:", 1);
    out.write_newline();
    out.write_named_hex("Magic", dos.e_magic, 2);
    out.write_named_hex("BytesOnLastPage", dos.e_cblp, 2);
    out.write_named_hex("Pages", dos.e_cp, 2);
    out.write_named_hex("Relocations", dos.e_crlc, 2);
    out.write_named_hex("SizeOfHeaderInParagraphs", dos.e_cparhdr, 2);
    out.write_named_hex("MinExtraParagraphs", dos.e_minalloc, 2);
    out.write_named_hex("MaxExtraParagraphs", dos.e_maxalloc, 2);
    out.write_named_hex("InitialSS", dos.e_ss, 2);
    out.write_named_hex("InitialSP", dos.e_sp, 2);
    out.write_named_hex("Checksum", dos.e_csum, 2);
    out.write_named_hex("InitialIP", dos.e_ip, 2);
    out.write_named_hex("InitialCS", dos.e_cs, 2);
    out.write_named_hex("RelocTableFileAddr", dos.e_lfarlc, 2);
    out.write_named_hex("OverlayNum", dos.e_ovno, 2);
    out.write_named_hex("OEMID", dos.e_oemid, 2);
    out.write_named_hex("OEMInfo", dos.e_oeminfo, 2);
    out.write_named_hex("NewHeaderOffset", dos.e_lfanew, 2);
}

fn dump_file(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) {
    let file = *pe.file_header();
    let out = ctx.out();
    out.write_newline();
    out.write_normal("File Header:", 1);
    out.write_newline();
    out.write_named_hex("Machine", file.machine, 2);
    out.write_named_hex("NumberOfSections", file.number_of_sections, 2);
    out.write_named_hex("TimeDateStamp", file.time_date_stamp, 2);
    out.write_named_normal(
        "TimeDateStamp (String)",
        format_time_stamp(file.time_date_stamp),
        2,
    );
    out.write_named_hex("PointerToSymbolTable", file.pointer_to_symbol_table, 2);
    out.write_named_hex("NumberOfSymbols", file.number_of_symbols, 2);
    out.write_named_hex("SizeOfOptionalHeader", file.size_of_optional_header, 2);
    out.write_named_hex("Characteristics", file.characteristics, 2);
}

fn dump_optional(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) {
    let opt = pe.optional_header().clone();
    let out = ctx.out();
    out.write_newline();
    out.write_normal("Optional Header:", 1);
    out.write_newline();
    out.write_named_hex("Magic", opt.magic, 2);
    out.write_named_hex("MajorLinkerVersion", opt.major_linker_version, 2);
    out.write_named_hex("MinorLinkerVersion", opt.minor_linker_version, 2);
    out.write_named_hex("SizeOfCode", opt.size_of_code, 2);
    out.write_named_hex("SizeOfInitializedData", opt.size_of_initialized_data, 2);
    out.write_named_hex("SizeOfUninitializedData", opt.size_of_uninitialized_data, 2);
    out.write_named_hex("AddressOfEntryPoint", opt.address_of_entry_point, 2);
    out.write_named_hex("BaseOfCode", opt.base_of_code, 2);
    if let Some(base_of_data) = opt.base_of_data {
        out.write_named_hex("BaseOfData", base_of_data, 2);
    }
    out.write_named_hex("ImageBase", opt.image_base, 2);
    out.write_named_hex("SectionAlignment", opt.section_alignment, 2);
    out.write_named_hex("FileAlignment", opt.file_alignment, 2);
    out.write_named_hex("MajorOperatingSystemVersion", opt.major_operating_system_version, 2);
    out.write_named_hex("MinorOperatingSystemVersion", opt.minor_operating_system_version, 2);
    out.write_named_hex("MajorImageVersion", opt.major_image_version, 2);
    out.write_named_hex("MinorImageVersion", opt.minor_image_version, 2);
    out.write_named_hex("MajorSubsystemVersion", opt.major_subsystem_version, 2);
    out.write_named_hex("MinorSubsystemVersion", opt.minor_subsystem_version, 2);
    out.write_named_hex("Win32VersionValue", opt.win32_version_value, 2);
    out.write_named_hex("SizeOfImage", opt.size_of_image, 2);
    out.write_named_hex("SizeOfHeaders", opt.size_of_headers, 2);
    out.write_named_hex("CheckSum", opt.check_sum, 2);
    out.write_named_hex("Subsystem", opt.subsystem, 2);
    out.write_named_hex("DllCharacteristics", opt.dll_characteristics, 2);
    out.write_named_hex("SizeOfStackReserve", opt.size_of_stack_reserve, 2);
    out.write_named_hex("SizeOfStackCommit", opt.size_of_stack_commit, 2);
    out.write_named_hex("SizeOfHeapReserve", opt.size_of_heap_reserve, 2);
    out.write_named_hex("SizeOfHeapCommit", opt.size_of_heap_commit, 2);
    out.write_named_hex("LoaderFlags", opt.loader_flags, 2);
    out.write_named_hex("NumberOfRvaAndSizes", opt.number_of_rva_and_sizes, 2);
}

fn dump_directories(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) {
    let declared = pe.optional_header().number_of_rva_and_sizes as usize;
    if declared > DIRECTORY_NAMES.len() {
        ctx.out().write_newline();
        ctx.warning(
            Tier::Suspicious,
            "Detected unusually large number of data directories.",
            1,
        );
    }

    let directories = pe.directories().to_vec();
    let out = ctx.out();
    out.write_newline();
    out.write_normal("Data Directories:", 1);
    for (name, dir) in DIRECTORY_NAMES.iter().zip(&directories) {
        out.write_newline();
        out.write_named_normal("Name", name, 2);
        out.write_named_hex("VirtualAddress", dir.virtual_address, 2);
        out.write_named_hex("Size", dir.size, 2);
    }
}
