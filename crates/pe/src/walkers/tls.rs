#![forbid(unsafe_code)]

use crate::{
    Error, PeFile, ScanContext,
    layout::{DirectoryEntry, TlsDirectory32, TlsDirectory64},
};
use diagnostics::Tier;
use tracing::debug;

const MAX_CALLBACKS: usize = 0x1000;

struct Tls {
    start_address_of_raw_data: u64,
    end_address_of_raw_data: u64,
    address_of_index: u64,
    address_of_callbacks: u64,
    size_of_zero_fill: u32,
    characteristics: u32,
}

fn read_directory(pe: &PeFile<'_>, rva: u32) -> Result<Tls, Error> {
    Ok(if pe.is_64() {
        let d: TlsDirectory64 = pe.read_rva(rva)?;
        Tls {
            start_address_of_raw_data: d.start_address_of_raw_data,
            end_address_of_raw_data: d.end_address_of_raw_data,
            address_of_index: d.address_of_index,
            address_of_callbacks: d.address_of_callbacks,
            size_of_zero_fill: d.size_of_zero_fill,
            characteristics: d.characteristics,
        }
    } else {
        let d: TlsDirectory32 = pe.read_rva(rva)?;
        Tls {
            start_address_of_raw_data: d.start_address_of_raw_data.into(),
            end_address_of_raw_data: d.end_address_of_raw_data.into(),
            address_of_index: d.address_of_index.into(),
            address_of_callbacks: d.address_of_callbacks.into(),
            size_of_zero_fill: d.size_of_zero_fill,
            characteristics: d.characteristics,
        }
    })
}

pub fn dump(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<(), Error> {
    let Some(dir) = pe.directory(DirectoryEntry::Tls) else {
        return Ok(());
    };

    ctx.out().write_newline();
    ctx.out().write_normal("TLS:", 1);
    ctx.out().write_newline();

    let tls = match read_directory(pe, dir.virtual_address) {
        Ok(tls) => tls,
        Err(err) => {
            debug!(%err, rva = dir.virtual_address, "unreadable TLS directory");
            ctx.warning(Tier::Unsupported, "TLS directory is outside the image.", 2);
            return Ok(());
        }
    };

    let out = ctx.out();
    out.write_named_hex("StartAddressOfRawData", tls.start_address_of_raw_data, 2);
    out.write_named_hex("EndAddressOfRawData", tls.end_address_of_raw_data, 2);
    out.write_named_hex("AddressOfIndex", tls.address_of_index, 2);
    out.write_named_hex("AddressOfCallBacks", tls.address_of_callbacks, 2);
    out.write_named_hex("SizeOfZeroFill", tls.size_of_zero_fill, 2);
    out.write_named_hex("Characteristics", tls.characteristics, 2);

    if tls.address_of_callbacks == 0 {
        return Ok(());
    }
    let Some(mut rva) = pe.va_to_rva(tls.address_of_callbacks) else {
        ctx.warning(Tier::Unsupported, "TLS callbacks are outside the image.", 2);
        return Ok(());
    };

    ctx.out().write_newline();
    ctx.out().write_normal("Callbacks:", 2);
    let step = pe.pointer_size() as u32;
    for count in 0.. {
        if count == MAX_CALLBACKS {
            ctx.warning(
                Tier::Suspicious,
                "Detected suspiciously large number of TLS callbacks. Stopping.",
                3,
            );
            break;
        }
        let callback = match pe.read_pointer_rva(rva) {
            Ok(callback) => callback,
            Err(err) => {
                debug!(%err, rva, "unreadable TLS callback entry");
                ctx.warning(Tier::Unsupported, "TLS callback list is not terminated.", 3);
                break;
            }
        };
        if callback == 0 {
            break;
        }
        ctx.out().write_named_hex("Callback", callback, 3);
        rva = rva.wrapping_add(step);
    }
    Ok(())
}
