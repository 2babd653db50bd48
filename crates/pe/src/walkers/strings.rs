#![forbid(unsafe_code)]

use crate::{
    Error, PeFile, ScanContext,
    sanitize::{MAX_NAME_LENGTH, is_printable},
};

/// Shortest run of printable bytes reported as a string.
pub const MIN_STRING_LENGTH: usize = 5;

const CHUNK: usize = 0x10000;

/// Printable ASCII runs of at least [`MIN_STRING_LENGTH`] bytes, with their
/// offsets. Runs longer than [`MAX_NAME_LENGTH`] are cut into pieces.
pub fn find_strings(bytes: &[u8], base: usize) -> Vec<(usize, String)> {
    let mut found = Vec::new();
    let mut scanner = Scanner::default();
    scanner.feed(bytes, base, &mut found);
    scanner.flush(&mut found);
    found
}

#[derive(Default)]
struct Scanner {
    start: usize,
    run: Vec<u8>,
}

impl Scanner {
    fn feed(&mut self, bytes: &[u8], base: usize, found: &mut Vec<(usize, String)>) {
        for (i, &byte) in bytes.iter().enumerate() {
            if is_printable(byte) {
                if self.run.is_empty() {
                    self.start = base + i;
                }
                self.run.push(byte);
                if self.run.len() == MAX_NAME_LENGTH {
                    self.flush(found);
                }
            } else {
                self.flush(found);
            }
        }
    }

    fn flush(&mut self, found: &mut Vec<(usize, String)>) {
        if self.run.len() >= MIN_STRING_LENGTH {
            found.push((self.start, self.run.iter().map(|&b| char::from(b)).collect()));
        }
        self.run.clear();
    }

    /// Unreadable ranges end any run in progress.
    fn gap(&mut self, found: &mut Vec<(usize, String)>) {
        self.flush(found);
    }
}

pub fn dump(pe: &PeFile<'_>, ctx: &mut ScanContext<'_>) -> Result<(), Error> {
    ctx.out().write_newline();
    ctx.out().write_normal("Strings:", 1);

    let mut found = Vec::new();
    let mut scanner = Scanner::default();
    let mut buf = vec![0u8; CHUNK];
    let mut offset = 0;
    while offset < pe.len() {
        let len = CHUNK.min(pe.len() - offset);
        match pe.read_into(offset, &mut buf[..len]) {
            Ok(()) => scanner.feed(&buf[..len], offset, &mut found),
            // Pages of a live image can be unreadable; skip them.
            Err(_) => scanner.gap(&mut found),
        }
        offset += len;
    }
    scanner.flush(&mut found);

    let out = ctx.out();
    for (offset, value) in found {
        out.write_named_normal(&format!("{offset:#X}"), value, 2);
    }
    Ok(())
}
