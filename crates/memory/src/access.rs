#![forbid(unsafe_code)]

use crate::{Error, guard::ProtectGuard, process::Process, protection::AccessIntent};

/// Read `buf.len()` bytes starting at `address`, guarding each region the
/// range touches.
pub fn read<P: Process + ?Sized>(process: &P, address: usize, buf: &mut [u8]) -> Result<(), Error> {
    for_each_chunk(process, address, buf.len(), AccessIntent::Read, |cursor, range| {
        process.read_raw(cursor, &mut buf[range])
    })
}

pub fn read_vec<P: Process + ?Sized>(
    process: &P,
    address: usize,
    len: usize,
) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; len];
    read(process, address, &mut buf)?;
    Ok(buf)
}

/// Write `data` starting at `address`, guarding each region the range
/// touches.
pub fn write<P: Process + ?Sized>(process: &P, address: usize, data: &[u8]) -> Result<(), Error> {
    for_each_chunk(process, address, data.len(), AccessIntent::Write, |cursor, range| {
        process.write_raw(cursor, &data[range])
    })
}

fn for_each_chunk<P, F>(
    process: &P,
    address: usize,
    len: usize,
    intent: AccessIntent,
    mut access: F,
) -> Result<(), Error>
where
    P: Process + ?Sized,
    F: FnMut(usize, std::ops::Range<usize>) -> Result<(), Error>,
{
    if address.checked_add(len).is_none() {
        return Err(Error::AddressOverflow { address, len });
    }

    let mut offset = 0;
    while offset < len {
        let cursor = address + offset;
        let region = process.query(cursor)?;
        let available = region.end().saturating_sub(cursor);
        if available == 0 {
            return Err(Error::AddressOverflow { address: cursor, len: len - offset });
        }
        let chunk = available.min(len - offset);

        let mut guard = ProtectGuard::for_region(process, region, intent)?;
        access(cursor, offset..offset + chunk)?;
        guard.restore()?;

        offset += chunk;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Protection, testing::FakeProcess};
    use pretty_assertions::assert_eq;

    #[test]
    fn read_spans_regions_with_one_guard_each() {
        let process = FakeProcess::new(7)
            .with_region_data(0x1000, vec![0xaa; 0x1000], Protection::READONLY)
            .with_region_data(0x2000, vec![0xbb; 0x1000], Protection::EXECUTE);

        let bytes = read_vec(&process, 0x1ffe, 4).unwrap();
        assert_eq!(bytes, vec![0xaa, 0xaa, 0xbb, 0xbb]);

        // Only the execute-only region needed escalation and restoration.
        assert_eq!(
            process.protect_history(),
            vec![
                (0x2000, Protection::EXECUTE_READWRITE),
                (0x2000, Protection::EXECUTE)
            ]
        );
    }

    #[test]
    fn write_escalates_read_only_region() {
        let process =
            FakeProcess::new(7).with_region_data(0x1000, vec![0; 0x100], Protection::READONLY);

        write(&process, 0x1010, &[1, 2, 3]).unwrap();

        assert_eq!(read_vec(&process, 0x1010, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(process.protection_at(0x1000), Protection::READONLY);
    }

    #[test]
    fn read_into_guard_page_fails() {
        let process = FakeProcess::new(7)
            .with_region_data(0x1000, vec![0; 0x1000], Protection::READWRITE)
            .with_region_data(0x2000, vec![0; 0x1000], Protection::READWRITE | Protection::GUARD);

        let err = read_vec(&process, 0x1ff0, 0x20).unwrap_err();
        assert!(matches!(err, Error::BadProtection { base: 0x2000, .. }));
        assert_eq!(process.protect_calls(), 0);
    }

    #[test]
    fn overflowing_range_is_rejected() {
        let process = FakeProcess::new(7);
        let err = read_vec(&process, usize::MAX - 1, 8).unwrap_err();
        assert!(matches!(err, Error::AddressOverflow { .. }));
    }
}
