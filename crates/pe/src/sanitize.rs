#![forbid(unsafe_code)]

use crate::ScanContext;
use diagnostics::Tier;

/// Longest name or string passed through untouched.
pub const MAX_NAME_LENGTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    Unprintable,
    TooLong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub value: String,
    pub defect: Option<Defect>,
}

/// Printable in the classic "C" locale.
pub fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

/// Truncate at the first unprintable byte, or else at
/// [`MAX_NAME_LENGTH`]. Values within both limits come back unchanged.
pub fn sanitize(raw: &[u8]) -> Sanitized {
    if let Some(pos) = raw.iter().position(|&b| !is_printable(b)) {
        return Sanitized {
            value: ascii(&raw[..pos]),
            defect: Some(Defect::Unprintable),
        };
    }
    if raw.len() > MAX_NAME_LENGTH {
        return Sanitized {
            value: ascii(&raw[..MAX_NAME_LENGTH]),
            defect: Some(Defect::TooLong),
        };
    }
    Sanitized {
        value: ascii(raw),
        defect: None,
    }
}

fn ascii(bytes: &[u8]) -> String {
    // Only printable ASCII reaches here.
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Sanitize `raw`, report a defect as a warning plus an anomaly of `tier`,
/// then print the (possibly truncated) value as `name: value`.
pub fn write_sanitized(
    ctx: &mut ScanContext<'_>,
    name: &str,
    description: &str,
    tabs: usize,
    tier: Tier,
    raw: &[u8],
) -> String {
    let sanitized = sanitize(raw);
    match sanitized.defect {
        Some(Defect::Unprintable) => {
            ctx.warning(tier, &format!("Detected unprintable {description}. Truncating."), tabs)
        }
        Some(Defect::TooLong) => ctx.warning(
            tier,
            &format!("Detected suspiciously long {description}. Truncating."),
            tabs,
        ),
        None => {}
    }
    ctx.out().write_named_normal(name, &sanitized.value, tabs);
    sanitized.value
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundaries() {
        assert_eq!(sanitize(b"kernel32.dll").defect, None);
        assert_eq!(sanitize(&[b'a'; MAX_NAME_LENGTH]).defect, None);

        let long = sanitize(&[b'a'; MAX_NAME_LENGTH + 1]);
        assert_eq!(long.defect, Some(Defect::TooLong));
        assert_eq!(long.value.len(), MAX_NAME_LENGTH);

        let odd = sanitize(b"te\x01xt");
        assert_eq!(odd.defect, Some(Defect::Unprintable));
        assert_eq!(odd.value, "te");
    }

    #[test]
    fn unprintable_wins_over_length() {
        let mut raw = vec![b'a'; 2000];
        raw[1500] = 0x7F;
        let out = sanitize(&raw);
        assert_eq!(out.defect, Some(Defect::Unprintable));
        assert_eq!(out.value.len(), 1500);
    }

    proptest! {
        #[test]
        fn truncates_at_first_unprintable(raw in prop::collection::vec(any::<u8>(), 0..2048)) {
            let out = sanitize(&raw);
            match raw.iter().position(|&b| !is_printable(b)) {
                Some(pos) => {
                    prop_assert_eq!(out.defect, Some(Defect::Unprintable));
                    prop_assert_eq!(out.value.as_bytes(), &raw[..pos]);
                }
                None if raw.len() > MAX_NAME_LENGTH => {
                    prop_assert_eq!(out.defect, Some(Defect::TooLong));
                    prop_assert_eq!(out.value.as_bytes(), &raw[..MAX_NAME_LENGTH]);
                }
                None => {
                    prop_assert_eq!(out.defect, None);
                    prop_assert_eq!(out.value.as_bytes(), &raw[..]);
                }
            }
        }

        #[test]
        fn printable_input_within_limit_is_unchanged(s in "[ -~]{0,1024}") {
            let out = sanitize(s.as_bytes());
            prop_assert_eq!(out.defect, None);
            prop_assert_eq!(out.value, s);
        }
    }
}
