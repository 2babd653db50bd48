#![forbid(unsafe_code)]

use bitflags::bitflags;
use config::WarnedType;
use std::fmt;

/// Severity of an anomaly found while scanning an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Deviations that hint at tampering or obfuscation.
    Suspicious,
    /// Structures the walkers do not handle or the loader would reject.
    Unsupported,
}

impl Tier {
    pub fn name(self) -> &'static str {
        match self {
            Self::Suspicious => "Suspicious",
            Self::Unsupported => "Unsupported",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Union of the tiers that get recorded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TierFilter: u8 {
        const SUSPICIOUS = 1 << 0;
        const UNSUPPORTED = 1 << 1;
        const ALL = Self::SUSPICIOUS.bits() | Self::UNSUPPORTED.bits();
    }
}

impl From<Tier> for TierFilter {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Suspicious => Self::SUSPICIOUS,
            Tier::Unsupported => Self::UNSUPPORTED,
        }
    }
}

impl From<WarnedType> for TierFilter {
    fn from(warned: WarnedType) -> Self {
        match warned {
            WarnedType::Suspicious => Self::SUSPICIOUS,
            WarnedType::Unsupported => Self::UNSUPPORTED,
            WarnedType::All => Self::ALL,
        }
    }
}

impl TierFilter {
    pub fn accepts(self, tier: Tier) -> bool {
        self.contains(tier.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_from_warned_type() {
        let suspicious = TierFilter::from(WarnedType::Suspicious);
        assert!(suspicious.accepts(Tier::Suspicious));
        assert!(!suspicious.accepts(Tier::Unsupported));

        let all = TierFilter::from(WarnedType::All);
        assert!(all.accepts(Tier::Suspicious));
        assert!(all.accepts(Tier::Unsupported));
    }
}
