#![forbid(unsafe_code)]

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Which anomaly tiers end up in the warned report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WarnedType {
    Suspicious,
    Unsupported,
    #[default]
    All,
}

impl FromStr for WarnedType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suspicious" => Ok(Self::Suspicious),
            "unsupported" => Ok(Self::Unsupported),
            "all" => Ok(Self::All),
            _ => Err(Error::UnknownWarnedType(s.to_owned())),
        }
    }
}

impl fmt::Display for WarnedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Suspicious => "suspicious",
            Self::Unsupported => "unsupported",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!("Suspicious".parse::<WarnedType>().unwrap(), WarnedType::Suspicious);
        assert_eq!("unsupported".parse::<WarnedType>().unwrap(), WarnedType::Unsupported);
        assert_eq!(" ALL ".parse::<WarnedType>().unwrap(), WarnedType::All);
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "-1".parse::<WarnedType>().unwrap_err();
        assert!(matches!(err, Error::UnknownWarnedType(ref s) if s == "-1"));
    }
}
