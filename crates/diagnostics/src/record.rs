#![forbid(unsafe_code)]

use crate::Tier;

/// An anomaly raised by a walker that has not been attributed to a file yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anomaly {
    pub tier: Tier,
    pub detail: String,
}

impl Anomaly {
    pub fn new(tier: Tier, detail: impl Into<String>) -> Self {
        Self {
            tier,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnomalyRecord {
    /// Display path of the image: a file path, a module path or a synthetic
    /// name for memory-only images.
    pub path: String,
    pub tier: Tier,
    pub detail: String,
}

impl AnomalyRecord {
    pub fn attribute(path: &str, anomaly: Anomaly) -> Self {
        Self {
            path: path.to_owned(),
            tier: anomaly.tier,
            detail: anomaly.detail,
        }
    }
}
