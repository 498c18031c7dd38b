//! Shared types used across Slipway crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A rolling-update bound: an absolute pod count or a percentage of replicas.
///
/// Serializes the way Kubernetes expects an `IntOrString`: a bare number or a
/// `"25%"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrPercent {
    Int(u32),
    Percent(#[serde(with = "percent")] u8),
}

impl Default for IntOrPercent {
    fn default() -> Self {
        IntOrPercent::Percent(10)
    }
}

impl FromStr for IntOrPercent {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let value: u8 = pct
                .parse()
                .map_err(|_| CoreError::InvalidBound(s.to_string()))?;
            if value > 100 {
                return Err(CoreError::InvalidBound(s.to_string()));
            }
            return Ok(IntOrPercent::Percent(value));
        }
        s.parse()
            .map(IntOrPercent::Int)
            .map_err(|_| CoreError::InvalidBound(s.to_string()))
    }
}

impl fmt::Display for IntOrPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOrPercent::Int(n) => write!(f, "{n}"),
            IntOrPercent::Percent(p) => write!(f, "{p}%"),
        }
    }
}

mod percent {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &u8, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{value}%"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let raw = String::deserialize(d)?;
        let pct = raw
            .strip_suffix('%')
            .ok_or_else(|| D::Error::custom(format!("expected a percentage, got {raw:?}")))?;
        let value: u8 = pct.parse().map_err(D::Error::custom)?;
        if value > 100 {
            return Err(D::Error::custom("percentage above 100"));
        }
        Ok(value)
    }
}

/// Rolling-update bounds for an app's runtime workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RollingUpdate {
    pub max_unavailable: IntOrPercent,
    pub max_surge: IntOrPercent,
}
