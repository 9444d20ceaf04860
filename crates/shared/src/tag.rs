//! Scheme variant identifiers

use crate::errors::{HeStatsError, HeStatsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies which homomorphic scheme produced a ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeTag {
    /// Approximate real arithmetic (CKKS family)
    Approx,
    /// Exact modular integers (BFV family)
    Exact,
    /// Additively homomorphic integers (Paillier)
    Additive,
}

impl SchemeTag {
    pub const ALL: [SchemeTag; 3] = [SchemeTag::Approx, SchemeTag::Exact, SchemeTag::Additive];

    /// One-byte wire code
    pub fn code(self) -> u8 {
        match self {
            SchemeTag::Approx => 1,
            SchemeTag::Exact => 2,
            SchemeTag::Additive => 3,
        }
    }

    pub fn from_code(code: u8) -> HeStatsResult<Self> {
        match code {
            1 => Ok(SchemeTag::Approx),
            2 => Ok(SchemeTag::Exact),
            3 => Ok(SchemeTag::Additive),
            other => Err(HeStatsError::mismatch(format!(
                "unknown scheme code {other}"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SchemeTag::Approx => "approx",
            SchemeTag::Exact => "exact",
            SchemeTag::Additive => "additive",
        }
    }

    /// Whether the scheme works on integers only
    pub fn is_integer(self) -> bool {
        !matches!(self, SchemeTag::Approx)
    }
}

impl fmt::Display for SchemeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchemeTag {
    type Err = HeStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approx" | "ckks" => Ok(SchemeTag::Approx),
            "exact" | "bfv" => Ok(SchemeTag::Exact),
            "additive" | "paillier" => Ok(SchemeTag::Additive),
            other => Err(HeStatsError::validation(format!("Unknown scheme: {other}"))),
        }
    }
}
