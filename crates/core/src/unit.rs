//! Unit of measure for stock quantities.
//!
//! Units are compared, never converted: a ledger that holds movements for one
//! ingredient in two different units is corrupt and every read fails fast.

use serde::{Deserialize, Serialize};

/// Unit of measure carried by recipe lines and stock movements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Unit {
    Kg,
    G,
    L,
    Piece,
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Unit::Kg => "KG",
            Unit::G => "G",
            Unit::L => "L",
            Unit::Piece => "PIECE",
        };
        f.write_str(s)
    }
}

impl core::str::FromStr for Unit {
    type Err = crate::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KG" => Ok(Unit::Kg),
            "G" => Ok(Unit::G),
            "L" => Ok(Unit::L),
            "PIECE" => Ok(Unit::Piece),
            other => Err(crate::error::DomainError::validation(format!(
                "unknown unit: {other}"
            ))),
        }
    }
}
