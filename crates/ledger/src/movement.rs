use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use brigade_core::{IngredientId, MovementId, Unit};

/// Direction of a stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    /// Inbound restock (positive quantity).
    In,
    /// Outbound consumption (negative quantity).
    Out,
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
        };
        f.write_str(s)
    }
}

impl core::str::FromStr for MovementKind {
    type Err = brigade_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementKind::In),
            "OUT" => Ok(MovementKind::Out),
            other => Err(brigade_core::DomainError::validation(format!(
                "unknown movement kind: {other}"
            ))),
        }
    }
}

/// A movement ready to be appended (not yet assigned an identifier).
///
/// The sign of `quantity` carries the direction: positive for restocking,
/// negative for consumption. Zero is rejected at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
    pub unit: Unit,
    pub occurred_at: DateTime<Utc>,
}

impl NewMovement {
    pub fn inbound(
        ingredient_id: IngredientId,
        quantity: Decimal,
        unit: Unit,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ingredient_id,
            quantity,
            unit,
            occurred_at,
        }
    }

    pub fn outbound(
        ingredient_id: IngredientId,
        quantity: Decimal,
        unit: Unit,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ingredient_id,
            quantity: -quantity,
            unit,
            occurred_at,
        }
    }
}

/// One immutable ledger record: the durable audit trail of a stock change.
///
/// Exportable/inspectable independent of the order subsystem. Never updated
/// or deleted once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
    pub unit: Unit,
    pub kind: MovementKind,
    pub occurred_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn kind_of(quantity: Decimal) -> MovementKind {
        if quantity.is_sign_negative() {
            MovementKind::Out
        } else {
            MovementKind::In
        }
    }
}

/// Ledger-derived stock position of one ingredient at one instant.
///
/// `unit` is `None` for an ingredient with no movements yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub quantity: Decimal,
    pub unit: Option<Unit>,
}

impl StockLevel {
    pub fn empty() -> Self {
        Self {
            quantity: Decimal::ZERO,
            unit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn outbound_negates_the_quantity() {
        let m = NewMovement::outbound(
            IngredientId::new(),
            dec!(0.40),
            Unit::Kg,
            Utc::now(),
        );
        assert_eq!(m.quantity, dec!(-0.40));
        assert_eq!(StockMovement::kind_of(m.quantity), MovementKind::Out);
    }

    #[test]
    fn kind_follows_the_sign() {
        assert_eq!(StockMovement::kind_of(dec!(5)), MovementKind::In);
        assert_eq!(StockMovement::kind_of(dec!(-5)), MovementKind::Out);
    }
}
