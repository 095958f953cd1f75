use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brigade_core::{DishId, DomainError, DomainResult, Entity, OrderId};

use crate::error::OrderError;

/// Flat tax rate applied on top of the pre-tax total, in percent.
pub const TAX_RATE_PERCENT: u64 = 20;

/// Externally visible unique token identifying a committed order.
///
/// Assigned once at commit time, never reassigned, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderReference(String);

impl OrderReference {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the order is fulfilled. External metadata; not exercised by the
/// ledger/commit pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    DineIn,
    Takeaway,
    Delivery,
}

impl core::fmt::Display for OrderType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderType::DineIn => "DINE_IN",
            OrderType::Takeaway => "TAKEAWAY",
            OrderType::Delivery => "DELIVERY",
        };
        f.write_str(s)
    }
}

impl core::str::FromStr for OrderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DINE_IN" => Ok(OrderType::DineIn),
            "TAKEAWAY" => Ok(OrderType::Takeaway),
            "DELIVERY" => Ok(OrderType::Delivery),
            other => Err(DomainError::validation(format!("unknown order type: {other}"))),
        }
    }
}

/// Order lifecycle status. `Delivered` is terminal: once reached, the order
/// and its lines are immutable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Confirmed,
    InPreparation,
    Ready,
    Delivered,
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::InPreparation => "IN_PREPARATION",
            OrderStatus::Ready => "READY",
            OrderStatus::Delivered => "DELIVERED",
        };
        f.write_str(s)
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(OrderStatus::Created),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "IN_PREPARATION" => Ok(OrderStatus::InPreparation),
            "READY" => Ok(OrderStatus::Ready),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            other => Err(DomainError::validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// Order line: a dish and how many of it were ordered.
///
/// The unit price is captured from the catalog at submission time so totals
/// stay stable when the menu price later changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishOrder {
    pub dish_id: DishId,
    pub quantity: u32,
    /// Price in smallest currency unit.
    pub unit_price: u64,
}

/// A committed restaurant order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    reference: OrderReference,
    created_at: DateTime<Utc>,
    lines: Vec<DishOrder>,
    order_type: OrderType,
    status: OrderStatus,
}

impl Order {
    /// Build an order. A committed order always has at least one line, and
    /// every line a positive quantity.
    pub fn new(
        id: OrderId,
        reference: OrderReference,
        created_at: DateTime<Utc>,
        lines: Vec<DishOrder>,
        order_type: OrderType,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(DomainError::validation(format!(
                "quantity must be positive for dish {}",
                line.dish_id
            )));
        }

        Ok(Self {
            id,
            reference,
            created_at,
            lines,
            order_type,
            status: OrderStatus::Created,
        })
    }

    /// Rehydrate a persisted order, including its stored status.
    ///
    /// Repository use only; submission always goes through [`Self::new`].
    pub fn restore(
        id: OrderId,
        reference: OrderReference,
        created_at: DateTime<Utc>,
        lines: Vec<DishOrder>,
        order_type: OrderType,
        status: OrderStatus,
    ) -> DomainResult<Self> {
        let mut order = Self::new(id, reference, created_at, lines, order_type)?;
        order.status = status;
        Ok(order)
    }

    pub fn reference(&self) -> &OrderReference {
        &self.reference
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lines(&self) -> &[DishOrder] {
        &self.lines
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Total in smallest currency unit, before tax.
    pub fn total_excl_tax(&self) -> u64 {
        self.lines
            .iter()
            .map(|l| l.unit_price * u64::from(l.quantity))
            .sum()
    }

    /// Total with the flat tax rate applied (truncating division).
    pub fn total_incl_tax(&self) -> u64 {
        self.total_excl_tax() * (100 + TAX_RATE_PERCENT) / 100
    }

    /// Move the order to a new status.
    ///
    /// Fails with [`OrderError::OrderImmutable`] once the order is delivered.
    pub fn update_status(&mut self, status: OrderStatus) -> Result<(), OrderError> {
        if self.status == OrderStatus::Delivered {
            return Err(OrderError::OrderImmutable {
                reference: self.reference.clone(),
                status: self.status,
            });
        }
        self.status = status;
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
