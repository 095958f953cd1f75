//! Order pipeline error taxonomy.
//!
//! Each failure mode is a distinct kind so callers can branch on it: a
//! `Persistence` fault is safe to retry (full rollback is guaranteed), an
//! `InsufficientStock` rejection is a business outcome and is not.

use rust_decimal::Decimal;
use thiserror::Error;

use brigade_catalog::CatalogError;
use brigade_core::{DishId, IngredientId};
use brigade_ledger::LedgerError;

use crate::order::{OrderReference, OrderStatus};

/// Failure modes of order submission and retrieval.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Empty line list or non-positive quantity; raised before any lookup.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// A referenced dish id does not resolve in the catalog.
    #[error("unknown dish: {0}")]
    UnknownDish(DishId),

    /// A referenced ingredient id does not resolve in the catalog.
    #[error("unknown ingredient: {0}")]
    UnknownIngredient(IngredientId),

    /// Required quantity exceeds the ledger-derived available quantity.
    ///
    /// Reports the first shortage in ascending ingredient-id order; every
    /// shortage found is logged before this is returned.
    #[error(
        "insufficient stock for ingredient {ingredient_id}: required {required}, available {available}"
    )]
    InsufficientStock {
        ingredient_id: IngredientId,
        required: Decimal,
        available: Decimal,
    },

    /// Mutation attempted on a delivered order.
    #[error("order {reference} has status {status} and can no longer be modified")]
    OrderImmutable {
        reference: OrderReference,
        status: OrderStatus,
    },

    /// Ledger data-integrity or storage fault, surfaced unchanged.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Storage fault during commit. Full rollback is guaranteed, so the
    /// operation is safe for the caller to retry.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// No order exists for the given reference.
    #[error("order not found")]
    NotFound,
}

impl From<CatalogError> for OrderError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::UnknownDish(id) => OrderError::UnknownDish(id),
            CatalogError::UnknownIngredient(id) => OrderError::UnknownIngredient(id),
        }
    }
}
