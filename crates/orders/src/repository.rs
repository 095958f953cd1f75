//! Order persistence contract.
//!
//! No business logic lives here; the repository persists committed orders
//! and retrieves them by reference. It participates in the coordinator's
//! commit: `remove` exists solely as the compensating action for a commit
//! whose ledger batch failed after the order row was saved.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use brigade_core::{Entity, OrderId};

use crate::order::Order;

/// Order storage error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// An order with the same reference already exists.
    #[error("duplicate order reference: {0}")]
    DuplicateReference(String),

    /// No order matches the requested identity/reference.
    #[error("order not found")]
    NotFound,

    /// Underlying storage fault.
    #[error("order storage failure: {0}")]
    Storage(String),
}

/// Persistence operations for committed orders.
pub trait OrderRepository: Send + Sync {
    /// Persist an order. Rejects a reference that is already taken.
    fn save(&self, order: Order) -> Result<Order, RepositoryError>;

    /// Retrieve an order by its reference token.
    fn find_by_reference(&self, reference: &str) -> Result<Order, RepositoryError>;

    /// Delete an order. Compensation path only; committed orders are never
    /// removed through the public workflow.
    fn remove(&self, id: OrderId) -> Result<(), RepositoryError>;
}

impl<R> OrderRepository for Arc<R>
where
    R: OrderRepository + ?Sized,
{
    fn save(&self, order: Order) -> Result<Order, RepositoryError> {
        (**self).save(order)
    }

    fn find_by_reference(&self, reference: &str) -> Result<Order, RepositoryError> {
        (**self).find_by_reference(reference)
    }

    fn remove(&self, id: OrderId) -> Result<(), RepositoryError> {
        (**self).remove(id)
    }
}

/// In-memory order repository for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders (test support).
    pub fn len(&self) -> usize {
        self.orders.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn save(&self, order: Order) -> Result<Order, RepositoryError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))?;

        let reference = order.reference().as_str();
        if orders.values().any(|o| o.reference().as_str() == reference) {
            return Err(RepositoryError::DuplicateReference(reference.to_string()));
        }

        orders.insert(*order.id(), order.clone());
        Ok(order)
    }

    fn find_by_reference(&self, reference: &str) -> Result<Order, RepositoryError> {
        let orders = self
            .orders
            .read()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))?;

        orders
            .values()
            .find(|o| o.reference().as_str() == reference)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    fn remove(&self, id: OrderId) -> Result<(), RepositoryError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))?;

        orders.remove(&id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}
