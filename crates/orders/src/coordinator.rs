//! Order submission pipeline (application-level orchestration).
//!
//! `submit_order` runs the full lifecycle: structural checks, recipe
//! expansion, sufficiency check against the ledger, then a commit that pairs
//! the order record with one outbound movement per required ingredient.
//!
//! ```text
//! Received
//!   ↓ structural validation        (InvalidOrder)
//!   ↓ expand requirements          (UnknownDish / UnknownIngredient)
//!   ↓ (submission lock taken)
//!   ↓ sufficiency check            (InsufficientStock, no writes yet)
//!   ↓ save order → append batch    (Persistence on fault, full rollback)
//! Committed
//! ```
//!
//! The submission lock serializes validate-then-commit, so two concurrent
//! orders cannot both pass the sufficiency check for the same scarce
//! ingredient and jointly overdraw it. Commit order matters: the order row
//! goes in first and the ledger batch second, with a compensating delete of
//! the order row if the batch fails. The ledger itself is append-only, so
//! rollback must never require removing a movement; this ordering guarantees
//! no movement is ever durably visible without its order.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use brigade_catalog::CatalogLookup;
use brigade_core::OrderId;
use brigade_ledger::{NewMovement, StockLedger};

use crate::error::OrderError;
use crate::order::{DishOrder, Order, OrderReference, OrderType};
use crate::repository::{OrderRepository, RepositoryError};
use crate::validator::{OrderLineRequest, OrderValidator};

/// Generator of unique order references (`ORD00001`, `ORD00002`, ...).
///
/// References are assigned at commit time only and never reused.
#[derive(Debug, Default)]
pub struct ReferenceSequence {
    counter: AtomicU64,
}

impl ReferenceSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a sequence, e.g. from the highest reference already persisted.
    pub fn starting_after(last_issued: u64) -> Self {
        Self {
            counter: AtomicU64::new(last_issued),
        }
    }

    pub fn next(&self) -> OrderReference {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        OrderReference::new(format!("ORD{n:05}"))
    }
}

/// Orchestrates order submission as one atomic unit of work.
#[derive(Debug)]
pub struct OrderCoordinator<C, L, R> {
    catalog: C,
    ledger: L,
    repository: R,
    references: ReferenceSequence,
    submit_lock: Mutex<()>,
}

impl<C, L, R> OrderCoordinator<C, L, R>
where
    C: CatalogLookup,
    L: StockLedger,
    R: OrderRepository,
{
    pub fn new(catalog: C, ledger: L, repository: R) -> Self {
        Self::with_references(catalog, ledger, repository, ReferenceSequence::new())
    }

    pub fn with_references(
        catalog: C,
        ledger: L,
        repository: R,
        references: ReferenceSequence,
    ) -> Self {
        Self {
            catalog,
            ledger,
            repository,
            references,
            submit_lock: Mutex::new(()),
        }
    }

    /// Submit a proposed order.
    ///
    /// Synchronous: returns only after the order is committed or definitively
    /// rejected. Any failure leaves both the ledger and the repository
    /// exactly as they were.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub fn submit_order(
        &self,
        created_at: DateTime<Utc>,
        lines: Vec<OrderLineRequest>,
        order_type: OrderType,
    ) -> Result<Order, OrderError> {
        // Structural rejection happens before any catalog or ledger access.
        if lines.is_empty() {
            return Err(OrderError::InvalidOrder("order has no lines".to_string()));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(OrderError::InvalidOrder(format!(
                "non-positive quantity for dish {}",
                line.dish_id
            )));
        }

        let validator = OrderValidator::new(&self.catalog, &self.ledger);
        let requirements = validator.expand_requirements(&lines)?;

        let mut dish_orders = Vec::with_capacity(lines.len());
        for line in &lines {
            let dish = self.catalog.dish_by_id(line.dish_id)?;
            dish_orders.push(DishOrder {
                dish_id: line.dish_id,
                quantity: line.quantity,
                unit_price: dish.selling_price,
            });
        }

        // Everything from the sufficiency read to the ledger append runs
        // under the submission lock: a committed order's deductions are
        // visible to every later validation, and contending submissions
        // serialize instead of jointly overdrawing.
        let _guard = self
            .submit_lock
            .lock()
            .map_err(|_| OrderError::Persistence("submission lock poisoned".to_string()))?;

        validator.check_sufficiency(&requirements, created_at)?;

        let reference = self.references.next();
        let order = Order::new(
            OrderId::new(),
            reference,
            created_at,
            dish_orders,
            order_type,
        )
        .map_err(|e| OrderError::InvalidOrder(e.to_string()))?;

        let saved = self.repository.save(order).map_err(|e| match e {
            RepositoryError::DuplicateReference(r) => {
                OrderError::Persistence(format!("order reference {r} already taken"))
            }
            other => OrderError::Persistence(other.to_string()),
        })?;

        let batch: Vec<NewMovement> = requirements
            .iter()
            .map(|(&ingredient_id, requirement)| {
                NewMovement::outbound(
                    ingredient_id,
                    requirement.quantity,
                    requirement.unit,
                    created_at,
                )
            })
            .collect();

        match self.ledger.append_batch(batch) {
            Ok(movements) => {
                info!(
                    reference = %saved.reference(),
                    movements = movements.len(),
                    "order committed"
                );
                Ok(saved)
            }
            Err(e) => {
                // Compensate: the saved order row must not outlive the
                // failed ledger batch.
                if let Err(cleanup) = self.repository.remove(*brigade_core::Entity::id(&saved)) {
                    warn!(
                        reference = %saved.reference(),
                        error = %cleanup,
                        "rollback could not remove the order row"
                    );
                }
                // The ledger's own non-negative guard caught a deduction the
                // sufficiency read missed: surface it as a shortage.
                match e {
                    brigade_ledger::LedgerError::Overdraft {
                        ingredient_id,
                        requested,
                        available,
                    } => Err(OrderError::InsufficientStock {
                        ingredient_id,
                        required: requested,
                        available,
                    }),
                    other => Err(OrderError::Persistence(format!(
                        "ledger batch append failed: {other}"
                    ))),
                }
            }
        }
    }

    /// Retrieve a committed order by its reference.
    pub fn find_order(&self, reference: &str) -> Result<Order, OrderError> {
        self.repository.find_by_reference(reference).map_err(|e| match e {
            RepositoryError::NotFound => OrderError::NotFound,
            other => OrderError::Persistence(other.to_string()),
        })
    }
}
