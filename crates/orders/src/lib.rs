//! `brigade-orders` — order records and the order-creation transaction.
//!
//! An order is validated against the catalog and the stock ledger, then
//! committed as one atomic unit: the order record plus one outbound stock
//! movement per required ingredient. A failed submission leaves no partial
//! state behind.

pub mod coordinator;
pub mod error;
pub mod order;
pub mod repository;
pub mod validator;

pub use coordinator::{OrderCoordinator, ReferenceSequence};
pub use error::OrderError;
pub use order::{DishOrder, Order, OrderReference, OrderStatus, OrderType, TAX_RATE_PERCENT};
pub use repository::{InMemoryOrderRepository, OrderRepository, RepositoryError};
pub use validator::{OrderLineRequest, OrderValidator, Requirement};
