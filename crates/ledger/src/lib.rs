//! `brigade-ledger` — append-only stock ledger.
//!
//! Stock is never stored as a mutable counter. Every change is an immutable,
//! timestamped [`StockMovement`]; the quantity on hand at any instant is the
//! fold of the movement stream up to that instant. This gives auditability,
//! point-in-time queries, and natural recovery: a suspect cached figure can
//! always be rederived by replaying movements.

pub mod movement;
pub mod store;

pub use movement::{MovementKind, NewMovement, StockLevel, StockMovement};
pub use store::{InMemoryStockLedger, LedgerError, StockLedger};
