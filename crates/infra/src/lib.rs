//! Infrastructure layer: Postgres adapters for the stock ledger and the
//! order repository, plus the cross-crate integration test suite.

pub mod postgres;
