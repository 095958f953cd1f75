//! Append-only movement store.
//!
//! The movement log is the only mutable shared resource in the system; all
//! mutation goes through [`StockLedger::append`] / [`StockLedger::append_batch`],
//! which is the sole transaction boundary.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use brigade_core::{IngredientId, MovementId, Unit};

use crate::movement::{NewMovement, StockLevel, StockMovement};

/// Ledger operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A movement failed validation (e.g. zero quantity).
    #[error("invalid movement: {0}")]
    Validation(String),

    /// Movements for one ingredient carry different units of measure.
    ///
    /// This is a data-integrity fault: the ledger fails fast and never
    /// converts between units.
    #[error("unit mismatch for ingredient {ingredient_id}: expected {expected}, found {found}")]
    UnitMismatch {
        ingredient_id: IngredientId,
        expected: Unit,
        found: Unit,
    },

    /// The batch would drive an ingredient's balance below zero.
    ///
    /// Stock is non-negative by invariant; the ledger is the last line of
    /// defense when a stale validation read missed a concurrent deduction.
    #[error(
        "overdraft for ingredient {ingredient_id}: requested {requested}, available {available}"
    )]
    Overdraft {
        ingredient_id: IngredientId,
        requested: Decimal,
        available: Decimal,
    },

    /// Underlying storage fault.
    #[error("ledger storage failure: {0}")]
    Storage(String),
}

/// Append-only stock ledger.
///
/// Reads are pure: `level_at`/`quantity_at` have no side effects and are
/// consistent with respect to a single ingredient's movement stream. Appends
/// never mutate or remove existing movements; a batch is all-or-nothing.
pub trait StockLedger: Send + Sync {
    /// Stock position of an ingredient as of `at`: the sum of the signed
    /// quantities of every movement with `occurred_at <= at`, plus the unit
    /// the ingredient is recorded in.
    fn level_at(&self, ingredient_id: IngredientId, at: DateTime<Utc>)
    -> Result<StockLevel, LedgerError>;

    /// Quantity on hand as of `at`. Degenerate case of [`Self::level_at`].
    fn quantity_at(
        &self,
        ingredient_id: IngredientId,
        at: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        Ok(self.level_at(ingredient_id, at)?.quantity)
    }

    /// Append one immutable movement record.
    fn append(&self, movement: NewMovement) -> Result<StockMovement, LedgerError>;

    /// Append several movements as a single atomic unit: either every
    /// movement is recorded or none is. Required so a multi-ingredient order
    /// deduction cannot partially apply.
    fn append_batch(&self, movements: Vec<NewMovement>)
    -> Result<Vec<StockMovement>, LedgerError>;

    /// Full movement stream for one ingredient, ordered by `occurred_at`
    /// (audit export).
    fn movements(&self, ingredient_id: IngredientId) -> Result<Vec<StockMovement>, LedgerError>;
}

impl<L> StockLedger for &L
where
    L: StockLedger + ?Sized,
{
    fn level_at(
        &self,
        ingredient_id: IngredientId,
        at: DateTime<Utc>,
    ) -> Result<StockLevel, LedgerError> {
        (**self).level_at(ingredient_id, at)
    }

    fn append(&self, movement: NewMovement) -> Result<StockMovement, LedgerError> {
        (**self).append(movement)
    }

    fn append_batch(
        &self,
        movements: Vec<NewMovement>,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        (**self).append_batch(movements)
    }

    fn movements(&self, ingredient_id: IngredientId) -> Result<Vec<StockMovement>, LedgerError> {
        (**self).movements(ingredient_id)
    }
}

impl<L> StockLedger for Arc<L>
where
    L: StockLedger + ?Sized,
{
    fn level_at(
        &self,
        ingredient_id: IngredientId,
        at: DateTime<Utc>,
    ) -> Result<StockLevel, LedgerError> {
        (**self).level_at(ingredient_id, at)
    }

    fn append(&self, movement: NewMovement) -> Result<StockMovement, LedgerError> {
        (**self).append(movement)
    }

    fn append_batch(
        &self,
        movements: Vec<NewMovement>,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        (**self).append_batch(movements)
    }

    fn movements(&self, ingredient_id: IngredientId) -> Result<Vec<StockMovement>, LedgerError> {
        (**self).movements(ingredient_id)
    }
}

/// In-memory append-only stock ledger.
///
/// Intended for tests/dev. Batch atomicity comes from holding the single
/// write lock across validation and insertion.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    streams: RwLock<HashMap<IngredientId, Vec<StockMovement>>>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_unit(stream: &[StockMovement]) -> Option<Unit> {
        stream.first().map(|m| m.unit)
    }

    fn validate_against(
        stream: &[StockMovement],
        movement: &NewMovement,
    ) -> Result<(), LedgerError> {
        if movement.quantity.is_zero() {
            return Err(LedgerError::Validation(format!(
                "zero quantity movement for ingredient {}",
                movement.ingredient_id
            )));
        }
        if let Some(expected) = Self::stream_unit(stream) {
            if expected != movement.unit {
                return Err(LedgerError::UnitMismatch {
                    ingredient_id: movement.ingredient_id,
                    expected,
                    found: movement.unit,
                });
            }
        }
        Ok(())
    }
}

impl StockLedger for InMemoryStockLedger {
    fn level_at(
        &self,
        ingredient_id: IngredientId,
        at: DateTime<Utc>,
    ) -> Result<StockLevel, LedgerError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        let Some(stream) = streams.get(&ingredient_id) else {
            return Ok(StockLevel::empty());
        };

        // Fail fast on corrupt streams regardless of the queried instant.
        let unit = Self::stream_unit(stream);
        if let Some(expected) = unit {
            if let Some(bad) = stream.iter().find(|m| m.unit != expected) {
                return Err(LedgerError::UnitMismatch {
                    ingredient_id,
                    expected,
                    found: bad.unit,
                });
            }
        }

        let quantity: Decimal = stream
            .iter()
            .filter(|m| m.occurred_at <= at)
            .map(|m| m.quantity)
            .sum();

        Ok(StockLevel { quantity, unit })
    }

    fn append(&self, movement: NewMovement) -> Result<StockMovement, LedgerError> {
        let mut committed = self.append_batch(vec![movement])?;
        // One in, one out: append_batch preserves batch length.
        Ok(committed.remove(0))
    }

    fn append_batch(
        &self,
        movements: Vec<NewMovement>,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        if movements.is_empty() {
            return Ok(vec![]);
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        // Validate the whole batch before inserting anything: unit
        // consistency against the existing stream and within the batch.
        let mut batch_units: HashMap<IngredientId, Unit> = HashMap::new();
        let mut batch_deltas: HashMap<IngredientId, Decimal> = HashMap::new();
        for movement in &movements {
            let stream = streams
                .get(&movement.ingredient_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            Self::validate_against(stream, movement)?;

            if let Some(&expected) = batch_units.get(&movement.ingredient_id) {
                if expected != movement.unit {
                    return Err(LedgerError::UnitMismatch {
                        ingredient_id: movement.ingredient_id,
                        expected,
                        found: movement.unit,
                    });
                }
            } else {
                batch_units.insert(movement.ingredient_id, movement.unit);
            }

            *batch_deltas.entry(movement.ingredient_id).or_default() += movement.quantity;
        }

        // Non-negative stock invariant, checked against the full stream.
        for (&ingredient_id, &delta) in &batch_deltas {
            if delta >= Decimal::ZERO {
                continue;
            }
            let available: Decimal = streams
                .get(&ingredient_id)
                .map(|stream| stream.iter().map(|m| m.quantity).sum())
                .unwrap_or(Decimal::ZERO);
            if available + delta < Decimal::ZERO {
                return Err(LedgerError::Overdraft {
                    ingredient_id,
                    requested: -delta,
                    available,
                });
            }
        }

        let mut committed = Vec::with_capacity(movements.len());
        for movement in movements {
            let stored = StockMovement {
                id: MovementId::new(),
                ingredient_id: movement.ingredient_id,
                quantity: movement.quantity,
                unit: movement.unit,
                kind: StockMovement::kind_of(movement.quantity),
                occurred_at: movement.occurred_at,
            };
            streams
                .entry(movement.ingredient_id)
                .or_default()
                .push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn movements(&self, ingredient_id: IngredientId) -> Result<Vec<StockMovement>, LedgerError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        let mut stream = streams.get(&ingredient_id).cloned().unwrap_or_default();
        stream.sort_by_key(|m| m.occurred_at);
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementKind;
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_ingredient_id() -> IngredientId {
        IngredientId::new()
    }

    fn at(base: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
        base + Duration::minutes(minutes)
    }

    #[test]
    fn empty_ledger_reads_zero_with_no_unit() {
        let ledger = InMemoryStockLedger::new();
        let level = ledger.level_at(test_ingredient_id(), Utc::now()).unwrap();
        assert_eq!(level.quantity, Decimal::ZERO);
        assert_eq!(level.unit, None);
    }

    #[test]
    fn quantity_sums_movements_up_to_the_instant() {
        let ledger = InMemoryStockLedger::new();
        let ingredient = test_ingredient_id();
        let base = Utc::now();

        ledger
            .append(NewMovement::inbound(ingredient, dec!(100), Unit::Kg, at(base, 0)))
            .unwrap();
        ledger
            .append(NewMovement::outbound(ingredient, dec!(0.40), Unit::Kg, at(base, 10)))
            .unwrap();
        ledger
            .append(NewMovement::inbound(ingredient, dec!(5), Unit::Kg, at(base, 20)))
            .unwrap();

        assert_eq!(ledger.quantity_at(ingredient, at(base, 5)).unwrap(), dec!(100));
        assert_eq!(ledger.quantity_at(ingredient, at(base, 10)).unwrap(), dec!(99.60));
        assert_eq!(ledger.quantity_at(ingredient, at(base, 30)).unwrap(), dec!(104.60));
    }

    #[test]
    fn reads_before_the_first_movement_are_zero() {
        let ledger = InMemoryStockLedger::new();
        let ingredient = test_ingredient_id();
        let base = Utc::now();

        ledger
            .append(NewMovement::inbound(ingredient, dec!(10), Unit::Kg, at(base, 10)))
            .unwrap();

        assert_eq!(ledger.quantity_at(ingredient, at(base, 0)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn zero_quantity_movement_is_rejected() {
        let ledger = InMemoryStockLedger::new();
        let err = ledger
            .append(NewMovement::inbound(
                test_ingredient_id(),
                Decimal::ZERO,
                Unit::Kg,
                Utc::now(),
            ))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn unit_mismatch_on_append_fails_fast() {
        let ledger = InMemoryStockLedger::new();
        let ingredient = test_ingredient_id();
        let base = Utc::now();

        ledger
            .append(NewMovement::inbound(ingredient, dec!(10), Unit::Kg, base))
            .unwrap();
        let err = ledger
            .append(NewMovement::inbound(ingredient, dec!(500), Unit::G, base))
            .unwrap_err();

        match err {
            LedgerError::UnitMismatch { expected, found, .. } => {
                assert_eq!(expected, Unit::Kg);
                assert_eq!(found, Unit::G);
            }
            other => panic!("expected UnitMismatch, got {other:?}"),
        }
    }

    #[test]
    fn batch_with_one_invalid_movement_applies_nothing() {
        let ledger = InMemoryStockLedger::new();
        let a = test_ingredient_id();
        let b = test_ingredient_id();
        let now = Utc::now();

        let err = ledger
            .append_batch(vec![
                NewMovement::outbound(a, dec!(1), Unit::Kg, now),
                NewMovement::outbound(b, Decimal::ZERO, Unit::Kg, now),
            ])
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert_eq!(ledger.quantity_at(a, now).unwrap(), Decimal::ZERO);
        assert!(ledger.movements(a).unwrap().is_empty());
    }

    #[test]
    fn outbound_exceeding_the_balance_is_rejected() {
        let ledger = InMemoryStockLedger::new();
        let ingredient = test_ingredient_id();
        let base = Utc::now();

        ledger
            .append(NewMovement::inbound(ingredient, dec!(50), Unit::Kg, at(base, 0)))
            .unwrap();

        let err = ledger
            .append(NewMovement::outbound(ingredient, dec!(100), Unit::Kg, at(base, 1)))
            .unwrap_err();

        match err {
            LedgerError::Overdraft {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, dec!(100));
                assert_eq!(available, dec!(50));
            }
            other => panic!("expected Overdraft, got {other:?}"),
        }

        // Stock may reach exactly zero.
        ledger
            .append(NewMovement::outbound(ingredient, dec!(50), Unit::Kg, at(base, 2)))
            .unwrap();
        assert_eq!(ledger.quantity_at(ingredient, at(base, 2)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn batch_with_conflicting_units_for_one_ingredient_applies_nothing() {
        let ledger = InMemoryStockLedger::new();
        let ingredient = test_ingredient_id();
        let now = Utc::now();

        let err = ledger
            .append_batch(vec![
                NewMovement::inbound(ingredient, dec!(1), Unit::Kg, now),
                NewMovement::inbound(ingredient, dec!(100), Unit::G, now),
            ])
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnitMismatch { .. }));
        assert!(ledger.movements(ingredient).unwrap().is_empty());
    }

    #[test]
    fn movement_stream_records_kind_and_is_exportable() {
        let ledger = InMemoryStockLedger::new();
        let ingredient = test_ingredient_id();
        let base = Utc::now();

        ledger
            .append(NewMovement::inbound(ingredient, dec!(100), Unit::Kg, at(base, 0)))
            .unwrap();
        ledger
            .append(NewMovement::outbound(ingredient, dec!(0.40), Unit::Kg, at(base, 1)))
            .unwrap();

        let stream = ledger.movements(ingredient).unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream[0].kind, MovementKind::In);
        assert_eq!(stream[1].kind, MovementKind::Out);
        assert_eq!(stream[1].quantity, dec!(-0.40));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a read with no intervening append returns the same value,
        /// and the value equals the plain sum of the appended quantities.
        #[test]
        fn reads_are_idempotent_and_equal_the_fold(
            quantities in prop::collection::vec(-1_000_000i64..1_000_000i64, 1..20)
        ) {
            let ledger = InMemoryStockLedger::new();
            let ingredient = test_ingredient_id();
            let base = Utc::now();

            let mut expected = Decimal::ZERO;
            for (i, q) in quantities.iter().enumerate() {
                let q = if *q == 0 { 1 } else { *q };
                // Keep the running balance non-negative (ledger invariant):
                // flip a draw that would overdraw into a restock.
                let quantity = if expected + Decimal::from(q) < Decimal::ZERO {
                    Decimal::from(q.abs())
                } else {
                    Decimal::from(q)
                };
                expected += quantity;
                ledger.append(NewMovement {
                    ingredient_id: ingredient,
                    quantity,
                    unit: Unit::Kg,
                    occurred_at: at(base, i as i64),
                }).unwrap();
            }

            let horizon = at(base, quantities.len() as i64);
            let first = ledger.quantity_at(ingredient, horizon).unwrap();
            let second = ledger.quantity_at(ingredient, horizon).unwrap();

            prop_assert_eq!(first, second);
            prop_assert_eq!(first, expected);
        }

        /// Property: appending after `t1` never changes the value observed at `t1`,
        /// and the value at the append instant grows by exactly the appended quantity.
        #[test]
        fn point_in_time_reads_are_stable(
            initial in 1i64..1_000_000i64,
            delta in 1i64..1_000_000i64,
        ) {
            let ledger = InMemoryStockLedger::new();
            let ingredient = test_ingredient_id();
            let base = Utc::now();

            ledger.append(NewMovement::inbound(
                ingredient, Decimal::from(initial), Unit::Kg, at(base, 0),
            )).unwrap();

            let t1 = at(base, 1);
            let before = ledger.quantity_at(ingredient, t1).unwrap();

            ledger.append(NewMovement::inbound(
                ingredient, Decimal::from(delta), Unit::Kg, at(base, 2),
            )).unwrap();

            let after = ledger.quantity_at(ingredient, at(base, 2)).unwrap();
            prop_assert_eq!(after, before + Decimal::from(delta));

            // The historical read is unchanged by the later movement.
            prop_assert_eq!(ledger.quantity_at(ingredient, t1).unwrap(), before);
        }
    }
}
