//! Order validation: recipe expansion and stock sufficiency.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use brigade_catalog::CatalogLookup;
use brigade_core::{DishId, IngredientId, Unit};
use brigade_ledger::{LedgerError, StockLedger};

use crate::error::OrderError;

/// One proposed order line: a dish and the quantity requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLineRequest {
    pub dish_id: DishId,
    pub quantity: u32,
}

impl OrderLineRequest {
    pub fn new(dish_id: DishId, quantity: u32) -> Self {
        Self { dish_id, quantity }
    }
}

/// Aggregated ingredient demand of a proposed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub quantity: Decimal,
    pub unit: Unit,
}

/// Validates a proposed order against the catalog and the stock ledger.
///
/// Pure reads only: the validator never writes to the ledger. The `BTreeMap`
/// keying makes every downstream traversal deterministic by ascending
/// ingredient id.
#[derive(Debug)]
pub struct OrderValidator<C, L> {
    catalog: C,
    ledger: L,
}

impl<C, L> OrderValidator<C, L>
where
    C: CatalogLookup,
    L: StockLedger,
{
    pub fn new(catalog: C, ledger: L) -> Self {
        Self { catalog, ledger }
    }

    /// Expand order lines into total required quantity per ingredient:
    /// recipe quantity times ordered quantity, summed across all lines that
    /// share an ingredient.
    pub fn expand_requirements(
        &self,
        lines: &[OrderLineRequest],
    ) -> Result<BTreeMap<IngredientId, Requirement>, OrderError> {
        let mut requirements: BTreeMap<IngredientId, Requirement> = BTreeMap::new();

        for line in lines {
            let dish = self.catalog.dish_by_id(line.dish_id)?;
            for recipe in &dish.recipe {
                let needed = recipe.quantity * Decimal::from(line.quantity);
                match requirements.entry(recipe.ingredient_id) {
                    Entry::Vacant(slot) => {
                        slot.insert(Requirement {
                            quantity: needed,
                            unit: recipe.unit,
                        });
                    }
                    Entry::Occupied(mut slot) => {
                        let requirement = slot.get_mut();
                        if requirement.unit != recipe.unit {
                            // Two recipes demand the same ingredient in
                            // different units: data integrity, fail fast.
                            return Err(LedgerError::UnitMismatch {
                                ingredient_id: recipe.ingredient_id,
                                expected: requirement.unit,
                                found: recipe.unit,
                            }
                            .into());
                        }
                        requirement.quantity += needed;
                    }
                }
            }
        }

        Ok(requirements)
    }

    /// Check every requirement against the ledger as of `as_of`.
    ///
    /// All shortages are evaluated and logged; the one reported is the first
    /// in ascending ingredient-id order, so callers always get the same
    /// concrete deficit for the same state. Exact equality is acceptable:
    /// stock may reach exactly zero.
    pub fn check_sufficiency(
        &self,
        requirements: &BTreeMap<IngredientId, Requirement>,
        as_of: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let mut first_shortage: Option<OrderError> = None;

        for (&ingredient_id, requirement) in requirements {
            let level = self.ledger.level_at(ingredient_id, as_of)?;

            if let Some(unit) = level.unit {
                if unit != requirement.unit {
                    return Err(LedgerError::UnitMismatch {
                        ingredient_id,
                        expected: unit,
                        found: requirement.unit,
                    }
                    .into());
                }
            }

            if requirement.quantity > level.quantity {
                warn!(
                    ingredient_id = %ingredient_id,
                    required = %requirement.quantity,
                    available = %level.quantity,
                    "insufficient stock"
                );
                if first_shortage.is_none() {
                    first_shortage = Some(OrderError::InsufficientStock {
                        ingredient_id,
                        required: requirement.quantity,
                        available: level.quantity,
                    });
                }
            }
        }

        match first_shortage {
            Some(shortage) => Err(shortage),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brigade_catalog::{Dish, DishCategory, InMemoryCatalog, RecipeLine};
    use brigade_ledger::{InMemoryStockLedger, NewMovement};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn dish_with_recipe(recipe: Vec<RecipeLine>) -> Dish {
        Dish {
            id: DishId::new(),
            name: "Dish".to_string(),
            category: DishCategory::Main,
            selling_price: 12_000,
            recipe,
        }
    }

    fn setup() -> (Arc<InMemoryCatalog>, Arc<InMemoryStockLedger>) {
        (
            Arc::new(InMemoryCatalog::new()),
            Arc::new(InMemoryStockLedger::new()),
        )
    }

    #[test]
    fn requirements_aggregate_across_lines_sharing_an_ingredient() {
        let (catalog, ledger) = setup();
        let chicken = IngredientId::new();

        let grilled = dish_with_recipe(vec![RecipeLine {
            ingredient_id: chicken,
            quantity: dec!(1.00),
            unit: Unit::Kg,
        }]);
        let skewers = dish_with_recipe(vec![RecipeLine {
            ingredient_id: chicken,
            quantity: dec!(0.25),
            unit: Unit::Kg,
        }]);
        let grilled_id = grilled.id;
        let skewers_id = skewers.id;
        catalog.insert_dish(grilled);
        catalog.insert_dish(skewers);

        let validator = OrderValidator::new(catalog, ledger);
        let requirements = validator
            .expand_requirements(&[
                OrderLineRequest::new(grilled_id, 2),
                OrderLineRequest::new(skewers_id, 4),
            ])
            .unwrap();

        assert_eq!(requirements.len(), 1);
        let requirement = &requirements[&chicken];
        assert_eq!(requirement.quantity, dec!(3.00));
        assert_eq!(requirement.unit, Unit::Kg);
    }

    #[test]
    fn unknown_dish_propagates_unchanged() {
        let (catalog, ledger) = setup();
        let missing = DishId::new();

        let validator = OrderValidator::new(catalog, ledger);
        let err = validator
            .expand_requirements(&[OrderLineRequest::new(missing, 1)])
            .unwrap_err();

        match err {
            OrderError::UnknownDish(id) => assert_eq!(id, missing),
            other => panic!("expected UnknownDish, got {other:?}"),
        }
    }

    #[test]
    fn exact_equality_is_sufficient() {
        let (catalog, ledger) = setup();
        let chicken = IngredientId::new();
        ledger
            .append(NewMovement::inbound(chicken, dec!(2), Unit::Kg, Utc::now()))
            .unwrap();

        let mut requirements = BTreeMap::new();
        requirements.insert(
            chicken,
            Requirement {
                quantity: dec!(2),
                unit: Unit::Kg,
            },
        );

        let validator = OrderValidator::new(catalog, ledger);
        validator
            .check_sufficiency(&requirements, Utc::now())
            .unwrap();
    }

    #[test]
    fn shortage_reports_required_and_available() {
        let (catalog, ledger) = setup();
        let chicken = IngredientId::new();
        ledger
            .append(NewMovement::inbound(chicken, dec!(50), Unit::Kg, Utc::now()))
            .unwrap();

        let mut requirements = BTreeMap::new();
        requirements.insert(
            chicken,
            Requirement {
                quantity: dec!(100),
                unit: Unit::Kg,
            },
        );

        let validator = OrderValidator::new(catalog, ledger);
        let err = validator
            .check_sufficiency(&requirements, Utc::now())
            .unwrap_err();

        match err {
            OrderError::InsufficientStock {
                ingredient_id,
                required,
                available,
            } => {
                assert_eq!(ingredient_id, chicken);
                assert_eq!(required, dec!(100));
                assert_eq!(available, dec!(50));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn first_shortage_by_ascending_ingredient_id_is_reported() {
        let (catalog, ledger) = setup();
        let id_a = IngredientId::new();
        let id_b = IngredientId::new();
        let (low, high) = if id_a < id_b { (id_a, id_b) } else { (id_b, id_a) };

        // Both ingredients are short; neither has any stock.
        let mut requirements = BTreeMap::new();
        for id in [low, high] {
            requirements.insert(
                id,
                Requirement {
                    quantity: dec!(1),
                    unit: Unit::Kg,
                },
            );
        }

        let validator = OrderValidator::new(catalog, ledger);
        let err = validator
            .check_sufficiency(&requirements, Utc::now())
            .unwrap_err();

        match err {
            OrderError::InsufficientStock { ingredient_id, .. } => {
                assert_eq!(ingredient_id, low);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn requirement_unit_must_match_the_ledger_unit() {
        let (catalog, ledger) = setup();
        let butter = IngredientId::new();
        ledger
            .append(NewMovement::inbound(butter, dec!(15), Unit::Kg, Utc::now()))
            .unwrap();

        let mut requirements = BTreeMap::new();
        requirements.insert(
            butter,
            Requirement {
                quantity: dec!(200),
                unit: Unit::G,
            },
        );

        let validator = OrderValidator::new(catalog, ledger);
        let err = validator
            .check_sufficiency(&requirements, Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::Ledger(LedgerError::UnitMismatch { .. })));
    }
}
