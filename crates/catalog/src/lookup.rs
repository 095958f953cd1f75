//! Identifier-keyed catalog resolution.
//!
//! Dish/ingredient relationships are navigated through explicit lookups
//! rather than object references, which keeps the ledger and the order
//! pipeline decoupled from how the catalog is stored.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use thiserror::Error;

use brigade_core::{DishId, IngredientId};

use crate::dish::Dish;
use crate::ingredient::Ingredient;

/// Catalog resolution failure.
///
/// These are data problems, not transient faults: callers surface them
/// unchanged and never retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown dish: {0}")]
    UnknownDish(DishId),

    #[error("unknown ingredient: {0}")]
    UnknownIngredient(IngredientId),
}

/// Read-only catalog resolution.
pub trait CatalogLookup: Send + Sync {
    /// Resolve a dish id to its catalog entry (name, price, recipe).
    fn dish_by_id(&self, id: DishId) -> Result<Dish, CatalogError>;

    /// Resolve an ingredient id to its catalog entry.
    fn ingredient_by_id(&self, id: IngredientId) -> Result<Ingredient, CatalogError>;

    /// Ingredient cost of one unit of a dish: the sum over the recipe of
    /// ingredient price times required quantity.
    fn dish_cost(&self, id: DishId) -> Result<Decimal, CatalogError> {
        let dish = self.dish_by_id(id)?;
        let mut cost = Decimal::ZERO;
        for line in &dish.recipe {
            let ingredient = self.ingredient_by_id(line.ingredient_id)?;
            cost += Decimal::from(ingredient.price) * line.quantity;
        }
        Ok(cost)
    }
}

impl<C> CatalogLookup for &C
where
    C: CatalogLookup + ?Sized,
{
    fn dish_by_id(&self, id: DishId) -> Result<Dish, CatalogError> {
        (**self).dish_by_id(id)
    }

    fn ingredient_by_id(&self, id: IngredientId) -> Result<Ingredient, CatalogError> {
        (**self).ingredient_by_id(id)
    }
}

impl<C> CatalogLookup for Arc<C>
where
    C: CatalogLookup + ?Sized,
{
    fn dish_by_id(&self, id: DishId) -> Result<Dish, CatalogError> {
        (**self).dish_by_id(id)
    }

    fn ingredient_by_id(&self, id: IngredientId) -> Result<Ingredient, CatalogError> {
        (**self).ingredient_by_id(id)
    }
}

/// In-memory catalog for tests/dev.
///
/// Seeding/administration of catalog entries is an external concern; the
/// insert methods exist so tests and dev wiring can populate the catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    dishes: RwLock<HashMap<DishId, Dish>>,
    ingredients: RwLock<HashMap<IngredientId, Ingredient>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_dish(&self, dish: Dish) {
        if let Ok(mut dishes) = self.dishes.write() {
            dishes.insert(dish.id, dish);
        }
    }

    pub fn insert_ingredient(&self, ingredient: Ingredient) {
        if let Ok(mut ingredients) = self.ingredients.write() {
            ingredients.insert(ingredient.id, ingredient);
        }
    }
}

impl CatalogLookup for InMemoryCatalog {
    fn dish_by_id(&self, id: DishId) -> Result<Dish, CatalogError> {
        self.dishes
            .read()
            .ok()
            .and_then(|m| m.get(&id).cloned())
            .ok_or(CatalogError::UnknownDish(id))
    }

    fn ingredient_by_id(&self, id: IngredientId) -> Result<Ingredient, CatalogError> {
        self.ingredients
            .read()
            .ok()
            .and_then(|m| m.get(&id).cloned())
            .ok_or(CatalogError::UnknownIngredient(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dish::{DishCategory, RecipeLine};
    use crate::ingredient::IngredientCategory;
    use brigade_core::Unit;
    use rust_decimal_macros::dec;

    fn lettuce(id: IngredientId) -> Ingredient {
        Ingredient {
            id,
            name: "Lettuce".to_string(),
            category: IngredientCategory::Vegetable,
            price: 800,
            unit: Unit::Kg,
        }
    }

    fn tomato(id: IngredientId) -> Ingredient {
        Ingredient {
            id,
            name: "Tomato".to_string(),
            category: IngredientCategory::Vegetable,
            price: 600,
            unit: Unit::Kg,
        }
    }

    fn salad(id: DishId, lettuce_id: IngredientId, tomato_id: IngredientId) -> Dish {
        Dish {
            id,
            name: "Fresh salad".to_string(),
            category: DishCategory::Starter,
            selling_price: 3500,
            recipe: vec![
                RecipeLine {
                    ingredient_id: lettuce_id,
                    quantity: dec!(0.20),
                    unit: Unit::Kg,
                },
                RecipeLine {
                    ingredient_id: tomato_id,
                    quantity: dec!(0.15),
                    unit: Unit::Kg,
                },
            ],
        }
    }

    #[test]
    fn resolves_inserted_entries() {
        let catalog = InMemoryCatalog::new();
        let lettuce_id = IngredientId::new();
        catalog.insert_ingredient(lettuce(lettuce_id));

        let found = catalog.ingredient_by_id(lettuce_id).unwrap();
        assert_eq!(found.name, "Lettuce");
        assert_eq!(found.unit, Unit::Kg);
    }

    #[test]
    fn unknown_ids_fail_with_the_missing_id() {
        let catalog = InMemoryCatalog::new();
        let dish_id = DishId::new();

        match catalog.dish_by_id(dish_id) {
            Err(CatalogError::UnknownDish(id)) => assert_eq!(id, dish_id),
            other => panic!("expected UnknownDish, got {other:?}"),
        }
    }

    #[test]
    fn dish_cost_sums_priced_recipe_lines() {
        let catalog = InMemoryCatalog::new();
        let lettuce_id = IngredientId::new();
        let tomato_id = IngredientId::new();
        let dish_id = DishId::new();

        catalog.insert_ingredient(lettuce(lettuce_id));
        catalog.insert_ingredient(tomato(tomato_id));
        catalog.insert_dish(salad(dish_id, lettuce_id, tomato_id));

        // 800 * 0.20 + 600 * 0.15 = 160 + 90
        assert_eq!(catalog.dish_cost(dish_id).unwrap(), dec!(250));
    }

    #[test]
    fn dish_cost_fails_on_unknown_recipe_ingredient() {
        let catalog = InMemoryCatalog::new();
        let lettuce_id = IngredientId::new();
        let tomato_id = IngredientId::new();
        let dish_id = DishId::new();

        // Tomato referenced by the recipe but never inserted.
        catalog.insert_ingredient(lettuce(lettuce_id));
        catalog.insert_dish(salad(dish_id, lettuce_id, tomato_id));

        match catalog.dish_cost(dish_id) {
            Err(CatalogError::UnknownIngredient(id)) => assert_eq!(id, tomato_id),
            other => panic!("expected UnknownIngredient, got {other:?}"),
        }
    }
}
