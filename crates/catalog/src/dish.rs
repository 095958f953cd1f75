use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use brigade_core::{DishId, Entity, IngredientId, Unit};

/// Menu placement of a dish.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DishCategory {
    Starter,
    Main,
    Dessert,
}

/// One line of a dish's recipe: the quantity of an ingredient consumed per
/// unit of the dish sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
    pub unit: Unit,
}

/// Catalog entry: a dish and its fixed recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dish {
    pub id: DishId,
    pub name: String,
    pub category: DishCategory,
    /// Selling price in smallest currency unit.
    pub selling_price: u64,
    pub recipe: Vec<RecipeLine>,
}

impl Entity for Dish {
    type Id = DishId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
