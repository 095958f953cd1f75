use serde::{Deserialize, Serialize};

use brigade_core::{Entity, IngredientId, Unit};

/// Coarse ingredient classification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IngredientCategory {
    Vegetable,
    Animal,
    Dairy,
    Other,
}

/// Catalog entry: an ingredient.
///
/// Stock is deliberately **not** a field here; it is derived from the stock
/// ledger's movement stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub category: IngredientCategory,
    /// Purchase price in smallest currency unit.
    pub price: u64,
    /// Unit this ingredient is stocked and measured in.
    pub unit: Unit,
}

impl Entity for Ingredient {
    type Id = IngredientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
