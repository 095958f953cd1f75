//! `brigade-catalog` — read-only dish/ingredient catalog.
//!
//! The catalog is an external collaborator from the ledger's point of view:
//! it resolves identifiers to immutable catalog attributes (names, prices,
//! recipes) and nothing here ever touches stock.

pub mod dish;
pub mod ingredient;
pub mod lookup;

pub use dish::{Dish, DishCategory, RecipeLine};
pub use ingredient::{Ingredient, IngredientCategory};
pub use lookup::{CatalogError, CatalogLookup, InMemoryCatalog};
