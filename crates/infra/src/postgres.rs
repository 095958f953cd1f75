//! Postgres-backed stock ledger and order store.
//!
//! Schema provisioning and connection management are external concerns: the
//! adapter works against an existing schema and a caller-supplied pool.
//! Assumed tables:
//!
//! ```text
//! stock_movement   (id uuid PK, ingredient_id uuid, quantity numeric,
//!                   unit text, kind text, occurred_at timestamptz)
//! restaurant_order (id uuid PK, reference text UNIQUE, created_at timestamptz,
//!                   order_type text, status text)
//! dish_order       (order_id uuid REFERENCES restaurant_order, line_no int,
//!                   dish_id uuid, quantity int, unit_price bigint)
//! ```
//!
//! ## Concurrency
//!
//! `commit_order` serializes contending submissions with per-ingredient
//! advisory locks (`pg_advisory_xact_lock`), taken in ascending ingredient-id
//! order so two transactions can never deadlock on each other, and re-checks
//! the balance of every deducted ingredient inside the transaction. A
//! submission that lost the race observes the winner's deduction and aborts
//! with `InsufficientStock` instead of overdrawing.
//!
//! ## Sync trait impls
//!
//! `PgOrderStore` also implements the synchronous `StockLedger` and
//! `OrderRepository` traits by blocking on the current tokio runtime, so the
//! `OrderCoordinator` can run unchanged against Postgres from sync code that
//! has a runtime available. Async front ends should prefer the inherent
//! async methods (and `commit_order` for the single-transaction commit).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use brigade_core::{Entity, IngredientId, MovementId, OrderId, Unit};
use brigade_ledger::{
    LedgerError, NewMovement, StockLedger, StockLevel, StockMovement,
};
use brigade_orders::{
    DishOrder, Order, OrderError, OrderReference, OrderRepository, OrderStatus, OrderType,
    RepositoryError,
};

/// Postgres adapter for both sides of the order commit: the movement log and
/// the order rows.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: Arc<PgPool>,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Stock position of an ingredient as of `at`.
    ///
    /// The unit-consistency check spans the ingredient's whole stream, not
    /// just the movements up to `at`: a corrupt stream fails every read.
    #[instrument(skip(self), fields(ingredient_id = %ingredient_id), err)]
    pub async fn level_at(
        &self,
        ingredient_id: IngredientId,
        at: DateTime<Utc>,
    ) -> Result<StockLevel, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(quantity) FILTER (WHERE occurred_at <= $2), 0) AS quantity,
                COUNT(DISTINCT unit) AS unit_count,
                MIN(unit) AS first_unit,
                MAX(unit) AS last_unit
            FROM stock_movement
            WHERE ingredient_id = $1
            "#,
        )
        .bind(ingredient_id.as_uuid())
        .bind(at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_ledger_error("level_at", e))?;

        let unit_count: i64 = row
            .try_get("unit_count")
            .map_err(|e| LedgerError::Storage(format!("level_at: {e}")))?;
        let first_unit: Option<String> = row
            .try_get("first_unit")
            .map_err(|e| LedgerError::Storage(format!("level_at: {e}")))?;
        let last_unit: Option<String> = row
            .try_get("last_unit")
            .map_err(|e| LedgerError::Storage(format!("level_at: {e}")))?;

        if unit_count > 1 {
            return Err(LedgerError::UnitMismatch {
                ingredient_id,
                expected: parse_unit(first_unit.as_deref().unwrap_or_default())?,
                found: parse_unit(last_unit.as_deref().unwrap_or_default())?,
            });
        }

        let quantity: Decimal = row
            .try_get("quantity")
            .map_err(|e| LedgerError::Storage(format!("level_at: {e}")))?;
        let unit = match first_unit {
            Some(u) => Some(parse_unit(&u)?),
            None => None,
        };

        Ok(StockLevel { quantity, unit })
    }

    /// Append one movement (e.g. an external restock).
    pub async fn append(&self, movement: NewMovement) -> Result<StockMovement, LedgerError> {
        let mut committed = self.append_batch(vec![movement]).await?;
        Ok(committed.remove(0))
    }

    /// Append several movements in one transaction, all-or-nothing.
    #[instrument(skip(self, movements), fields(movement_count = movements.len()), err)]
    pub async fn append_batch(
        &self,
        movements: Vec<NewMovement>,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        if movements.is_empty() {
            return Ok(vec![]);
        }

        for movement in &movements {
            if movement.quantity.is_zero() {
                return Err(LedgerError::Validation(format!(
                    "zero quantity movement for ingredient {}",
                    movement.ingredient_id
                )));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_ledger_error("begin", e))?;

        let units = batch_units(&movements)?;
        lock_ingredients(&mut tx, units.keys().copied())
            .await
            .map_err(|e| map_ledger_error("lock_ingredients", e))?;

        for (&ingredient_id, &unit) in &units {
            check_stream_unit(&mut tx, ingredient_id, unit).await?;
        }

        // Non-negative stock invariant, checked under the advisory locks.
        let mut deltas: BTreeMap<IngredientId, Decimal> = BTreeMap::new();
        for movement in &movements {
            *deltas.entry(movement.ingredient_id).or_default() += movement.quantity;
        }
        for (&ingredient_id, &delta) in &deltas {
            if delta >= Decimal::ZERO {
                continue;
            }
            let available = ingredient_balance(&mut tx, ingredient_id)
                .await
                .map_err(|e| map_ledger_error("balance", e))?;
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
            insert_movement(&mut tx, &stored)
                .await
                .map_err(|e| map_ledger_error("insert_movement", e))?;
            committed.push(stored);
        }

        tx.commit()
            .await
            .map_err(|e| map_ledger_error("commit", e))?;

        Ok(committed)
    }

    /// Audit export: the full movement stream for one ingredient.
    #[instrument(skip(self), fields(ingredient_id = %ingredient_id), err)]
    pub async fn movements(
        &self,
        ingredient_id: IngredientId,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, ingredient_id, quantity, unit, kind, occurred_at
            FROM stock_movement
            WHERE ingredient_id = $1
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(ingredient_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_ledger_error("movements", e))?;

        let mut stream = Vec::with_capacity(rows.len());
        for row in rows {
            stream.push(movement_from_row(&row)?);
        }
        Ok(stream)
    }

    /// Persist an order and its lines (one transaction, no movements).
    #[instrument(skip(self, order), fields(reference = %order.reference()), err)]
    pub async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_repo_error("begin", e))?;

        insert_order(&mut tx, order).await?;

        tx.commit().await.map_err(|e| map_repo_error("commit", e))
    }

    /// Delete an order and its lines (compensation path).
    pub async fn remove_order(&self, id: OrderId) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_repo_error("begin", e))?;

        sqlx::query("DELETE FROM dish_order WHERE order_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_repo_error("remove_order", e))?;

        let deleted = sqlx::query("DELETE FROM restaurant_order WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_repo_error("remove_order", e))?;

        if deleted.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await.map_err(|e| map_repo_error("commit", e))
    }

    /// Retrieve a committed order with its lines.
    #[instrument(skip(self), err)]
    pub async fn find_order_by_reference(
        &self,
        reference: &str,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, reference, created_at, order_type, status
            FROM restaurant_order
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_repo_error("find_order_by_reference", e))?
        .ok_or(RepositoryError::NotFound)?;

        let id: uuid::Uuid = row
            .try_get("id")
            .map_err(|e| RepositoryError::Storage(format!("order row: {e}")))?;
        let reference: String = row
            .try_get("reference")
            .map_err(|e| RepositoryError::Storage(format!("order row: {e}")))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| RepositoryError::Storage(format!("order row: {e}")))?;
        let order_type: String = row
            .try_get("order_type")
            .map_err(|e| RepositoryError::Storage(format!("order row: {e}")))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| RepositoryError::Storage(format!("order row: {e}")))?;

        let line_rows = sqlx::query(
            r#"
            SELECT dish_id, quantity, unit_price
            FROM dish_order
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_repo_error("find_order_by_reference", e))?;

        let mut lines = Vec::with_capacity(line_rows.len());
        for line in line_rows {
            let dish_id: uuid::Uuid = line
                .try_get("dish_id")
                .map_err(|e| RepositoryError::Storage(format!("line row: {e}")))?;
            let quantity: i32 = line
                .try_get("quantity")
                .map_err(|e| RepositoryError::Storage(format!("line row: {e}")))?;
            let unit_price: i64 = line
                .try_get("unit_price")
                .map_err(|e| RepositoryError::Storage(format!("line row: {e}")))?;
            lines.push(DishOrder {
                dish_id: dish_id.into(),
                quantity: quantity as u32,
                unit_price: unit_price as u64,
            });
        }

        let order_type: OrderType = order_type
            .parse()
            .map_err(|e| RepositoryError::Storage(format!("order row: {e}")))?;
        let status: OrderStatus = status
            .parse()
            .map_err(|e| RepositoryError::Storage(format!("order row: {e}")))?;

        Order::restore(
            id.into(),
            OrderReference::new(reference),
            created_at,
            lines,
            order_type,
            status,
        )
        .map_err(|e| RepositoryError::Storage(format!("order restore: {e}")))
    }

    /// Commit an order and its outbound movements as one transaction.
    ///
    /// This is the strongest commit path: the order row, its lines and the
    /// ledger batch land atomically, with the sufficiency of every deducted
    /// ingredient re-checked under per-ingredient locks.
    #[instrument(
        skip(self, order, movements),
        fields(reference = %order.reference(), movement_count = movements.len()),
        err
    )]
    pub async fn commit_order(
        &self,
        order: &Order,
        movements: &[NewMovement],
    ) -> Result<(), OrderError> {
        let mut deltas: BTreeMap<IngredientId, Decimal> = BTreeMap::new();
        for movement in movements {
            if movement.quantity.is_zero() {
                return Err(OrderError::Ledger(LedgerError::Validation(format!(
                    "zero quantity movement for ingredient {}",
                    movement.ingredient_id
                ))));
            }
            *deltas.entry(movement.ingredient_id).or_default() += movement.quantity;
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderError::Persistence(format!("begin: {e}")))?;

        lock_ingredients(&mut tx, deltas.keys().copied())
            .await
            .map_err(|e| OrderError::Persistence(format!("lock_ingredients: {e}")))?;

        // Losing a race to another submission must surface as a shortage,
        // not an overdraft: re-derive each balance inside the transaction.
        for (&ingredient_id, &delta) in &deltas {
            if delta >= Decimal::ZERO {
                continue;
            }
            let available = ingredient_balance(&mut tx, ingredient_id)
                .await
                .map_err(|e| OrderError::Persistence(format!("recheck: {e}")))?;

            if available + delta < Decimal::ZERO {
                return Err(OrderError::InsufficientStock {
                    ingredient_id,
                    required: -delta,
                    available,
                });
            }
        }

        insert_order(&mut tx, order).await.map_err(|e| match e {
            RepositoryError::DuplicateReference(r) => {
                OrderError::Persistence(format!("order reference {r} already taken"))
            }
            other => OrderError::Persistence(other.to_string()),
        })?;

        for movement in movements {
            let stored = StockMovement {
                id: MovementId::new(),
                ingredient_id: movement.ingredient_id,
                quantity: movement.quantity,
                unit: movement.unit,
                kind: StockMovement::kind_of(movement.quantity),
                occurred_at: movement.occurred_at,
            };
            insert_movement(&mut tx, &stored)
                .await
                .map_err(|e| OrderError::Persistence(format!("insert_movement: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| OrderError::Persistence(format!("commit: {e}")))
    }

    fn runtime_handle<E>(make_err: impl FnOnce(String) -> E) -> Result<tokio::runtime::Handle, E> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            make_err(
                "PgOrderStore requires an async runtime (tokio); call from within a runtime context"
                    .to_string(),
            )
        })
    }
}

impl StockLedger for PgOrderStore {
    fn level_at(
        &self,
        ingredient_id: IngredientId,
        at: DateTime<Utc>,
    ) -> Result<StockLevel, LedgerError> {
        let handle = Self::runtime_handle(LedgerError::Storage)?;
        handle.block_on(self.level_at(ingredient_id, at))
    }

    fn append(&self, movement: NewMovement) -> Result<StockMovement, LedgerError> {
        let handle = Self::runtime_handle(LedgerError::Storage)?;
        handle.block_on(self.append(movement))
    }

    fn append_batch(
        &self,
        movements: Vec<NewMovement>,
    ) -> Result<Vec<StockMovement>, LedgerError> {
        let handle = Self::runtime_handle(LedgerError::Storage)?;
        handle.block_on(self.append_batch(movements))
    }

    fn movements(&self, ingredient_id: IngredientId) -> Result<Vec<StockMovement>, LedgerError> {
        let handle = Self::runtime_handle(LedgerError::Storage)?;
        handle.block_on(self.movements(ingredient_id))
    }
}

impl OrderRepository for PgOrderStore {
    fn save(&self, order: Order) -> Result<Order, RepositoryError> {
        let handle = Self::runtime_handle(RepositoryError::Storage)?;
        handle.block_on(self.save_order(&order))?;
        Ok(order)
    }

    fn find_by_reference(&self, reference: &str) -> Result<Order, RepositoryError> {
        let handle = Self::runtime_handle(RepositoryError::Storage)?;
        handle.block_on(self.find_order_by_reference(reference))
    }

    fn remove(&self, id: OrderId) -> Result<(), RepositoryError> {
        let handle = Self::runtime_handle(RepositoryError::Storage)?;
        handle.block_on(self.remove_order(id))
    }
}

/// Distinct unit per ingredient within the batch; conflicting units inside
/// the batch fail before any IO.
fn batch_units(movements: &[NewMovement]) -> Result<BTreeMap<IngredientId, Unit>, LedgerError> {
    let mut units: BTreeMap<IngredientId, Unit> = BTreeMap::new();
    for movement in movements {
        if let Some(&expected) = units.get(&movement.ingredient_id) {
            if expected != movement.unit {
                return Err(LedgerError::UnitMismatch {
                    ingredient_id: movement.ingredient_id,
                    expected,
                    found: movement.unit,
                });
            }
        } else {
            units.insert(movement.ingredient_id, movement.unit);
        }
    }
    Ok(units)
}

/// Take per-ingredient advisory locks in ascending id order (deadlock-free).
async fn lock_ingredients(
    tx: &mut Transaction<'_, Postgres>,
    ingredient_ids: impl Iterator<Item = IngredientId>,
) -> Result<(), sqlx::Error> {
    for ingredient_id in ingredient_ids {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(ingredient_id.as_uuid())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Current whole-stream balance of one ingredient.
async fn ingredient_balance(
    tx: &mut Transaction<'_, Postgres>,
    ingredient_id: IngredientId,
) -> Result<Decimal, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(quantity), 0) AS quantity FROM stock_movement WHERE ingredient_id = $1",
    )
    .bind(ingredient_id.as_uuid())
    .fetch_one(&mut **tx)
    .await?;
    row.try_get("quantity")
}

/// Fail fast when the ingredient's existing stream uses a different unit.
async fn check_stream_unit(
    tx: &mut Transaction<'_, Postgres>,
    ingredient_id: IngredientId,
    unit: Unit,
) -> Result<(), LedgerError> {
    let rows = sqlx::query("SELECT DISTINCT unit FROM stock_movement WHERE ingredient_id = $1")
        .bind(ingredient_id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_ledger_error("check_stream_unit", e))?;

    for row in rows {
        let existing: String = row
            .try_get("unit")
            .map_err(|e| LedgerError::Storage(format!("check_stream_unit: {e}")))?;
        let existing = parse_unit(&existing)?;
        if existing != unit {
            return Err(LedgerError::UnitMismatch {
                ingredient_id,
                expected: existing,
                found: unit,
            });
        }
    }
    Ok(())
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: &StockMovement,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO stock_movement (id, ingredient_id, quantity, unit, kind, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(movement.id.as_uuid())
    .bind(movement.ingredient_id.as_uuid())
    .bind(movement.quantity)
    .bind(movement.unit.to_string())
    .bind(movement.kind.to_string())
    .bind(movement.occurred_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO restaurant_order (id, reference, created_at, order_type, status)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Entity::id(order).as_uuid())
    .bind(order.reference().as_str())
    .bind(order.created_at())
    .bind(order.order_type().to_string())
    .bind(order.status().to_string())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            RepositoryError::DuplicateReference(order.reference().as_str().to_string())
        } else {
            map_repo_error("insert_order", e)
        }
    })?;

    for (i, line) in order.lines().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO dish_order (order_id, line_no, dish_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Entity::id(order).as_uuid())
        .bind((i + 1) as i32)
        .bind(line.dish_id.as_uuid())
        .bind(line.quantity as i32)
        .bind(line.unit_price as i64)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_repo_error("insert_line", e))?;
    }

    Ok(())
}

fn movement_from_row(row: &sqlx::postgres::PgRow) -> Result<StockMovement, LedgerError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| LedgerError::Storage(format!("movement row: {e}")))?;
    let ingredient_id: uuid::Uuid = row
        .try_get("ingredient_id")
        .map_err(|e| LedgerError::Storage(format!("movement row: {e}")))?;
    let quantity: Decimal = row
        .try_get("quantity")
        .map_err(|e| LedgerError::Storage(format!("movement row: {e}")))?;
    let unit: String = row
        .try_get("unit")
        .map_err(|e| LedgerError::Storage(format!("movement row: {e}")))?;
    let kind: String = row
        .try_get("kind")
        .map_err(|e| LedgerError::Storage(format!("movement row: {e}")))?;
    let occurred_at: DateTime<Utc> = row
        .try_get("occurred_at")
        .map_err(|e| LedgerError::Storage(format!("movement row: {e}")))?;

    Ok(StockMovement {
        id: id.into(),
        ingredient_id: ingredient_id.into(),
        quantity,
        unit: parse_unit(&unit)?,
        kind: kind
            .parse()
            .map_err(|_| LedgerError::Storage(format!("corrupt kind in stock_movement: {kind}")))?,
        occurred_at,
    })
}

fn parse_unit(s: &str) -> Result<Unit, LedgerError> {
    s.parse()
        .map_err(|_| LedgerError::Storage(format!("corrupt unit in stock_movement: {s}")))
}

fn map_ledger_error(operation: &str, err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(format!("{operation}: {err}"))
}

fn map_repo_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(format!("{operation}: {err}"))
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
