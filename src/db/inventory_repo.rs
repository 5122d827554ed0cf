// src/db/inventory_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};

use crate::{
    common::error::AppError,
    models::inventory::{
        ReservationRow, StockCommitment, StockMovement, StockMovementReason, StockPart,
    },
};

#[derive(Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Funções de "Leitura" (Getters)
    // ---

    pub async fn list_parts(&self) -> Result<Vec<StockPart>, AppError> {
        let parts = sqlx::query_as::<_, StockPart>("SELECT * FROM stock_parts ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(parts)
    }

    pub async fn find_part<'e, E>(
        &self,
        executor: E,
        part_id: i64,
    ) -> Result<Option<StockPart>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let part = sqlx::query_as::<_, StockPart>("SELECT * FROM stock_parts WHERE id = $1")
            .bind(part_id)
            .fetch_optional(executor)
            .await?;
        Ok(part)
    }

    pub async fn lock_part<'e, E>(
        &self,
        executor: E,
        part_id: i64,
    ) -> Result<Option<StockPart>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let part = sqlx::query_as::<_, StockPart>("SELECT * FROM stock_parts WHERE id = $1 FOR UPDATE")
            .bind(part_id)
            .fetch_optional(executor)
            .await?;
        Ok(part)
    }

    /// Itens de OS ligados à peça, com o status da OS e quanto já foi baixado.
    /// A reserva é calculada a partir destas linhas; não existe contador gravado.
    pub async fn reservation_rows<'e, E>(
        &self,
        executor: E,
        part_id: i64,
    ) -> Result<Vec<ReservationRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT
                o.status AS os_status,
                i.quantity,
                COALESCE(c.quantity, 0) AS committed
            FROM os_items i
            JOIN service_orders o ON o.id = i.os_id
            LEFT JOIN stock_commitments c
                ON c.os_id = i.os_id AND c.item_id = i.id AND c.part_id = i.part_id
            WHERE i.part_id = $1
            "#,
        )
        .bind(part_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn list_commitments<'e, E>(
        &self,
        executor: E,
        os_id: i64,
    ) -> Result<Vec<StockCommitment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let commitments = sqlx::query_as::<_, StockCommitment>(
            r#"
            SELECT os_id, item_id, part_id, quantity
            FROM stock_commitments
            WHERE os_id = $1
            ORDER BY part_id, item_id
            FOR UPDATE
            "#,
        )
        .bind(os_id)
        .fetch_all(executor)
        .await?;
        Ok(commitments)
    }

    // ---
    // Funções de "Escrita" (Transacionais)
    // ---

    pub async fn create_part<'e, E>(
        &self,
        executor: E,
        name: &str,
        ref_code: Option<&str>,
        on_hand: Decimal,
        min_stock: Decimal,
        cost_price: Decimal,
        sale_price: Decimal,
    ) -> Result<StockPart, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let part = sqlx::query_as::<_, StockPart>(
            r#"
            INSERT INTO stock_parts (name, ref_code, on_hand, min_stock, cost_price, sale_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(ref_code)
        .bind(on_hand)
        .bind(min_stock)
        .bind(cost_price)
        .bind(sale_price)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return AppError::RefCodeAlreadyExists(ref_code.unwrap_or_default().to_string());
                }
            }
            e.into()
        })?;
        Ok(part)
    }

    /// Soma (ou subtrai) `delta` do estoque físico numa única instrução atômica.
    pub async fn adjust_on_hand<'e, E>(
        &self,
        executor: E,
        part_id: i64,
        delta: Decimal,
        new_cost_price: Option<Decimal>,
    ) -> Result<StockPart, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let part = sqlx::query_as::<_, StockPart>(
            r#"
            UPDATE stock_parts
            SET on_hand = on_hand + $2,
                cost_price = COALESCE($3, cost_price),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(part_id)
        .bind(delta)
        .bind(new_cost_price)
        .fetch_optional(executor)
        .await?;

        part.ok_or_else(|| AppError::ResourceNotFound(format!("Peça {}", part_id)))
    }

    /// Grava a quantidade baixada para o item (chave OS + item + peça).
    pub async fn upsert_commitment<'e, E>(
        &self,
        executor: E,
        os_id: i64,
        item_id: i64,
        part_id: i64,
        quantity: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO stock_commitments (os_id, item_id, part_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (os_id, item_id, part_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            "#,
        )
        .bind(os_id)
        .bind(item_id)
        .bind(part_id)
        .bind(quantity)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Registra uma movimentação no histórico (auditoria).
    pub async fn record_stock_movement<'e, E>(
        &self,
        executor: E,
        part_id: i64,
        os_id: Option<i64>,
        quantity_changed: Decimal,
        reason: StockMovementReason,
        notes: Option<&str>,
    ) -> Result<StockMovement, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let movement = sqlx::query_as::<_, StockMovement>(
            r#"
            INSERT INTO stock_movements (part_id, os_id, quantity_changed, reason, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, part_id, os_id, quantity_changed, reason, notes, created_at
            "#,
        )
        .bind(part_id)
        .bind(os_id)
        .bind(quantity_changed)
        .bind(reason)
        .bind(notes)
        .fetch_one(executor)
        .await?;
        Ok(movement)
    }
}
