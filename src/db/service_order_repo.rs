// src/db/service_order_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};

use crate::{
    common::error::AppError,
    models::service_order::{LaborService, OsItem, OsStatus, ServiceOrder},
};

/// Campos gravados de um item; o total nunca é persistido.
#[derive(Debug, Clone)]
pub struct OsItemFields<'a> {
    pub part_id: Option<i64>,
    pub description: &'a str,
    pub ref_code: Option<&'a str>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Clone)]
pub struct ServiceOrderRepository {
    pool: PgPool,
}

impl ServiceOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  ORDENS DE SERVIÇO
    // =========================================================================

    pub async fn list_orders(&self, status: Option<OsStatus>) -> Result<Vec<ServiceOrder>, AppError> {
        let orders = sqlx::query_as::<_, ServiceOrder>(
            r#"
            SELECT * FROM service_orders
            WHERE ($1::os_status IS NULL OR status = $1)
            ORDER BY opened_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    pub async fn create_order<'e, E>(
        &self,
        executor: E,
        client_id: Option<i64>,
        vehicle_id: Option<i64>,
        status: OsStatus,
        notes: Option<&str>,
    ) -> Result<ServiceOrder, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, ServiceOrder>(
            r#"
            INSERT INTO service_orders (client_id, vehicle_id, status, notes)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(client_id)
        .bind(vehicle_id)
        .bind(status)
        .bind(notes)
        .fetch_one(executor)
        .await?;
        Ok(order)
    }

    pub async fn find_order<'e, E>(
        &self,
        executor: E,
        os_id: i64,
    ) -> Result<Option<ServiceOrder>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, ServiceOrder>("SELECT * FROM service_orders WHERE id = $1")
            .bind(os_id)
            .fetch_optional(executor)
            .await?;
        Ok(order)
    }

    /// Trava a linha da OS até o fim da transação.
    /// Toda mutação da OS passa por aqui, o que serializa edições concorrentes.
    pub async fn lock_order<'e, E>(
        &self,
        executor: E,
        os_id: i64,
    ) -> Result<ServiceOrder, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, ServiceOrder>("SELECT * FROM service_orders WHERE id = $1 FOR UPDATE")
            .bind(os_id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("OS {}", os_id)))
    }

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        os_id: i64,
        status: OsStatus,
    ) -> Result<ServiceOrder, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, ServiceOrder>(
            r#"
            UPDATE service_orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(os_id)
        .bind(status)
        .fetch_one(executor)
        .await?;
        Ok(order)
    }

    pub async fn freeze_snapshot<'e, E>(
        &self,
        executor: E,
        os_id: i64,
        parts_total: Decimal,
        labor_total: Decimal,
        client_total: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE service_orders
            SET parts_total = $2, labor_total = $3, client_total = $4
            WHERE id = $1
            "#,
        )
        .bind(os_id)
        .bind(parts_total)
        .bind(labor_total)
        .bind(client_total)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Reabertura: a OS volta a ter totais calculados ao vivo.
    pub async fn clear_snapshot<'e, E>(&self, executor: E, os_id: i64) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE service_orders
            SET parts_total = NULL, labor_total = NULL, client_total = NULL, delivered_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(os_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn mark_delivered<'e, E>(&self, executor: E, os_id: i64) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE service_orders SET delivered_at = NOW() WHERE id = $1")
            .bind(os_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    // =========================================================================
    //  ITENS
    // =========================================================================

    pub async fn list_items<'e, E>(&self, executor: E, os_id: i64) -> Result<Vec<OsItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let items = sqlx::query_as::<_, OsItem>(
            r#"
            SELECT id, os_id, part_id, description, ref_code, quantity, unit_price, created_at
            FROM os_items
            WHERE os_id = $1
            ORDER BY id
            "#,
        )
        .bind(os_id)
        .fetch_all(executor)
        .await?;
        Ok(items)
    }

    pub async fn find_item<'e, E>(&self, executor: E, item_id: i64) -> Result<Option<OsItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, OsItem>(
            r#"
            SELECT id, os_id, part_id, description, ref_code, quantity, unit_price, created_at
            FROM os_items
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(executor)
        .await?;
        Ok(item)
    }

    pub async fn insert_item<'e, E>(
        &self,
        executor: E,
        os_id: i64,
        fields: &OsItemFields<'_>,
    ) -> Result<OsItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, OsItem>(
            r#"
            INSERT INTO os_items (os_id, part_id, description, ref_code, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, os_id, part_id, description, ref_code, quantity, unit_price, created_at
            "#,
        )
        .bind(os_id)
        .bind(fields.part_id)
        .bind(fields.description)
        .bind(fields.ref_code)
        .bind(fields.quantity)
        .bind(fields.unit_price)
        .fetch_one(executor)
        .await?;
        Ok(item)
    }

    pub async fn update_item<'e, E>(
        &self,
        executor: E,
        item_id: i64,
        fields: &OsItemFields<'_>,
    ) -> Result<OsItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, OsItem>(
            r#"
            UPDATE os_items
            SET part_id = $2, description = $3, ref_code = $4,
                quantity = $5, unit_price = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING id, os_id, part_id, description, ref_code, quantity, unit_price, created_at
            "#,
        )
        .bind(item_id)
        .bind(fields.part_id)
        .bind(fields.description)
        .bind(fields.ref_code)
        .bind(fields.quantity)
        .bind(fields.unit_price)
        .fetch_one(executor)
        .await?;
        Ok(item)
    }

    pub async fn delete_item<'e, E>(&self, executor: E, item_id: i64) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM os_items WHERE id = $1")
            .bind(item_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    // =========================================================================
    //  MÃO DE OBRA
    // =========================================================================

    pub async fn list_labor<'e, E>(&self, executor: E, os_id: i64) -> Result<Vec<LaborService>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let labor = sqlx::query_as::<_, LaborService>(
            "SELECT * FROM os_labor WHERE os_id = $1 ORDER BY id",
        )
        .bind(os_id)
        .fetch_all(executor)
        .await?;
        Ok(labor)
    }

    pub async fn find_labor<'e, E>(
        &self,
        executor: E,
        labor_id: i64,
    ) -> Result<Option<LaborService>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let labor = sqlx::query_as::<_, LaborService>("SELECT * FROM os_labor WHERE id = $1")
            .bind(labor_id)
            .fetch_optional(executor)
            .await?;
        Ok(labor)
    }

    pub async fn insert_labor<'e, E>(
        &self,
        executor: E,
        os_id: i64,
        description: &str,
        amount: Decimal,
        employee_id: Option<i64>,
    ) -> Result<LaborService, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let labor = sqlx::query_as::<_, LaborService>(
            r#"
            INSERT INTO os_labor (os_id, description, amount, employee_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(os_id)
        .bind(description)
        .bind(amount)
        .bind(employee_id)
        .fetch_one(executor)
        .await?;
        Ok(labor)
    }

    pub async fn delete_labor<'e, E>(&self, executor: E, labor_id: i64) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM os_labor WHERE id = $1")
            .bind(labor_id)
            .execute(executor)
            .await?;
        Ok(())
    }
}
