// src/db/finance_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};

use crate::{
    common::error::AppError,
    models::finance::{
        CardOperator, CashBookEntry, CashBookOrigin, ClientPayment, InstallmentRate,
        PaymentMethod, PaymentStatus,
    },
};

/// Campos editáveis de uma operadora.
#[derive(Debug, Clone)]
pub struct CardOperatorFields<'a> {
    pub name: &'a str,
    pub debit_rate: Option<Decimal>,
    pub debit_days: Option<i32>,
    pub credit_rate: Option<Decimal>,
    pub credit_days: Option<i32>,
    pub installment_rate: Option<Decimal>,
    pub installment_days: Option<i32>,
    pub anticipation_rate: Decimal,
    pub auto_anticipation: bool,
    pub active: bool,
}

/// Dados gravados de um pagamento recém-registrado.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub os_id: i64,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub installments: i32,
    pub operator_id: Option<i64>,
    pub paid_on: NaiveDate,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub settlement_date: Option<NaiveDate>,
    pub anticipated: bool,
    pub status: PaymentStatus,
}

// Converte violação de nome único num erro de cadastro mais amigável
fn operator_conflict(e: sqlx::Error, name: &str) -> AppError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return AppError::InvalidOperatorConfig(format!("já existe uma operadora '{}'", name));
        }
    }
    AppError::DatabaseError(e)
}

#[derive(Clone)]
pub struct FinanceRepository {
    pool: PgPool,
}

impl FinanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  OPERADORAS DE CARTÃO
    // =========================================================================

    pub async fn create_operator<'e, E>(
        &self,
        executor: E,
        fields: &CardOperatorFields<'_>,
    ) -> Result<CardOperator, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let operator = sqlx::query_as::<_, CardOperator>(
            r#"
            INSERT INTO card_operators (
                name, debit_rate, debit_days, credit_rate, credit_days,
                installment_rate, installment_days, anticipation_rate,
                auto_anticipation, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(fields.name)
        .bind(fields.debit_rate)
        .bind(fields.debit_days)
        .bind(fields.credit_rate)
        .bind(fields.credit_days)
        .bind(fields.installment_rate)
        .bind(fields.installment_days)
        .bind(fields.anticipation_rate)
        .bind(fields.auto_anticipation)
        .bind(fields.active)
        .fetch_one(executor)
        .await
        .map_err(|e| operator_conflict(e, fields.name))?;
        Ok(operator)
    }

    pub async fn update_operator<'e, E>(
        &self,
        executor: E,
        operator_id: i64,
        fields: &CardOperatorFields<'_>,
    ) -> Result<CardOperator, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, CardOperator>(
            r#"
            UPDATE card_operators
            SET name = $2, debit_rate = $3, debit_days = $4,
                credit_rate = $5, credit_days = $6,
                installment_rate = $7, installment_days = $8,
                anticipation_rate = $9, auto_anticipation = $10, active = $11,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(operator_id)
        .bind(fields.name)
        .bind(fields.debit_rate)
        .bind(fields.debit_days)
        .bind(fields.credit_rate)
        .bind(fields.credit_days)
        .bind(fields.installment_rate)
        .bind(fields.installment_days)
        .bind(fields.anticipation_rate)
        .bind(fields.auto_anticipation)
        .bind(fields.active)
        .fetch_optional(executor)
        .await
        .map_err(|e| operator_conflict(e, fields.name))?
        .ok_or_else(|| AppError::ResourceNotFound(format!("Operadora {}", operator_id)))
    }

    pub async fn find_operator<'e, E>(
        &self,
        executor: E,
        operator_id: i64,
    ) -> Result<Option<CardOperator>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let operator = sqlx::query_as::<_, CardOperator>("SELECT * FROM card_operators WHERE id = $1")
            .bind(operator_id)
            .fetch_optional(executor)
            .await?;
        Ok(operator)
    }

    pub async fn list_operators(&self) -> Result<Vec<CardOperator>, AppError> {
        let operators = sqlx::query_as::<_, CardOperator>("SELECT * FROM card_operators ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(operators)
    }

    pub async fn list_installment_rates<'e, E>(
        &self,
        executor: E,
        operator_id: i64,
    ) -> Result<Vec<InstallmentRate>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rates = sqlx::query_as::<_, InstallmentRate>(
            r#"
            SELECT operator_id, installments, total_rate, anticipation_rate
            FROM card_operator_installment_rates
            WHERE operator_id = $1
            ORDER BY installments
            "#,
        )
        .bind(operator_id)
        .fetch_all(executor)
        .await?;
        Ok(rates)
    }

    /// Todas as taxas por parcela, para montar a listagem sem N+1.
    pub async fn list_all_installment_rates(&self) -> Result<Vec<InstallmentRate>, AppError> {
        let rates = sqlx::query_as::<_, InstallmentRate>(
            r#"
            SELECT operator_id, installments, total_rate, anticipation_rate
            FROM card_operator_installment_rates
            ORDER BY operator_id, installments
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rates)
    }

    /// Substitui a tabela de taxas por parcela da operadora.
    pub async fn replace_installment_rates(
        &self,
        conn: &mut PgConnection,
        operator_id: i64,
        rates: &[InstallmentRate],
    ) -> Result<Vec<InstallmentRate>, AppError> {
        sqlx::query("DELETE FROM card_operator_installment_rates WHERE operator_id = $1")
            .bind(operator_id)
            .execute(&mut *conn)
            .await?;

        let mut saved = Vec::with_capacity(rates.len());
        for rate in rates {
            let row = sqlx::query_as::<_, InstallmentRate>(
                r#"
                INSERT INTO card_operator_installment_rates
                    (operator_id, installments, total_rate, anticipation_rate)
                VALUES ($1, $2, $3, $4)
                RETURNING operator_id, installments, total_rate, anticipation_rate
                "#,
            )
            .bind(operator_id)
            .bind(rate.installments)
            .bind(rate.total_rate)
            .bind(rate.anticipation_rate)
            .fetch_one(&mut *conn)
            .await?;
            saved.push(row);
        }
        Ok(saved)
    }

    // =========================================================================
    //  PAGAMENTOS DO CLIENTE
    // =========================================================================

    pub async fn insert_payment<'e, E>(
        &self,
        executor: E,
        payment: &NewPayment,
    ) -> Result<ClientPayment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, ClientPayment>(
            r#"
            INSERT INTO client_payments (
                os_id, amount, method, installments, operator_id, paid_on,
                fee_amount, net_amount, settlement_date, anticipated, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(payment.os_id)
        .bind(payment.amount)
        .bind(payment.method)
        .bind(payment.installments)
        .bind(payment.operator_id)
        .bind(payment.paid_on)
        .bind(payment.fee_amount)
        .bind(payment.net_amount)
        .bind(payment.settlement_date)
        .bind(payment.anticipated)
        .bind(payment.status)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    pub async fn find_payment<'e, E>(
        &self,
        executor: E,
        payment_id: i64,
    ) -> Result<Option<ClientPayment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, ClientPayment>("SELECT * FROM client_payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(executor)
            .await?;
        Ok(payment)
    }

    pub async fn list_payments<'e, E>(
        &self,
        executor: E,
        os_id: i64,
    ) -> Result<Vec<ClientPayment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payments = sqlx::query_as::<_, ClientPayment>(
            "SELECT * FROM client_payments WHERE os_id = $1 ORDER BY paid_on, id",
        )
        .bind(os_id)
        .fetch_all(executor)
        .await?;
        Ok(payments)
    }

    pub async fn link_payment_entry<'e, E>(
        &self,
        executor: E,
        payment_id: i64,
        entry_id: i64,
    ) -> Result<ClientPayment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, ClientPayment>(
            "UPDATE client_payments SET cash_book_entry_id = $2 WHERE id = $1 RETURNING *",
        )
        .bind(payment_id)
        .bind(entry_id)
        .fetch_one(executor)
        .await?;
        Ok(payment)
    }

    pub async fn mark_payment_reversed<'e, E>(
        &self,
        executor: E,
        payment_id: i64,
    ) -> Result<ClientPayment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, ClientPayment>(
            r#"
            UPDATE client_payments
            SET status = 'ESTORNADO', reversed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_one(executor)
        .await?;
        Ok(payment)
    }

    pub async fn lock_payment<'e, E>(
        &self,
        executor: E,
        payment_id: i64,
    ) -> Result<ClientPayment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, ClientPayment>("SELECT * FROM client_payments WHERE id = $1 FOR UPDATE")
            .bind(payment_id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("Pagamento {}", payment_id)))
    }

    /// Trava os pagamentos do lote. Ids inexistentes simplesmente não voltam.
    pub async fn lock_payments<'e, E>(
        &self,
        executor: E,
        payment_ids: &[i64],
    ) -> Result<Vec<ClientPayment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payments = sqlx::query_as::<_, ClientPayment>(
            "SELECT * FROM client_payments WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(payment_ids)
        .fetch_all(executor)
        .await?;
        Ok(payments)
    }

    pub async fn mark_payments_settled<'e, E>(
        &self,
        executor: E,
        payment_ids: &[i64],
    ) -> Result<Vec<ClientPayment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payments = sqlx::query_as::<_, ClientPayment>(
            r#"
            UPDATE client_payments
            SET status = 'REPASSADO'
            WHERE id = ANY($1) AND status = 'AGUARDANDO_REPASSE'
            RETURNING *
            "#,
        )
        .bind(payment_ids)
        .fetch_all(executor)
        .await?;
        Ok(payments)
    }

    // =========================================================================
    //  LIVRO CAIXA
    // =========================================================================

    pub async fn insert_cash_book_entry<'e, E>(
        &self,
        executor: E,
        os_id: Option<i64>,
        payment_id: Option<i64>,
        origin: CashBookOrigin,
        amount: Decimal,
        description: &str,
        occurred_on: NaiveDate,
    ) -> Result<CashBookEntry, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, CashBookEntry>(
            r#"
            INSERT INTO cash_book_entries (os_id, payment_id, origin, amount, description, occurred_on)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(os_id)
        .bind(payment_id)
        .bind(origin)
        .bind(amount)
        .bind(description)
        .bind(occurred_on)
        .fetch_one(executor)
        .await?;
        Ok(entry)
    }

    pub async fn mark_entry_reversed<'e, E>(&self, executor: E, entry_id: i64) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE cash_book_entries SET reversed_at = NOW() WHERE id = $1 AND reversed_at IS NULL",
        )
        .bind(entry_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Lançamento de fechamento ainda não estornado da OS, se houver.
    pub async fn find_active_closure_entry<'e, E>(
        &self,
        executor: E,
        os_id: i64,
    ) -> Result<Option<CashBookEntry>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, CashBookEntry>(
            r#"
            SELECT * FROM cash_book_entries
            WHERE os_id = $1 AND origin = 'FECHAMENTO_OS' AND reversed_at IS NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(os_id)
        .fetch_optional(executor)
        .await?;
        Ok(entry)
    }

    pub async fn list_cash_book(&self, os_id: Option<i64>) -> Result<Vec<CashBookEntry>, AppError> {
        let entries = sqlx::query_as::<_, CashBookEntry>(
            r#"
            SELECT * FROM cash_book_entries
            WHERE ($1::BIGINT IS NULL OR os_id = $1)
            ORDER BY occurred_on, id
            "#,
        )
        .bind(os_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
