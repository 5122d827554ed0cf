use sqlx::{Acquire, Postgres, Transaction};

use crate::common::error::AppError;

// Espera máxima por um lock de linha (OS ou peça) dentro de uma unidade de trabalho.
const SET_LOCK_TIMEOUT: &str = "SET LOCAL lock_timeout = '5s'";

// ---
// Helper de Unidade de Trabalho
// ---
/// Abre a transação de uma operação de OS e limita a espera por locks.
/// Tudo que a operação gravar (status, estoque, livro caixa) entra ou sai junto.
pub(crate) async fn begin_unit_of_work<'e, A>(
    executor: A,
) -> Result<Transaction<'e, Postgres>, AppError>
where
    A: Acquire<'e, Database = Postgres>,
{
    // O operador '?' converte automaticamente sqlx::Error -> AppError::DatabaseError
    let mut tx = executor.begin().await?;

    // SET LOCAL só vale até o fim da transação
    sqlx::query(SET_LOCK_TIMEOUT)
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}
