// src/services/inventory_service.rs

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::{Acquire, PgConnection, Postgres};

use crate::{
    common::{db_utils::begin_unit_of_work, error::AppError},
    db::InventoryRepository,
    models::{
        inventory::{
            ReservationRow, StockAvailability, StockCommitment, StockMovementReason, StockPart,
            StockWarning, StockWarningLevel,
        },
        service_order::OsItem,
    },
};

/// Abaixo disto a peça é sinalizada como estoque baixo.
const LOW_STOCK_THRESHOLD: Decimal = dec!(2);

// ---
// Cálculos puros
// ---

/// Reserva = soma do que ainda não foi baixado dos itens em OS não encerradas.
pub fn reserved_quantity(rows: &[ReservationRow]) -> Decimal {
    rows.iter()
        .filter(|row| !row.os_status.releases_reservation())
        .map(|row| (row.quantity - row.committed).max(Decimal::ZERO))
        .sum()
}

pub fn availability(part_id: i64, on_hand: Decimal, rows: &[ReservationRow]) -> StockAvailability {
    let reserved = reserved_quantity(rows);
    StockAvailability {
        part_id,
        on_hand,
        reserved,
        available: on_hand - reserved,
    }
}

pub fn stock_warning(availability: &StockAvailability) -> Option<StockWarning> {
    let level = if availability.available <= Decimal::ZERO {
        StockWarningLevel::OutOfStock
    } else if availability.available < LOW_STOCK_THRESHOLD {
        StockWarningLevel::Low
    } else {
        return None;
    };

    Some(StockWarning {
        part_id: availability.part_id,
        level,
        available: availability.available,
    })
}

/// Ajuste de estoque para um par (item, peça) de uma OS.
/// `delta > 0` baixa do estoque; `delta < 0` devolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockAdjustment {
    pub item_id: i64,
    pub part_id: i64,
    pub delta: Decimal,
    pub committed_after: Decimal,
}

/// Compara o que os itens pedem com o que já foi baixado e devolve só a diferença.
/// Rodar de novo sobre o resultado não gera ajuste nenhum.
pub fn plan_commit(items: &[OsItem], commitments: &[StockCommitment]) -> Vec<StockAdjustment> {
    // Ordenado por peça: transações concorrentes travam as peças na mesma ordem.
    let mut pairs: BTreeMap<(i64, i64), (Decimal, Decimal)> = BTreeMap::new();

    for item in items {
        if let Some(part_id) = item.part_id {
            pairs.entry((part_id, item.id)).or_default().0 += item.quantity;
        }
    }
    for c in commitments {
        pairs.entry((c.part_id, c.item_id)).or_default().1 += c.quantity;
    }

    pairs
        .into_iter()
        .filter_map(|((part_id, item_id), (target, committed))| {
            let delta = target - committed;
            (!delta.is_zero()).then_some(StockAdjustment {
                item_id,
                part_id,
                delta,
                committed_after: target,
            })
        })
        .collect()
}

/// Estorno no cancelamento: devolve exatamente o que está baixado.
pub fn plan_restore(commitments: &[StockCommitment]) -> Vec<StockAdjustment> {
    let mut adjustments: Vec<StockAdjustment> = commitments
        .iter()
        .filter(|c| c.quantity > Decimal::ZERO)
        .map(|c| StockAdjustment {
            item_id: c.item_id,
            part_id: c.part_id,
            delta: -c.quantity,
            committed_after: Decimal::ZERO,
        })
        .collect();
    adjustments.sort_by_key(|a| (a.part_id, a.item_id));
    adjustments
}

/// Custo médio ponderado após uma entrada. Saldo negativo não entra na média.
fn calculate_new_average_cost(
    current_qty: Decimal,
    current_avg: Decimal,
    incoming_qty: Decimal,
    incoming_cost: Decimal,
) -> Decimal {
    let current_qty = current_qty.max(Decimal::ZERO);
    let new_total_qty = current_qty + incoming_qty;

    if new_total_qty <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let total_value = current_qty * current_avg + incoming_qty * incoming_cost;
    (total_value / new_total_qty).round_dp(2)
}

// ---
// Serviço
// ---

#[derive(Clone)]
pub struct InventoryService {
    inventory_repo: InventoryRepository,
}

impl InventoryService {
    pub fn new(inventory_repo: InventoryRepository) -> Self {
        Self { inventory_repo }
    }

    pub async fn list_parts(&self) -> Result<Vec<StockPart>, AppError> {
        self.inventory_repo.list_parts().await
    }

    // --- CREATE PART ---
    pub async fn create_part<'e, A>(
        &self,
        executor: A,
        name: &str,
        ref_code: Option<&str>,
        initial_stock: Decimal,
        min_stock: Decimal,
        cost_price: Decimal,
        sale_price: Decimal,
    ) -> Result<StockPart, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let part = self
            .inventory_repo
            .create_part(&mut *tx, name, ref_code, initial_stock, min_stock, cost_price, sale_price)
            .await?;

        if initial_stock > Decimal::ZERO {
            self.inventory_repo
                .record_stock_movement(
                    &mut *tx,
                    part.id,
                    None,
                    initial_stock,
                    StockMovementReason::Entrada,
                    Some("Estoque inicial"),
                )
                .await?;
        }

        tx.commit().await?;
        tracing::info!(part_id = part.id, "Peça cadastrada");
        Ok(part)
    }

    // --- ADD STOCK (ENTRADA) ---
    pub async fn add_stock<'e, A>(
        &self,
        executor: A,
        part_id: i64,
        quantity: Decimal,
        unit_cost: Decimal,
        notes: Option<&str>,
    ) -> Result<StockPart, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let current = self
            .inventory_repo
            .lock_part(&mut *tx, part_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("Peça {}", part_id)))?;

        let new_avg_cost = calculate_new_average_cost(
            current.on_hand,
            current.cost_price,
            quantity,
            unit_cost,
        );

        let updated = self
            .inventory_repo
            .adjust_on_hand(&mut *tx, part_id, quantity, Some(new_avg_cost))
            .await?;

        self.inventory_repo
            .record_stock_movement(
                &mut *tx,
                part_id,
                None,
                quantity,
                StockMovementReason::Entrada,
                notes,
            )
            .await?;

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn find_part(&self, conn: &mut PgConnection, part_id: i64) -> Result<StockPart, AppError> {
        self.inventory_repo
            .find_part(&mut *conn, part_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("Peça {}", part_id)))
    }

    // --- DISPONIBILIDADE ---
    pub async fn check_availability<'e, A>(
        &self,
        executor: A,
        part_id: i64,
    ) -> Result<StockAvailability, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        self.availability_in(&mut *conn, part_id).await
    }

    /// Disponibilidade vista de dentro de uma transação em andamento.
    pub async fn availability_in(
        &self,
        conn: &mut PgConnection,
        part_id: i64,
    ) -> Result<StockAvailability, AppError> {
        let part = self
            .inventory_repo
            .find_part(&mut *conn, part_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("Peça {}", part_id)))?;

        let rows = self.inventory_repo.reservation_rows(&mut *conn, part_id).await?;
        Ok(availability(part_id, part.on_hand, &rows))
    }

    /// Recalcula a disponibilidade das peças afetadas e devolve os avisos.
    pub async fn warnings_for(
        &self,
        conn: &mut PgConnection,
        part_ids: &[i64],
    ) -> Result<Vec<StockWarning>, AppError> {
        let mut warnings = Vec::new();
        for &part_id in part_ids {
            let availability = self.availability_in(conn, part_id).await?;
            if let Some(warning) = stock_warning(&availability) {
                tracing::warn!(
                    part_id,
                    available = %warning.available,
                    level = ?warning.level,
                    "Estoque insuficiente ou baixo"
                );
                warnings.push(warning);
            }
        }
        Ok(warnings)
    }

    // --- BAIXA / ESTORNO POR OS ---

    /// Baixa do estoque o que falta baixar para os itens da OS.
    pub async fn commit_order_stock(
        &self,
        conn: &mut PgConnection,
        os_id: i64,
        items: &[OsItem],
    ) -> Result<Vec<StockAdjustment>, AppError> {
        let commitments = self.inventory_repo.list_commitments(&mut *conn, os_id).await?;
        let adjustments = plan_commit(items, &commitments);
        self.apply_adjustments(conn, os_id, &adjustments).await?;
        Ok(adjustments)
    }

    /// Devolve ao estoque tudo o que a OS baixou. Sem baixa, nada muda.
    pub async fn restore_order_stock(
        &self,
        conn: &mut PgConnection,
        os_id: i64,
    ) -> Result<Vec<StockAdjustment>, AppError> {
        let commitments = self.inventory_repo.list_commitments(&mut *conn, os_id).await?;
        let adjustments = plan_restore(&commitments);
        self.apply_adjustments(conn, os_id, &adjustments).await?;
        Ok(adjustments)
    }

    async fn apply_adjustments(
        &self,
        conn: &mut PgConnection,
        os_id: i64,
        adjustments: &[StockAdjustment],
    ) -> Result<(), AppError> {
        for adj in adjustments {
            self.inventory_repo
                .adjust_on_hand(&mut *conn, adj.part_id, -adj.delta, None)
                .await?;

            self.inventory_repo
                .upsert_commitment(&mut *conn, os_id, adj.item_id, adj.part_id, adj.committed_after)
                .await?;

            let (reason, note) = if adj.delta > Decimal::ZERO {
                (StockMovementReason::BaixaOs, format!("Baixa OS #{}", os_id))
            } else {
                (StockMovementReason::EstornoOs, format!("Estorno OS #{}", os_id))
            };

            self.inventory_repo
                .record_stock_movement(&mut *conn, adj.part_id, Some(os_id), -adj.delta, reason, Some(note.as_str()))
                .await?;
        }

        if !adjustments.is_empty() {
            tracing::info!(os_id, adjustments = adjustments.len(), "Estoque da OS ajustado");
        }
        Ok(())
    }
}
