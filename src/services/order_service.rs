// src/services/order_service.rs

use rust_decimal::Decimal;
use sqlx::{Acquire, Postgres};
use validator::{ValidationError, ValidationErrors};

use crate::{
    common::{
        db_utils::begin_unit_of_work,
        error::AppError,
        money::{is_money_amount, is_quantity},
    },
    db::{service_order_repo::OsItemFields, ServiceOrderRepository},
    models::{
        inventory::StockPart,
        service_order::{
            ItemMutation, LaborService, OsItem, OsItemView, OsStatus, ServiceOrder,
            ServiceOrderDetail,
        },
    },
    services::{
        finance_service::{compute_totals, order_snapshot, FinanceService},
        inventory_service::InventoryService,
        status_machine::{plan_transition, TransitionEffect},
    },
};

/// Status em que uma OS pode nascer.
const INITIAL_STATUSES: [OsStatus; 3] = [OsStatus::Agendamento, OsStatus::Orcamento, OsStatus::Aberta];

// Erro de validação de um único campo, no mesmo formato do `validator`
fn field_error(field: &'static str, code: &'static str, message: &'static str) -> AppError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    let mut errors = ValidationErrors::new();
    errors.add(field, err);
    AppError::ValidationError(errors)
}

pub fn ensure_editable(status: OsStatus) -> Result<(), AppError> {
    if status.allows_item_changes() {
        Ok(())
    } else {
        Err(AppError::Locked(status))
    }
}

/// Dados de item recebidos da API. Campos ausentes vêm da peça vinculada.
#[derive(Debug, Clone, Default)]
pub struct ItemInput {
    pub part_id: Option<i64>,
    pub description: Option<String>,
    pub ref_code: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub part_id: Option<i64>,
    pub description: String,
    pub ref_code: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl ResolvedItem {
    fn fields(&self) -> OsItemFields<'_> {
        OsItemFields {
            part_id: self.part_id,
            description: &self.description,
            ref_code: self.ref_code.as_deref(),
            quantity: self.quantity,
            unit_price: self.unit_price,
        }
    }
}

/// Completa o item: o que veio na requisição, senão o valor atual (mesma peça),
/// senão o cadastro da peça.
pub fn resolve_item(
    input: &ItemInput,
    part: Option<&StockPart>,
    current: Option<&OsItem>,
) -> Result<ResolvedItem, AppError> {
    if input.quantity <= Decimal::ZERO {
        return Err(field_error("quantity", "range", "A quantidade deve ser maior que zero."));
    }
    if !is_quantity(input.quantity) {
        return Err(field_error("quantity", "scale", "A quantidade deve ter no máximo 3 casas decimais."));
    }

    let kept = current.filter(|c| c.part_id == input.part_id);

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| kept.map(|c| c.description.clone()))
        .or_else(|| part.map(|p| p.name.clone()))
        .ok_or_else(|| field_error("description", "required", "A descrição é obrigatória."))?;

    let ref_code = input
        .ref_code
        .clone()
        .or_else(|| kept.and_then(|c| c.ref_code.clone()))
        .or_else(|| part.and_then(|p| p.ref_code.clone()));

    let unit_price = input
        .unit_price
        .or_else(|| kept.map(|c| c.unit_price))
        .or_else(|| part.map(|p| p.sale_price))
        .ok_or_else(|| field_error("unitPrice", "required", "O valor unitário é obrigatório."))?;
    if unit_price.is_sign_negative() {
        return Err(field_error("unitPrice", "range", "O valor não pode ser negativo."));
    }
    if !is_money_amount(unit_price) {
        return Err(field_error("unitPrice", "scale", "O valor deve ter no máximo 2 casas decimais."));
    }

    Ok(ResolvedItem {
        part_id: input.part_id,
        description,
        ref_code,
        quantity: input.quantity,
        unit_price,
    })
}

/// Peças cuja disponibilidade muda com a edição (antiga e nova).
fn affected_parts(old: Option<i64>, new: Option<i64>) -> Vec<i64> {
    let mut parts: Vec<i64> = old.into_iter().chain(new).collect();
    parts.sort_unstable();
    parts.dedup();
    parts
}

#[derive(Clone)]
pub struct ServiceOrderService {
    repo: ServiceOrderRepository,
    inventory_service: InventoryService,
    finance_service: FinanceService,
}

impl ServiceOrderService {
    pub fn new(
        repo: ServiceOrderRepository,
        inventory_service: InventoryService,
        finance_service: FinanceService,
    ) -> Self {
        Self {
            repo,
            inventory_service,
            finance_service,
        }
    }

    // =========================================================================
    //  ORDENS
    // =========================================================================

    pub async fn create_order<'e, A>(
        &self,
        executor: A,
        client_id: Option<i64>,
        vehicle_id: Option<i64>,
        status: Option<OsStatus>,
        notes: Option<&str>,
    ) -> Result<ServiceOrder, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let status = status.unwrap_or(OsStatus::Aberta);
        if !INITIAL_STATUSES.contains(&status) {
            return Err(field_error(
                "status",
                "initial_status",
                "A OS deve começar em AGENDAMENTO, ORCAMENTO ou ABERTA.",
            ));
        }

        let mut tx = begin_unit_of_work(executor).await?;
        let order = self
            .repo
            .create_order(&mut *tx, client_id, vehicle_id, status, notes)
            .await?;
        tx.commit().await?;

        tracing::info!(os_id = order.id, status = %order.status, "OS aberta");
        Ok(order)
    }

    pub async fn list_orders(&self, status: Option<OsStatus>) -> Result<Vec<ServiceOrder>, AppError> {
        self.repo.list_orders(status).await
    }

    pub async fn get_detail<'e, A>(&self, executor: A, os_id: i64) -> Result<ServiceOrderDetail, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;

        let header = self
            .repo
            .find_order(&mut *conn, os_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("OS {}", os_id)))?;
        let items = self.repo.list_items(&mut *conn, os_id).await?;
        let labor = self.repo.list_labor(&mut *conn, os_id).await?;
        let payments = self.finance_service.list_payments(&mut *conn, os_id).await?;
        let totals = compute_totals(&items, &labor, &payments);

        Ok(ServiceOrderDetail {
            header,
            items: items.into_iter().map(OsItemView::from).collect(),
            labor,
            payments,
            totals,
        })
    }

    // =========================================================================
    //  STATUS
    // =========================================================================

    /// Muda o status aplicando todos os efeitos na mesma transação.
    /// Qualquer falha de persistência desfaz tudo e volta como `TransitionFailed`.
    pub async fn transition_status<'e, A>(
        &self,
        executor: A,
        os_id: i64,
        target: OsStatus,
    ) -> Result<ServiceOrder, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        self.apply_transition(executor, os_id, target)
            .await
            .map_err(AppError::into_transition_failure)
    }

    async fn apply_transition<'e, A>(
        &self,
        executor: A,
        os_id: i64,
        target: OsStatus,
    ) -> Result<ServiceOrder, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let order = self.repo.lock_order(&mut *tx, os_id).await?;
        let Some(plan) = plan_transition(order.status, target)? else {
            // Já está no status pedido
            return Ok(order);
        };

        let (items, labor) = if plan.needs_lines() {
            (
                self.repo.list_items(&mut *tx, os_id).await?,
                self.repo.list_labor(&mut *tx, os_id).await?,
            )
        } else {
            (Vec::new(), Vec::new())
        };
        let snapshot = order_snapshot(&items, &labor);

        for effect in &plan.effects {
            match effect {
                TransitionEffect::RequireAssociations => {
                    if order.client_id.is_none() {
                        return Err(AppError::InsufficientData("OS sem cliente vinculado".into()));
                    }
                    if order.vehicle_id.is_none() {
                        return Err(AppError::InsufficientData("OS sem veículo vinculado".into()));
                    }
                }
                TransitionEffect::CommitStock => {
                    self.inventory_service
                        .commit_order_stock(&mut *tx, os_id, &items)
                        .await?;
                }
                TransitionEffect::FreezeSnapshot => {
                    self.repo
                        .freeze_snapshot(
                            &mut *tx,
                            os_id,
                            snapshot.parts_total,
                            snapshot.labor_total,
                            snapshot.client_total,
                        )
                        .await?;
                }
                TransitionEffect::RecordClosureEntry => {
                    self.finance_service
                        .record_closure(&mut *tx, os_id, snapshot.client_total)
                        .await?;
                }
                TransitionEffect::MarkDelivered => {
                    self.repo.mark_delivered(&mut *tx, os_id).await?;
                }
                TransitionEffect::ReverseClosure => {
                    self.finance_service.reverse_closure(&mut *tx, os_id).await?;
                }
                TransitionEffect::ClearSnapshot => {
                    self.repo.clear_snapshot(&mut *tx, os_id).await?;
                }
                TransitionEffect::RestoreCommittedStock => {
                    self.inventory_service.restore_order_stock(&mut *tx, os_id).await?;
                }
            }
        }

        let updated = self.repo.update_status(&mut *tx, os_id, plan.to).await?;
        tx.commit().await?;

        tracing::info!(
            os_id,
            from = %plan.from,
            to = %plan.to,
            reopen = plan.is_reopen(),
            "Status da OS alterado"
        );
        Ok(updated)
    }

    // =========================================================================
    //  ITENS
    // =========================================================================

    pub async fn add_item<'e, A>(
        &self,
        executor: A,
        os_id: i64,
        input: &ItemInput,
    ) -> Result<ItemMutation, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let order = self.repo.lock_order(&mut *tx, os_id).await?;
        ensure_editable(order.status)?;

        let part = match input.part_id {
            Some(part_id) => Some(self.inventory_service.find_part(&mut *tx, part_id).await?),
            None => None,
        };
        let resolved = resolve_item(input, part.as_ref(), None)?;
        let item = self.repo.insert_item(&mut *tx, os_id, &resolved.fields()).await?;

        let warnings = self
            .inventory_service
            .warnings_for(&mut *tx, &affected_parts(None, item.part_id))
            .await?;

        tx.commit().await?;
        tracing::info!(os_id, item_id = item.id, "Item incluído na OS");
        Ok(ItemMutation { item: item.into(), warnings })
    }

    pub async fn update_item<'e, A>(
        &self,
        executor: A,
        item_id: i64,
        input: &ItemInput,
    ) -> Result<ItemMutation, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let current = self.find_item_locked(&mut *tx, item_id).await?;

        let part = match input.part_id {
            Some(part_id) => Some(self.inventory_service.find_part(&mut *tx, part_id).await?),
            None => None,
        };
        let resolved = resolve_item(input, part.as_ref(), Some(&current))?;
        let item = self.repo.update_item(&mut *tx, item_id, &resolved.fields()).await?;

        let warnings = self
            .inventory_service
            .warnings_for(&mut *tx, &affected_parts(current.part_id, item.part_id))
            .await?;

        tx.commit().await?;
        tracing::info!(os_id = item.os_id, item_id, "Item da OS alterado");
        Ok(ItemMutation { item: item.into(), warnings })
    }

    /// Remover um item libera a reserva na hora; a baixa já feita (OS reaberta)
    /// é acertada no próximo fechamento.
    pub async fn delete_item<'e, A>(&self, executor: A, item_id: i64) -> Result<(), AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let current = self.find_item_locked(&mut *tx, item_id).await?;
        self.repo.delete_item(&mut *tx, item_id).await?;

        tx.commit().await?;
        tracing::info!(os_id = current.os_id, item_id, "Item removido da OS");
        Ok(())
    }

    // Busca o item, trava a OS dele e confere se ainda pode ser editada
    async fn find_item_locked(
        &self,
        conn: &mut sqlx::PgConnection,
        item_id: i64,
    ) -> Result<OsItem, AppError> {
        let not_found = || AppError::ResourceNotFound(format!("Item {}", item_id));

        let item = self.repo.find_item(&mut *conn, item_id).await?.ok_or_else(not_found)?;
        let order = self.repo.lock_order(&mut *conn, item.os_id).await?;
        ensure_editable(order.status)?;

        // Relê com a OS travada: outra transação pode ter removido o item
        self.repo.find_item(&mut *conn, item_id).await?.ok_or_else(not_found)
    }

    // =========================================================================
    //  MÃO DE OBRA
    // =========================================================================

    pub async fn add_labor<'e, A>(
        &self,
        executor: A,
        os_id: i64,
        description: &str,
        amount: Decimal,
        employee_id: Option<i64>,
    ) -> Result<LaborService, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let order = self.repo.lock_order(&mut *tx, os_id).await?;
        ensure_editable(order.status)?;

        let labor = self
            .repo
            .insert_labor(&mut *tx, os_id, description, amount, employee_id)
            .await?;

        tx.commit().await?;
        tracing::info!(os_id, labor_id = labor.id, "Mão de obra incluída na OS");
        Ok(labor)
    }

    pub async fn delete_labor<'e, A>(&self, executor: A, labor_id: i64) -> Result<(), AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let labor = self
            .repo
            .find_labor(&mut *tx, labor_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("Mão de obra {}", labor_id)))?;
        let order = self.repo.lock_order(&mut *tx, labor.os_id).await?;
        ensure_editable(order.status)?;

        self.repo.delete_labor(&mut *tx, labor_id).await?;

        tx.commit().await?;
        tracing::info!(os_id = labor.os_id, labor_id, "Mão de obra removida da OS");
        Ok(())
    }
}
