// src/services/finance_service.rs

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Acquire, PgConnection, Postgres};

use crate::{
    common::{
        db_utils::begin_unit_of_work,
        error::AppError,
        money::{is_money_amount, round_money, CLOSURE_EPSILON},
    },
    db::{
        finance_repo::{CardOperatorFields, NewPayment},
        FinanceRepository, ServiceOrderRepository,
    },
    models::{
        finance::{
            CardModality, CardOperatorDetail, CashBookEntry, CashBookOrigin, ClientPayment,
            InstallmentRate, OsTotals, PaymentMethod, PaymentReceipt, PaymentStatus, Settlement,
            SettlementLabel,
        },
        service_order::{LaborService, OsItem, OsStatus},
    },
    services::settlement,
};

// ---
// Cálculos puros
// ---

/// Valores congelados na OS ao entrar em FINANCEIRO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub parts_total: Decimal,
    pub labor_total: Decimal,
    pub client_total: Decimal,
}

pub fn order_snapshot(items: &[OsItem], labor: &[LaborService]) -> OrderSnapshot {
    let parts_total = round_money(items.iter().map(OsItem::total).sum());
    let labor_total = round_money(labor.iter().map(|l| l.amount).sum());
    OrderSnapshot {
        parts_total,
        labor_total,
        client_total: parts_total + labor_total,
    }
}

/// Total geral x pagamentos válidos. Só informa; nunca bloqueia transição.
pub fn compute_totals(items: &[OsItem], labor: &[LaborService], payments: &[ClientPayment]) -> OsTotals {
    let snapshot = order_snapshot(items, labor);
    let paid: Decimal = payments
        .iter()
        .filter(|p| p.status.counts_as_paid())
        .map(|p| p.amount)
        .sum();

    let difference = snapshot.client_total - paid;
    let is_paid = difference <= CLOSURE_EPSILON;

    OsTotals {
        parts: snapshot.parts_total,
        labor: snapshot.labor_total,
        general: snapshot.client_total,
        paid,
        pending: difference.max(Decimal::ZERO),
        is_paid,
        settlement_label: if is_paid {
            SettlementLabel::Quitado
        } else {
            SettlementLabel::Pendente
        },
    }
}

fn validate_payment_amount(amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidPayment("valor deve ser maior que zero".into()));
    }
    if !is_money_amount(amount) {
        return Err(AppError::InvalidPayment("valor com mais de 2 casas decimais".into()));
    }
    Ok(())
}

/// Lote de repasse é tudo ou nada: todos os ids existem e estão aguardando.
pub fn check_settlement_batch(ids: &[i64], payments: &[ClientPayment]) -> Result<(), AppError> {
    if ids.is_empty() {
        return Err(AppError::InvalidPayment("nenhum pagamento informado".into()));
    }
    if let Some(missing) = ids.iter().find(|id| !payments.iter().any(|p| p.id == **id)) {
        return Err(AppError::ResourceNotFound(format!("Pagamento {}", missing)));
    }
    if let Some(p) = payments
        .iter()
        .find(|p| p.status != PaymentStatus::AguardandoRepasse)
    {
        return Err(AppError::InvalidPayment(format!(
            "pagamento {} não está aguardando repasse",
            p.id
        )));
    }
    Ok(())
}

/// Pedido de pagamento já validado na borda HTTP.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub installments: i32,
    pub operator_id: Option<i64>,
    pub paid_on: NaiveDate,
}

// ---
// Serviço
// ---

#[derive(Clone)]
pub struct FinanceService {
    repo: FinanceRepository,
    order_repo: ServiceOrderRepository,
}

impl FinanceService {
    pub fn new(repo: FinanceRepository, order_repo: ServiceOrderRepository) -> Self {
        Self { repo, order_repo }
    }

    // =========================================================================
    //  OPERADORAS
    // =========================================================================

    pub async fn create_operator<'e, A>(
        &self,
        executor: A,
        fields: &CardOperatorFields<'_>,
        rates: &[InstallmentRate],
    ) -> Result<CardOperatorDetail, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        settlement::validate_operator(fields, rates)?;

        let mut tx = begin_unit_of_work(executor).await?;

        let operator = self.repo.create_operator(&mut *tx, fields).await?;
        let installment_rates = self
            .repo
            .replace_installment_rates(&mut *tx, operator.id, rates)
            .await?;

        tx.commit().await?;
        tracing::info!(operator_id = operator.id, "Operadora cadastrada");
        Ok(CardOperatorDetail { operator, installment_rates })
    }

    /// `rates = None` mantém a tabela por parcela atual.
    pub async fn update_operator<'e, A>(
        &self,
        executor: A,
        operator_id: i64,
        fields: &CardOperatorFields<'_>,
        rates: Option<&[InstallmentRate]>,
    ) -> Result<CardOperatorDetail, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        // Sem tabela nova, os campos são validados contra a tabela gravada
        let current = match rates {
            Some(_) => Vec::new(),
            None => self.repo.list_installment_rates(&mut *tx, operator_id).await?,
        };
        settlement::validate_operator(fields, rates.unwrap_or(current.as_slice()))?;

        let operator = self.repo.update_operator(&mut *tx, operator_id, fields).await?;
        let installment_rates = match rates {
            Some(rates) => {
                self.repo
                    .replace_installment_rates(&mut *tx, operator_id, rates)
                    .await?
            }
            None => current,
        };

        tx.commit().await?;
        tracing::info!(operator_id, "Operadora atualizada");
        Ok(CardOperatorDetail { operator, installment_rates })
    }

    pub async fn list_operators(&self) -> Result<Vec<CardOperatorDetail>, AppError> {
        let operators = self.repo.list_operators().await?;
        let mut rates_by_operator: HashMap<i64, Vec<InstallmentRate>> = HashMap::new();
        for rate in self.repo.list_all_installment_rates().await? {
            rates_by_operator.entry(rate.operator_id).or_default().push(rate);
        }

        Ok(operators
            .into_iter()
            .map(|operator| {
                let installment_rates = rates_by_operator.remove(&operator.id).unwrap_or_default();
                CardOperatorDetail { operator, installment_rates }
            })
            .collect())
    }

    /// Prévia do repasse, sem gravar nada.
    pub async fn simulate<'e, A>(
        &self,
        executor: A,
        operator_id: i64,
        modality: CardModality,
        installments: i32,
        amount: Decimal,
        payment_date: NaiveDate,
    ) -> Result<Settlement, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;
        self.settlement_in(&mut *conn, operator_id, modality, installments, amount, payment_date)
            .await
    }

    async fn settlement_in(
        &self,
        conn: &mut PgConnection,
        operator_id: i64,
        modality: CardModality,
        installments: i32,
        amount: Decimal,
        payment_date: NaiveDate,
    ) -> Result<Settlement, AppError> {
        let operator = self
            .repo
            .find_operator(&mut *conn, operator_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("Operadora {}", operator_id)))?;
        let overrides = self.repo.list_installment_rates(&mut *conn, operator_id).await?;

        settlement::calculate(&operator, &overrides, modality, installments, amount, payment_date)
    }

    // =========================================================================
    //  PAGAMENTOS
    // =========================================================================

    pub async fn register_payment<'e, A>(
        &self,
        executor: A,
        os_id: i64,
        request: &PaymentRequest,
    ) -> Result<PaymentReceipt, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        let order = self.order_repo.lock_order(&mut *tx, os_id).await?;
        if order.status == OsStatus::Cancelada {
            return Err(AppError::Locked(order.status));
        }
        validate_payment_amount(request.amount)?;

        let (new_payment, settlement) = match request.method.card_modality() {
            Some(modality) => {
                let operator_id = request.operator_id.ok_or_else(|| {
                    AppError::InvalidPayment("pagamento com cartão exige operadora".into())
                })?;
                let settlement = self
                    .settlement_in(
                        &mut *tx,
                        operator_id,
                        modality,
                        request.installments,
                        request.amount,
                        request.paid_on,
                    )
                    .await?;
                let payment = NewPayment {
                    os_id,
                    amount: request.amount,
                    method: request.method,
                    installments: request.installments,
                    operator_id: Some(operator_id),
                    paid_on: request.paid_on,
                    fee_amount: settlement.fee_amount,
                    net_amount: settlement.net_amount,
                    settlement_date: Some(settlement.settlement_date),
                    anticipated: settlement.anticipated,
                    status: PaymentStatus::AguardandoRepasse,
                };
                (payment, Some(settlement))
            }
            // Dinheiro e PIX: à vista, sem operadora
            None => {
                let payment = NewPayment {
                    os_id,
                    amount: request.amount,
                    method: request.method,
                    installments: 1,
                    operator_id: None,
                    paid_on: request.paid_on,
                    fee_amount: Decimal::ZERO,
                    net_amount: request.amount,
                    settlement_date: None,
                    anticipated: false,
                    status: PaymentStatus::Recebido,
                };
                (payment, None)
            }
        };

        let payment = self.repo.insert_payment(&mut *tx, &new_payment).await?;

        let description = format!("Pagamento OS #{} ({})", os_id, payment.method.as_str());
        let entry = self
            .repo
            .insert_cash_book_entry(
                &mut *tx,
                Some(os_id),
                Some(payment.id),
                CashBookOrigin::PagamentoCliente,
                payment.net_amount,
                &description,
                payment.paid_on,
            )
            .await?;
        let payment = self.repo.link_payment_entry(&mut *tx, payment.id, entry.id).await?;

        tx.commit().await?;
        tracing::info!(
            os_id,
            payment_id = payment.id,
            method = payment.method.as_str(),
            amount = %payment.amount,
            "Pagamento registrado"
        );
        Ok(PaymentReceipt { payment, settlement })
    }

    /// Estorno lógico. O pagamento e o lançamento original ficam no histórico.
    pub async fn reverse_payment<'e, A>(
        &self,
        executor: A,
        payment_id: i64,
    ) -> Result<ClientPayment, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = begin_unit_of_work(executor).await?;

        // Trava a OS antes do pagamento, na mesma ordem do registro
        let os_id = self
            .repo
            .find_payment(&mut *tx, payment_id)
            .await?
            .map(|p| p.os_id)
            .ok_or_else(|| AppError::ResourceNotFound(format!("Pagamento {}", payment_id)))?;
        self.order_repo.lock_order(&mut *tx, os_id).await?;

        let payment = self.repo.lock_payment(&mut *tx, payment_id).await?;
        if payment.status == PaymentStatus::Estornado {
            return Ok(payment);
        }

        let reversed = self.repo.mark_payment_reversed(&mut *tx, payment_id).await?;
        if let Some(entry_id) = payment.cash_book_entry_id {
            self.repo.mark_entry_reversed(&mut *tx, entry_id).await?;
        }

        let description = format!("Estorno pagamento #{} OS #{}", payment.id, payment.os_id);
        self.repo
            .insert_cash_book_entry(
                &mut *tx,
                Some(payment.os_id),
                Some(payment.id),
                CashBookOrigin::EstornoPagamento,
                -payment.net_amount,
                &description,
                Utc::now().date_naive(),
            )
            .await?;

        tx.commit().await?;
        tracing::info!(os_id = payment.os_id, payment_id, "Pagamento estornado");
        Ok(reversed)
    }

    /// Confere o depósito da operadora para um lote de pagamentos com cartão.
    pub async fn confirm_settlements<'e, A>(
        &self,
        executor: A,
        payment_ids: &[i64],
    ) -> Result<Vec<ClientPayment>, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut ids = payment_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut tx = begin_unit_of_work(executor).await?;

        let locked = self.repo.lock_payments(&mut *tx, &ids).await?;
        check_settlement_batch(&ids, &locked)?;
        let settled = self.repo.mark_payments_settled(&mut *tx, &ids).await?;

        tx.commit().await?;
        tracing::info!(count = settled.len(), "Repasses conferidos");
        Ok(settled)
    }

    pub async fn list_payments(
        &self,
        conn: &mut PgConnection,
        os_id: i64,
    ) -> Result<Vec<ClientPayment>, AppError> {
        self.repo.list_payments(&mut *conn, os_id).await
    }

    // =========================================================================
    //  FECHAMENTO
    // =========================================================================

    pub async fn get_totals<'e, A>(&self, executor: A, os_id: i64) -> Result<OsTotals, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;

        self.order_repo
            .find_order(&mut *conn, os_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(format!("OS {}", os_id)))?;

        let items = self.order_repo.list_items(&mut *conn, os_id).await?;
        let labor = self.order_repo.list_labor(&mut *conn, os_id).await?;
        let payments = self.repo.list_payments(&mut *conn, os_id).await?;
        Ok(compute_totals(&items, &labor, &payments))
    }

    pub async fn list_cash_book(&self, os_id: Option<i64>) -> Result<Vec<CashBookEntry>, AppError> {
        self.repo.list_cash_book(os_id).await
    }

    /// Lança o fechamento da OS. Se já existe um ativo, não duplica.
    pub async fn record_closure(
        &self,
        conn: &mut PgConnection,
        os_id: i64,
        amount: Decimal,
    ) -> Result<Option<CashBookEntry>, AppError> {
        if self.repo.find_active_closure_entry(&mut *conn, os_id).await?.is_some() {
            return Ok(None);
        }

        let description = format!("Fechamento OS #{}", os_id);
        let entry = self
            .repo
            .insert_cash_book_entry(
                &mut *conn,
                Some(os_id),
                None,
                CashBookOrigin::FechamentoOs,
                amount,
                &description,
                Utc::now().date_naive(),
            )
            .await?;
        Ok(Some(entry))
    }

    /// Reabertura: estorna o fechamento ativo com um lançamento compensatório.
    pub async fn reverse_closure(
        &self,
        conn: &mut PgConnection,
        os_id: i64,
    ) -> Result<Option<CashBookEntry>, AppError> {
        let Some(closure) = self.repo.find_active_closure_entry(&mut *conn, os_id).await? else {
            return Ok(None);
        };

        self.repo.mark_entry_reversed(&mut *conn, closure.id).await?;

        let description = format!("Estorno fechamento OS #{}", os_id);
        let entry = self
            .repo
            .insert_cash_book_entry(
                &mut *conn,
                Some(os_id),
                None,
                CashBookOrigin::EstornoFechamentoOs,
                -closure.amount,
                &description,
                Utc::now().date_naive(),
            )
            .await?;
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::service_order::{OsItemView, ServiceOrder, ServiceOrderDetail};
    use rust_decimal_macros::dec;

    fn item(id: i64, quantity: Decimal, unit_price: Decimal) -> OsItem {
        OsItem {
            id,
            os_id: 1,
            part_id: Some(id),
            description: format!("peça {id}"),
            ref_code: None,
            quantity,
            unit_price,
            created_at: Utc::now(),
        }
    }

    fn labor(id: i64, amount: Decimal) -> LaborService {
        LaborService {
            id,
            os_id: 1,
            description: "Mão de obra".into(),
            amount,
            employee_id: None,
            created_at: Utc::now(),
        }
    }

    fn payment(id: i64, amount: Decimal, status: PaymentStatus) -> ClientPayment {
        ClientPayment {
            id,
            os_id: 1,
            amount,
            method: PaymentMethod::Pix,
            installments: 1,
            operator_id: None,
            paid_on: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            fee_amount: Decimal::ZERO,
            net_amount: amount,
            settlement_date: None,
            anticipated: false,
            status,
            cash_book_entry_id: None,
            reversed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn totals_sum_items_and_labor() {
        let items = [item(1, dec!(2), dec!(89.90)), item(2, dec!(1), dec!(150))];
        let labor = [labor(1, dec!(120)), labor(2, dec!(80))];
        let totals = compute_totals(&items, &labor, &[]);
        assert_eq!(totals.parts, dec!(329.80));
        assert_eq!(totals.labor, dec!(200));
        assert_eq!(totals.general, dec!(529.80));
        assert_eq!(totals.pending, dec!(529.80));
        assert!(!totals.is_paid);
        assert_eq!(totals.settlement_label, SettlementLabel::Pendente);
    }

    #[test]
    fn totals_are_stable_across_repeated_calls() {
        let items = [item(1, dec!(3), dec!(33.33))];
        let labor = [labor(1, dec!(50))];
        let payments = [payment(1, dec!(100), PaymentStatus::Recebido)];
        let first = compute_totals(&items, &labor, &payments);
        let second = compute_totals(&items, &labor, &payments);
        assert_eq!(first, second);
    }

    #[test]
    fn reversed_payment_stops_counting_and_readding_restores() {
        let items = [item(1, dec!(1), dec!(500))];
        let mut payments = vec![payment(1, dec!(500), PaymentStatus::Recebido)];
        assert!(compute_totals(&items, &[], &payments).is_paid);

        payments[0].status = PaymentStatus::Estornado;
        let totals = compute_totals(&items, &[], &payments);
        assert_eq!(totals.paid, dec!(0));
        assert_eq!(totals.pending, dec!(500));
        assert!(!totals.is_paid);

        payments.push(payment(2, dec!(500), PaymentStatus::AguardandoRepasse));
        let totals = compute_totals(&items, &[], &payments);
        assert_eq!(totals.paid, dec!(500));
        assert_eq!(totals.settlement_label, SettlementLabel::Quitado);
    }

    #[test]
    fn closure_tolerates_five_cents() {
        let items = [item(1, dec!(1), dec!(100.05))];
        let payments = [payment(1, dec!(100), PaymentStatus::Recebido)];
        let totals = compute_totals(&items, &[], &payments);
        assert!(totals.is_paid);
        assert_eq!(totals.pending, dec!(0.05));

        let items = [item(1, dec!(1), dec!(100.06))];
        assert!(!compute_totals(&items, &[], &payments).is_paid);
    }

    #[test]
    fn overpayment_is_paid_with_zero_pending() {
        let items = [item(1, dec!(1), dec!(80))];
        let payments = [payment(1, dec!(100), PaymentStatus::Repassado)];
        let totals = compute_totals(&items, &[], &payments);
        assert_eq!(totals.pending, dec!(0));
        assert!(totals.is_paid);
    }

    #[test]
    fn zero_total_order_is_paid() {
        let totals = compute_totals(&[], &[], &[]);
        assert_eq!(totals.general, dec!(0));
        assert!(totals.is_paid);
    }

    #[test]
    fn snapshot_matches_line_sums() {
        let items = [item(1, dec!(1.5), dec!(10.01)), item(2, dec!(2), dec!(7.25))];
        let labor = [labor(1, dec!(40))];
        let snap = order_snapshot(&items, &labor);
        // 15.015 + 14.50 = 29.515 -> 29.52
        assert_eq!(snap.parts_total, dec!(29.52));
        assert_eq!(snap.client_total, snap.parts_total + snap.labor_total);
    }

    #[test]
    fn payment_amount_must_be_positive_cents() {
        assert!(validate_payment_amount(dec!(10.5)).is_ok());
        assert!(matches!(validate_payment_amount(dec!(0)), Err(AppError::InvalidPayment(_))));
        assert!(matches!(validate_payment_amount(dec!(-1)), Err(AppError::InvalidPayment(_))));
        assert!(matches!(validate_payment_amount(dec!(1.001)), Err(AppError::InvalidPayment(_))));
    }

    #[test]
    fn settlement_batch_is_all_or_nothing() {
        let waiting = payment(1, dec!(10), PaymentStatus::AguardandoRepasse);
        let also_waiting = payment(2, dec!(20), PaymentStatus::AguardandoRepasse);
        let cash = payment(3, dec!(30), PaymentStatus::Recebido);

        assert!(check_settlement_batch(&[1, 2], &[waiting.clone(), also_waiting.clone()]).is_ok());
        assert!(matches!(
            check_settlement_batch(&[1, 2, 9], &[waiting.clone(), also_waiting]),
            Err(AppError::ResourceNotFound(_))
        ));
        assert!(matches!(
            check_settlement_batch(&[1, 3], &[waiting, cash]),
            Err(AppError::InvalidPayment(_))
        ));
        assert!(check_settlement_batch(&[], &[]).is_err());
    }

    #[test]
    fn order_detail_json_round_trip_keeps_totals() {
        let items = vec![item(1, dec!(2), dec!(37.50)), item(2, dec!(1), dec!(120.25))];
        let labor = vec![labor(1, dec!(80.75))];
        let payments = vec![payment(1, dec!(100), PaymentStatus::Recebido)];
        let totals = compute_totals(&items, &labor, &payments);

        let detail = ServiceOrderDetail {
            header: ServiceOrder {
                id: 1,
                client_id: Some(3),
                vehicle_id: Some(4),
                status: OsStatus::EmAndamento,
                notes: None,
                opened_at: Utc::now(),
                delivered_at: None,
                parts_total: None,
                labor_total: None,
                client_total: None,
                created_at: Utc::now(),
                updated_at: None,
            },
            items: items.into_iter().map(OsItemView::from).collect(),
            labor,
            payments,
            totals,
        };

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["status"], "EM_ANDAMENTO");
        assert_eq!(json["items"][0]["total"], serde_json::json!(75.0));

        let back: ServiceOrderDetail = serde_json::from_value(json).unwrap();
        let items: Vec<OsItem> = back.items.into_iter().map(|v| v.item).collect();
        let recomputed = compute_totals(&items, &back.labor, &back.payments);
        assert_eq!(recomputed, back.totals);
        assert_eq!(back.totals.general, dec!(276.00));
    }
}
