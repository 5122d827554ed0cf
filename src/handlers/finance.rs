// src/handlers/finance.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    db::finance_repo::CardOperatorFields,
    models::finance::{
        CardModality, CardOperatorDetail, CashBookEntry, ClientPayment, InstallmentRate,
        OsTotals, PaymentMethod, PaymentReceipt, Settlement,
    },
    services::finance_service::PaymentRequest,
};

fn default_installments() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

// =============================================================================
//  1. FECHAMENTO E PAGAMENTOS DA OS
// =============================================================================

// GET /api/service-orders/{id}/totals
#[utoipa::path(
    get,
    path = "/api/service-orders/{id}/totals",
    tag = "Finance",
    params(("id" = i64, Path, description = "ID da OS")),
    responses(
        (status = 200, description = "Totais e situação do pagamento (QUITADO/PENDENTE)", body = OsTotals),
        (status = 404, description = "OS não encontrada")
    )
)]
pub async fn get_totals(
    State(app_state): State<AppState>,
    Path(os_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let totals = app_state.finance_service.get_totals(&app_state.db_pool, os_id).await?;
    Ok(Json(totals))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPaymentPayload {
    #[validate(custom(function = "crate::handlers::validate_positive"))]
    #[schema(example = "1000.00")]
    pub amount: Decimal,

    #[schema(example = "CREDITO")]
    pub method: PaymentMethod,

    #[validate(range(min = 1, max = 18, message = "Parcelas devem estar entre 1 e 18."))]
    #[serde(default = "default_installments")]
    #[schema(example = 3)]
    pub installments: i32,

    /// Obrigatório para DEBITO e CREDITO
    #[schema(example = 1)]
    pub operator_id: Option<i64>,

    /// Padrão: hoje
    #[schema(value_type = Option<String>, format = Date, example = "2025-03-10")]
    pub paid_on: Option<NaiveDate>,
}

// POST /api/service-orders/{id}/payments
#[utoipa::path(
    post,
    path = "/api/service-orders/{id}/payments",
    tag = "Finance",
    request_body = RegisterPaymentPayload,
    params(("id" = i64, Path, description = "ID da OS")),
    responses(
        (status = 201, description = "Pagamento registrado (com repasse calculado se for cartão)", body = PaymentReceipt),
        (status = 400, description = "Pagamento inválido"),
        (status = 422, description = "Operadora sem configuração para a modalidade"),
        (status = 423, description = "OS cancelada")
    )
)]
pub async fn register_payment(
    State(app_state): State<AppState>,
    Path(os_id): Path<i64>,
    Json(payload): Json<RegisterPaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let request = PaymentRequest {
        amount: payload.amount,
        method: payload.method,
        installments: payload.installments,
        operator_id: payload.operator_id,
        paid_on: payload.paid_on.unwrap_or_else(|| Utc::now().date_naive()),
    };

    let receipt = app_state
        .finance_service
        .register_payment(&app_state.db_pool, os_id, &request)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

// DELETE /api/payments/{payment_id}
#[utoipa::path(
    delete,
    path = "/api/payments/{payment_id}",
    tag = "Finance",
    params(("payment_id" = i64, Path, description = "ID do pagamento")),
    responses(
        (status = 200, description = "Pagamento estornado (repetir não tem efeito)", body = ClientPayment),
        (status = 404, description = "Pagamento não encontrado")
    )
)]
pub async fn reverse_payment(
    State(app_state): State<AppState>,
    Path(payment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let payment = app_state
        .finance_service
        .reverse_payment(&app_state.db_pool, payment_id)
        .await?;
    Ok(Json(payment))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmSettlementsPayload {
    #[validate(length(min = 1, message = "Informe ao menos um pagamento."))]
    #[schema(example = json!([41, 42]))]
    pub payment_ids: Vec<i64>,
}

// POST /api/payments/settlements/confirm
#[utoipa::path(
    post,
    path = "/api/payments/settlements/confirm",
    tag = "Finance",
    request_body = ConfirmSettlementsPayload,
    responses(
        (status = 200, description = "Repasses conferidos", body = Vec<ClientPayment>),
        (status = 400, description = "Algum pagamento não está aguardando repasse; nada foi alterado"),
        (status = 404, description = "Algum pagamento não existe; nada foi alterado")
    )
)]
pub async fn confirm_settlements(
    State(app_state): State<AppState>,
    Json(payload): Json<ConfirmSettlementsPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let settled = app_state
        .finance_service
        .confirm_settlements(&app_state.db_pool, &payload.payment_ids)
        .await?;
    Ok(Json(settled))
}

// =============================================================================
//  2. OPERADORAS DE CARTÃO
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardOperatorPayload {
    #[validate(length(min = 1, max = 120, message = "O nome é obrigatório."))]
    #[schema(example = "Stone")]
    pub name: String,

    #[validate(custom(function = "crate::handlers::validate_not_negative"))]
    #[schema(example = "1.49")]
    pub debit_rate: Option<Decimal>,
    #[validate(range(min = 0, message = "O prazo não pode ser negativo."))]
    #[schema(example = 1)]
    pub debit_days: Option<i32>,

    #[validate(custom(function = "crate::handlers::validate_not_negative"))]
    #[schema(example = "3.19")]
    pub credit_rate: Option<Decimal>,
    #[validate(range(min = 0, message = "O prazo não pode ser negativo."))]
    #[schema(example = 30)]
    pub credit_days: Option<i32>,

    #[validate(custom(function = "crate::handlers::validate_not_negative"))]
    #[schema(example = "4.99")]
    pub installment_rate: Option<Decimal>,
    #[validate(range(min = 0, message = "O prazo não pode ser negativo."))]
    #[schema(example = 30)]
    pub installment_days: Option<i32>,

    #[validate(custom(function = "crate::handlers::validate_not_negative"))]
    #[serde(default)]
    #[schema(example = "2.00")]
    pub anticipation_rate: Decimal,

    #[serde(default)]
    pub auto_anticipation: bool,

    #[serde(default = "default_true")]
    pub active: bool,

    /// Taxas por parcela (2x a 18x). No PUT, ausente mantém a tabela atual.
    pub installment_rates: Option<Vec<InstallmentRate>>,
}

impl CardOperatorPayload {
    fn fields(&self) -> CardOperatorFields<'_> {
        CardOperatorFields {
            name: self.name.trim(),
            debit_rate: self.debit_rate,
            debit_days: self.debit_days,
            credit_rate: self.credit_rate,
            credit_days: self.credit_days,
            installment_rate: self.installment_rate,
            installment_days: self.installment_days,
            anticipation_rate: self.anticipation_rate,
            auto_anticipation: self.auto_anticipation,
            active: self.active,
        }
    }
}

// POST /api/card-operators
#[utoipa::path(
    post,
    path = "/api/card-operators",
    tag = "Finance",
    request_body = CardOperatorPayload,
    responses(
        (status = 201, description = "Operadora cadastrada", body = CardOperatorDetail),
        (status = 422, description = "Taxas ou prazos inválidos")
    )
)]
pub async fn create_operator(
    State(app_state): State<AppState>,
    Json(payload): Json<CardOperatorPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let rates = payload.installment_rates.as_deref().unwrap_or_default();
    let operator = app_state
        .finance_service
        .create_operator(&app_state.db_pool, &payload.fields(), rates)
        .await?;

    Ok((StatusCode::CREATED, Json(operator)))
}

// GET /api/card-operators
#[utoipa::path(
    get,
    path = "/api/card-operators",
    tag = "Finance",
    responses(
        (status = 200, description = "Operadoras com suas taxas por parcela", body = Vec<CardOperatorDetail>)
    )
)]
pub async fn list_operators(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let operators = app_state.finance_service.list_operators().await?;
    Ok(Json(operators))
}

// PUT /api/card-operators/{id}
#[utoipa::path(
    put,
    path = "/api/card-operators/{id}",
    tag = "Finance",
    request_body = CardOperatorPayload,
    params(("id" = i64, Path, description = "ID da operadora")),
    responses(
        (status = 200, description = "Operadora atualizada", body = CardOperatorDetail),
        (status = 404, description = "Operadora não encontrada"),
        (status = 422, description = "Taxas ou prazos inválidos")
    )
)]
pub async fn update_operator(
    State(app_state): State<AppState>,
    Path(operator_id): Path<i64>,
    Json(payload): Json<CardOperatorPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let operator = app_state
        .finance_service
        .update_operator(
            &app_state.db_pool,
            operator_id,
            &payload.fields(),
            payload.installment_rates.as_deref(),
        )
        .await?;

    Ok(Json(operator))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimulatePayload {
    #[schema(example = "CREDITO")]
    pub modality: CardModality,

    #[validate(range(min = 1, max = 18, message = "Parcelas devem estar entre 1 e 18."))]
    #[serde(default = "default_installments")]
    #[schema(example = 3)]
    pub installments: i32,

    #[validate(custom(function = "crate::handlers::validate_positive"))]
    #[schema(example = "1000.00")]
    pub amount: Decimal,

    /// Padrão: hoje
    #[schema(value_type = Option<String>, format = Date, example = "2025-03-10")]
    pub date: Option<NaiveDate>,
}

// POST /api/card-operators/{id}/simulate
#[utoipa::path(
    post,
    path = "/api/card-operators/{id}/simulate",
    tag = "Finance",
    request_body = SimulatePayload,
    params(("id" = i64, Path, description = "ID da operadora")),
    responses(
        (status = 200, description = "Taxa, líquido e data prevista de repasse", body = Settlement),
        (status = 422, description = "Operadora inativa ou sem configuração para a modalidade")
    )
)]
pub async fn simulate(
    State(app_state): State<AppState>,
    Path(operator_id): Path<i64>,
    Json(payload): Json<SimulatePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let settlement = app_state
        .finance_service
        .simulate(
            &app_state.db_pool,
            operator_id,
            payload.modality,
            payload.installments,
            payload.amount,
            payload.date.unwrap_or_else(|| Utc::now().date_naive()),
        )
        .await?;

    Ok(Json(settlement))
}

// =============================================================================
//  3. LIVRO CAIXA
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashBookQuery {
    pub os_id: Option<i64>,
}

// GET /api/cash-book?osId=
#[utoipa::path(
    get,
    path = "/api/cash-book",
    tag = "Finance",
    params(("osId" = Option<i64>, Query, description = "Filtra pelos lançamentos da OS")),
    responses(
        (status = 200, description = "Lançamentos em ordem cronológica", body = Vec<CashBookEntry>)
    )
)]
pub async fn list_cash_book(
    State(app_state): State<AppState>,
    Query(query): Query<CashBookQuery>,
) -> Result<impl IntoResponse, AppError> {
    let entries = app_state.finance_service.list_cash_book(query.os_id).await?;
    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn payment_payload_defaults_to_single_installment() {
        let payload: RegisterPaymentPayload =
            serde_json::from_str(r#"{"amount": 150.5, "method": "PIX"}"#).unwrap();
        assert_eq!(payload.installments, 1);
        assert_eq!(payload.amount, dec!(150.5));
        assert!(payload.paid_on.is_none());
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn payment_payload_rejects_out_of_range_installments() {
        let payload: RegisterPaymentPayload = serde_json::from_str(
            r#"{"amount": 100, "method": "CREDITO", "installments": 19, "operatorId": 1}"#,
        )
        .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn operator_payload_maps_to_fields() {
        let payload: CardOperatorPayload = serde_json::from_str(
            r#"{
                "name": " Cielo ",
                "creditRate": 3.19,
                "creditDays": 30,
                "installmentRates": [{"installments": 3, "totalRate": 5.5}]
            }"#,
        )
        .unwrap();
        assert!(payload.validate().is_ok());
        assert!(payload.active);
        assert_eq!(payload.anticipation_rate, dec!(0));

        let fields = payload.fields();
        assert_eq!(fields.name, "Cielo");
        assert_eq!(fields.credit_rate, Some(dec!(3.19)));

        let rates = payload.installment_rates.unwrap();
        assert_eq!(rates[0].installments, 3);
        assert_eq!(rates[0].anticipation_rate, None);
    }

    #[test]
    fn operator_payload_rejects_negative_terms() {
        let payload: CardOperatorPayload =
            serde_json::from_str(r#"{"name": "Rede", "debitDays": -1}"#).unwrap();
        assert!(payload.validate().is_err());

        let payload: CardOperatorPayload =
            serde_json::from_str(r#"{"name": "Rede", "debitRate": -0.5}"#).unwrap();
        assert!(payload.validate().is_err());
    }
}
