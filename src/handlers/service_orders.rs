// src/handlers/service_orders.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    models::service_order::{ItemMutation, LaborService, OsStatus, ServiceOrder, ServiceOrderDetail},
    services::order_service::ItemInput,
};

// =============================================================================
//  1. ORDENS DE SERVIÇO
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    #[schema(example = 12)]
    pub client_id: Option<i64>,

    #[schema(example = 34)]
    pub vehicle_id: Option<i64>,

    /// Padrão: ABERTA
    pub status: Option<OsStatus>,

    #[validate(length(max = 2000, message = "Observação muito longa."))]
    #[schema(example = "Barulho na suspensão dianteira")]
    pub notes: Option<String>,
}

// POST /api/service-orders
#[utoipa::path(
    post,
    path = "/api/service-orders",
    tag = "Service Orders",
    request_body = CreateOrderPayload,
    responses(
        (status = 201, description = "OS aberta", body = ServiceOrder),
        (status = 400, description = "Status inicial inválido")
    )
)]
pub async fn create_order(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateOrderPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let order = app_state
        .order_service
        .create_order(
            &app_state.db_pool,
            payload.client_id,
            payload.vehicle_id,
            payload.status,
            payload.notes.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OsStatus>,
}

// GET /api/service-orders
#[utoipa::path(
    get,
    path = "/api/service-orders",
    tag = "Service Orders",
    params(
        ("status" = Option<OsStatus>, Query, description = "Filtra pelo status")
    ),
    responses(
        (status = 200, description = "OS mais recentes primeiro", body = Vec<ServiceOrder>)
    )
)]
pub async fn list_orders(
    State(app_state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let orders = app_state.order_service.list_orders(query.status).await?;
    Ok(Json(orders))
}

// GET /api/service-orders/{id}
#[utoipa::path(
    get,
    path = "/api/service-orders/{id}",
    tag = "Service Orders",
    params(("id" = i64, Path, description = "ID da OS")),
    responses(
        (status = 200, description = "OS com itens, mão de obra, pagamentos e totais", body = ServiceOrderDetail),
        (status = 404, description = "OS não encontrada")
    )
)]
pub async fn get_order(
    State(app_state): State<AppState>,
    Path(os_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = app_state.order_service.get_detail(&app_state.db_pool, os_id).await?;
    Ok(Json(detail))
}

// =============================================================================
//  2. TRANSIÇÃO DE STATUS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPayload {
    #[schema(example = "FINANCEIRO")]
    pub status: OsStatus,
}

// POST /api/service-orders/{id}/status
#[utoipa::path(
    post,
    path = "/api/service-orders/{id}/status",
    tag = "Service Orders",
    request_body = TransitionPayload,
    params(("id" = i64, Path, description = "ID da OS")),
    responses(
        (status = 200, description = "OS no novo status (estoque e livro caixa atualizados)", body = ServiceOrder),
        (status = 409, description = "Transição não permitida"),
        (status = 422, description = "OS sem cliente ou veículo"),
        (status = 500, description = "Falha ao aplicar a transição; nada foi gravado")
    )
)]
pub async fn transition_status(
    State(app_state): State<AppState>,
    Path(os_id): Path<i64>,
    Json(payload): Json<TransitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let order = app_state
        .order_service
        .transition_status(&app_state.db_pool, os_id, payload.status)
        .await?;
    Ok(Json(order))
}

// =============================================================================
//  3. ITENS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    /// Peça do estoque. Sem peça o item é avulso e não reserva nada.
    #[schema(example = 10)]
    pub part_id: Option<i64>,

    #[validate(length(min = 1, max = 255, message = "Descrição inválida."))]
    #[schema(example = "Pastilha de freio dianteira")]
    pub description: Option<String>,

    #[schema(example = "PF-2231")]
    pub ref_code: Option<String>,

    #[validate(custom(function = "crate::handlers::validate_quantity"))]
    #[schema(example = "2")]
    pub quantity: Decimal,

    /// Padrão: preço de venda da peça
    #[validate(custom(function = "crate::handlers::validate_money"))]
    #[schema(example = "89.90")]
    pub unit_price: Option<Decimal>,
}

impl From<ItemPayload> for ItemInput {
    fn from(payload: ItemPayload) -> Self {
        Self {
            part_id: payload.part_id,
            description: payload.description,
            ref_code: payload.ref_code,
            quantity: payload.quantity,
            unit_price: payload.unit_price,
        }
    }
}

// POST /api/service-orders/{id}/items
#[utoipa::path(
    post,
    path = "/api/service-orders/{id}/items",
    tag = "Service Orders",
    request_body = ItemPayload,
    params(("id" = i64, Path, description = "ID da OS")),
    responses(
        (status = 201, description = "Item incluído (com avisos de estoque, se houver)", body = ItemMutation),
        (status = 404, description = "OS ou peça não encontrada"),
        (status = 423, description = "OS bloqueada para edição")
    )
)]
pub async fn add_item(
    State(app_state): State<AppState>,
    Path(os_id): Path<i64>,
    Json(payload): Json<ItemPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let result = app_state
        .order_service
        .add_item(&app_state.db_pool, os_id, &payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

// PUT /api/service-items/{item_id}
#[utoipa::path(
    put,
    path = "/api/service-items/{item_id}",
    tag = "Service Orders",
    request_body = ItemPayload,
    params(("item_id" = i64, Path, description = "ID do item")),
    responses(
        (status = 200, description = "Item alterado", body = ItemMutation),
        (status = 404, description = "Item não encontrado"),
        (status = 423, description = "OS bloqueada para edição")
    )
)]
pub async fn update_item(
    State(app_state): State<AppState>,
    Path(item_id): Path<i64>,
    Json(payload): Json<ItemPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let result = app_state
        .order_service
        .update_item(&app_state.db_pool, item_id, &payload.into())
        .await?;

    Ok(Json(result))
}

// DELETE /api/service-items/{item_id}
#[utoipa::path(
    delete,
    path = "/api/service-items/{item_id}",
    tag = "Service Orders",
    params(("item_id" = i64, Path, description = "ID do item")),
    responses(
        (status = 204, description = "Item removido"),
        (status = 423, description = "OS bloqueada para edição")
    )
)]
pub async fn delete_item(
    State(app_state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    app_state.order_service.delete_item(&app_state.db_pool, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
//  4. MÃO DE OBRA
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LaborPayload {
    #[validate(length(min = 1, max = 255, message = "A descrição é obrigatória."))]
    #[schema(example = "Troca de pastilhas")]
    pub description: String,

    #[validate(custom(function = "crate::handlers::validate_money"))]
    #[schema(example = "120.00")]
    pub amount: Decimal,

    pub employee_id: Option<i64>,
}

// POST /api/service-orders/{id}/labor
#[utoipa::path(
    post,
    path = "/api/service-orders/{id}/labor",
    tag = "Service Orders",
    request_body = LaborPayload,
    params(("id" = i64, Path, description = "ID da OS")),
    responses(
        (status = 201, description = "Mão de obra incluída", body = LaborService),
        (status = 423, description = "OS bloqueada para edição")
    )
)]
pub async fn add_labor(
    State(app_state): State<AppState>,
    Path(os_id): Path<i64>,
    Json(payload): Json<LaborPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let labor = app_state
        .order_service
        .add_labor(
            &app_state.db_pool,
            os_id,
            payload.description.trim(),
            payload.amount,
            payload.employee_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(labor)))
}

// DELETE /api/labor/{labor_id}
#[utoipa::path(
    delete,
    path = "/api/labor/{labor_id}",
    tag = "Service Orders",
    params(("labor_id" = i64, Path, description = "ID da mão de obra")),
    responses(
        (status = 204, description = "Mão de obra removida"),
        (status = 423, description = "OS bloqueada para edição")
    )
)]
pub async fn delete_labor(
    State(app_state): State<AppState>,
    Path(labor_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    app_state.order_service.delete_labor(&app_state.db_pool, labor_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn item_payload_validates_quantity_and_price() {
        let payload: ItemPayload =
            serde_json::from_str(r#"{"partId": 10, "quantity": 2}"#).unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.quantity, dec!(2));

        let payload: ItemPayload =
            serde_json::from_str(r#"{"partId": 10, "quantity": 0}"#).unwrap();
        assert!(payload.validate().is_err());

        let payload: ItemPayload =
            serde_json::from_str(r#"{"description": "Avulso", "quantity": 1, "unitPrice": -5}"#)
                .unwrap();
        assert!(payload.validate().is_err());

        // NUMERIC(14, 3) arredondaria 0.0004 para zero
        let payload: ItemPayload =
            serde_json::from_str(r#"{"partId": 10, "quantity": 0.0004}"#).unwrap();
        assert!(payload.validate().is_err());

        let payload: ItemPayload =
            serde_json::from_str(r#"{"partId": 10, "quantity": 1.5, "unitPrice": 10.999}"#)
                .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn transition_payload_accepts_legacy_label() {
        let payload: TransitionPayload =
            serde_json::from_str(r#"{"status": "PRONTO PARA FINANCEIRO"}"#).unwrap();
        assert_eq!(payload.status, OsStatus::Financeiro);
    }
}
