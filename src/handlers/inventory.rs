// src/handlers/inventory.rs

use axum::{
    extract::{Path, State},
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
    models::inventory::{StockAvailability, StockPart},
};

// ---
// Payload: CreatePart
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartPayload {
    #[validate(length(min = 1, message = "O nome é obrigatório."))]
    #[schema(example = "Filtro de óleo")]
    pub name: String,

    #[schema(example = "FO-118")]
    pub ref_code: Option<String>,

    // Se não tiver estoque inicial, pode mandar 0.
    #[validate(custom(function = "crate::handlers::validate_not_negative"))]
    #[serde(default)]
    #[schema(example = "10")]
    pub initial_stock: Decimal,

    #[validate(custom(function = "crate::handlers::validate_not_negative"))]
    #[serde(default)]
    #[schema(example = "2")]
    pub min_stock: Decimal,

    #[validate(custom(function = "crate::handlers::validate_money"))]
    #[serde(default)]
    #[schema(example = "18.50")]
    pub cost_price: Decimal,

    #[validate(custom(function = "crate::handlers::validate_money"))]
    #[schema(example = "32.90")]
    pub sale_price: Decimal,
}

// POST /api/inventory/parts
#[utoipa::path(
    post,
    path = "/api/inventory/parts",
    tag = "Inventory",
    request_body = CreatePartPayload,
    responses(
        (status = 201, description = "Peça cadastrada", body = StockPart),
        (status = 400, description = "Dados inválidos"),
        (status = 409, description = "Referência já cadastrada")
    )
)]
pub async fn create_part(
    State(app_state): State<AppState>,
    Json(payload): Json<CreatePartPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let part = app_state
        .inventory_service
        .create_part(
            &app_state.db_pool,
            payload.name.trim(),
            payload.ref_code.as_deref(),
            payload.initial_stock,
            payload.min_stock,
            payload.cost_price,
            payload.sale_price,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(part)))
}

// GET /api/inventory/parts
#[utoipa::path(
    get,
    path = "/api/inventory/parts",
    tag = "Inventory",
    responses(
        (status = 200, description = "Peças em ordem alfabética", body = Vec<StockPart>)
    )
)]
pub async fn list_parts(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let parts = app_state.inventory_service.list_parts().await?;
    Ok(Json(parts))
}

// GET /api/inventory/parts/{id}/availability
#[utoipa::path(
    get,
    path = "/api/inventory/parts/{id}/availability",
    tag = "Inventory",
    params(("id" = i64, Path, description = "ID da peça")),
    responses(
        (status = 200, description = "Estoque físico, reservado e disponível", body = StockAvailability),
        (status = 404, description = "Peça não encontrada")
    )
)]
pub async fn check_availability(
    State(app_state): State<AppState>,
    Path(part_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let availability = app_state
        .inventory_service
        .check_availability(&app_state.db_pool, part_id)
        .await?;
    Ok(Json(availability))
}

// ---
// Payload: AddStock (entrada manual / compra)
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddStockPayload {
    #[validate(custom(function = "crate::handlers::validate_quantity"))]
    #[schema(example = "5")]
    pub quantity: Decimal,

    #[validate(custom(function = "crate::handlers::validate_money"))]
    #[schema(example = "19.90")]
    pub unit_cost: Decimal,

    #[schema(example = "NF 4512")]
    pub notes: Option<String>,
}

// POST /api/inventory/parts/{id}/stock-entry
#[utoipa::path(
    post,
    path = "/api/inventory/parts/{id}/stock-entry",
    tag = "Inventory",
    request_body = AddStockPayload,
    params(("id" = i64, Path, description = "ID da peça")),
    responses(
        (status = 200, description = "Entrada registrada; custo médio recalculado", body = StockPart),
        (status = 404, description = "Peça não encontrada")
    )
)]
pub async fn add_stock(
    State(app_state): State<AppState>,
    Path(part_id): Path<i64>,
    Json(payload): Json<AddStockPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let part = app_state
        .inventory_service
        .add_stock(
            &app_state.db_pool,
            part_id,
            payload.quantity,
            payload.unit_cost,
            payload.notes.as_deref(),
        )
        .await?;

    Ok(Json(part))
}
