// src/models/inventory.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::service_order::OsStatus;

// --- 1. Peças em estoque ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockPart {
    pub id: i64,
    #[schema(example = "Filtro de óleo")]
    pub name: String,
    #[schema(example = "FO-118")]
    pub ref_code: Option<String>,

    pub on_hand: Decimal, // estoque_atual: quantidade FÍSICA

    pub min_stock: Decimal,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- 2. Disponibilidade (derivada, nunca gravada) ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockAvailability {
    pub part_id: i64,
    #[schema(example = "10")]
    pub on_hand: Decimal,
    #[schema(example = "3")]
    pub reserved: Decimal,
    #[schema(example = "7")]
    pub available: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockWarningLevel {
    Low,
    OutOfStock,
}

/// Aviso não fatal devolvido junto com a operação de item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockWarning {
    pub part_id: i64,
    pub level: StockWarningLevel,
    pub available: Decimal,
}

/// Linha usada no cálculo da reserva: um item de OS ligado à peça.
#[derive(Debug, Clone, FromRow)]
pub struct ReservationRow {
    pub os_status: OsStatus,
    pub quantity: Decimal,
    pub committed: Decimal,
}

// --- 3. Baixas por item de OS ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockCommitment {
    pub os_id: i64,
    pub item_id: i64,
    pub part_id: i64,
    pub quantity: Decimal,
}

// --- 4. Movimentações de Estoque ---
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "stock_movement_reason", rename_all = "SCREAMING_SNAKE_CASE")] // Banco
#[serde(rename_all = "SCREAMING_SNAKE_CASE")] // JSON
pub enum StockMovementReason {
    Entrada,   // Compra / entrada manual
    BaixaOs,   // Vira "BAIXA_OS"
    EstornoOs, // Vira "ESTORNO_OS"
    Ajuste,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: i64,
    pub part_id: i64,
    pub os_id: Option<i64>,
    pub quantity_changed: Decimal,
    pub reason: StockMovementReason,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
