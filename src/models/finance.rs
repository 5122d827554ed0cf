// src/models/finance.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Dinheiro,
    Pix,
    Debito,
    Credito,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Dinheiro => "DINHEIRO",
            PaymentMethod::Pix => "PIX",
            PaymentMethod::Debito => "DEBITO",
            PaymentMethod::Credito => "CREDITO",
        }
    }

    pub fn card_modality(self) -> Option<CardModality> {
        match self {
            PaymentMethod::Debito => Some(CardModality::Debito),
            PaymentMethod::Credito => Some(CardModality::Credito),
            PaymentMethod::Dinheiro | PaymentMethod::Pix => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardModality {
    Debito,
    Credito,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Recebido,          // Dinheiro / PIX
    AguardandoRepasse, // Cartão, aguardando depósito da operadora
    Repassado,         // Cartão, depósito conferido
    Estornado,
}

impl PaymentStatus {
    pub fn counts_as_paid(self) -> bool {
        !matches!(self, PaymentStatus::Estornado)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "cash_book_origin", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashBookOrigin {
    FechamentoOs,
    EstornoFechamentoOs,
    PagamentoCliente,
    EstornoPagamento,
    Manual,
}

// --- Operadoras de cartão ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardOperator {
    pub id: i64,
    #[schema(example = "Stone")]
    pub name: String,

    // Débito
    #[schema(example = "1.49")]
    pub debit_rate: Option<Decimal>,
    #[schema(example = 1)]
    pub debit_days: Option<i32>,

    // Crédito à vista
    #[schema(example = "3.19")]
    pub credit_rate: Option<Decimal>,
    #[schema(example = 30)]
    pub credit_days: Option<i32>,

    // Crédito parcelado (padrão quando não há taxa específica por parcela)
    #[schema(example = "4.99")]
    pub installment_rate: Option<Decimal>,
    #[schema(example = 30)]
    pub installment_days: Option<i32>,

    #[schema(example = "2.00")]
    pub anticipation_rate: Decimal,
    pub auto_anticipation: bool,
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentRate {
    #[serde(default)]
    #[schema(ignore)]
    pub operator_id: i64,
    #[schema(example = 3)]
    pub installments: i32,
    #[schema(example = "5.50")]
    pub total_rate: Decimal,
    pub anticipation_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardOperatorDetail {
    #[serde(flatten)]
    pub operator: CardOperator,
    pub installment_rates: Vec<InstallmentRate>,
}

/// Resultado do cálculo de repasse de um pagamento com cartão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    #[schema(example = "5.00")]
    pub rate: Decimal,
    #[schema(example = "0")]
    pub anticipation_rate: Decimal,
    #[schema(example = "50.00")]
    pub fee_amount: Decimal,
    #[schema(example = "950.00")]
    pub net_amount: Decimal,
    #[schema(value_type = String, format = Date, example = "2025-04-30")]
    pub settlement_date: NaiveDate,
    pub anticipated: bool,
}

// --- Pagamentos do cliente ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientPayment {
    pub id: i64,
    pub os_id: i64,
    #[schema(example = "1000.00")]
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[schema(example = 1)]
    pub installments: i32,
    pub operator_id: Option<i64>,
    #[schema(value_type = String, format = Date, example = "2025-03-31")]
    pub paid_on: NaiveDate,

    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    #[schema(value_type = Option<String>, format = Date)]
    pub settlement_date: Option<NaiveDate>,
    pub anticipated: bool,

    pub status: PaymentStatus,
    pub cash_book_entry_id: Option<i64>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub payment: ClientPayment,
    pub settlement: Option<Settlement>,
}

// --- Livro caixa ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CashBookEntry {
    pub id: i64,
    pub os_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub origin: CashBookOrigin,
    //Positivo = Entrada, Negativo = Saída
    #[schema(example = "-150.00")]
    pub amount: Decimal,
    #[schema(example = "Pagamento OS #1024 (PIX)")]
    pub description: String,
    #[schema(value_type = String, format = Date, example = "2025-03-31")]
    pub occurred_on: NaiveDate,
    pub reversed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// --- Fechamento financeiro ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementLabel {
    Quitado,
    Pendente,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OsTotals {
    #[schema(example = "350.00")]
    pub parts: Decimal,
    #[schema(example = "200.00")]
    pub labor: Decimal,
    #[schema(example = "550.00")]
    pub general: Decimal,
    #[schema(example = "500.00")]
    pub paid: Decimal,
    #[schema(example = "50.00")]
    pub pending: Decimal,
    pub is_paid: bool,
    pub settlement_label: SettlementLabel,
}
