// src/models/service_order.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::{
    finance::{ClientPayment, OsTotals},
    inventory::StockWarning,
};

// --- Enums ---

/// Status da Ordem de Serviço. Única representação usada pelas regras de negócio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "os_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OsStatus {
    Agendamento,
    Orcamento,
    Aberta,
    EmAndamento,
    Financeiro, // "Pronto para financeiro"
    Finalizada,
    PagaCliente,
    Cancelada,
}

// Nomes legados aceitos na entrada (telas antigas e integrações).
// Fica só aqui, na borda de serialização.
const STATUS_ALIASES: &[(&str, OsStatus)] = &[
    ("AGENDAMENTO", OsStatus::Agendamento),
    ("ORCAMENTO", OsStatus::Orcamento),
    ("ORÇAMENTO", OsStatus::Orcamento),
    ("ABERTA", OsStatus::Aberta),
    ("EM_ANDAMENTO", OsStatus::EmAndamento),
    ("EM ANDAMENTO", OsStatus::EmAndamento),
    ("FINANCEIRO", OsStatus::Financeiro),
    ("PRONTO PARA FINANCEIRO", OsStatus::Financeiro),
    ("PRONTO_PARA_FINANCEIRO", OsStatus::Financeiro),
    ("FINALIZADA", OsStatus::Finalizada),
    ("PAGA_CLIENTE", OsStatus::PagaCliente),
    ("PAGA CLIENTE", OsStatus::PagaCliente),
    ("PAGA", OsStatus::PagaCliente),
    ("CANCELADA", OsStatus::Cancelada),
];

impl OsStatus {
    pub const ALL: [OsStatus; 8] = [
        OsStatus::Agendamento,
        OsStatus::Orcamento,
        OsStatus::Aberta,
        OsStatus::EmAndamento,
        OsStatus::Financeiro,
        OsStatus::Finalizada,
        OsStatus::PagaCliente,
        OsStatus::Cancelada,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OsStatus::Agendamento => "AGENDAMENTO",
            OsStatus::Orcamento => "ORCAMENTO",
            OsStatus::Aberta => "ABERTA",
            OsStatus::EmAndamento => "EM_ANDAMENTO",
            OsStatus::Financeiro => "FINANCEIRO",
            OsStatus::Finalizada => "FINALIZADA",
            OsStatus::PagaCliente => "PAGA_CLIENTE",
            OsStatus::Cancelada => "CANCELADA",
        }
    }

    /// Itens de OS nestes status não contam mais como reserva de estoque.
    pub fn releases_reservation(self) -> bool {
        matches!(
            self,
            OsStatus::Finalizada | OsStatus::PagaCliente | OsStatus::Cancelada
        )
    }

    /// Itens e mão de obra só podem ser alterados antes do fechamento.
    /// Em FINANCEIRO o snapshot já está congelado; é preciso reabrir.
    pub fn allows_item_changes(self) -> bool {
        matches!(
            self,
            OsStatus::Agendamento | OsStatus::Orcamento | OsStatus::Aberta | OsStatus::EmAndamento
        )
    }
}

impl fmt::Display for OsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status de OS desconhecido: '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for OsStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        STATUS_ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, status)| *status)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for OsStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrder {
    #[schema(example = 1024)]
    pub id: i64,
    pub client_id: Option<i64>,
    pub vehicle_id: Option<i64>,
    pub status: OsStatus,
    #[schema(example = "Barulho na suspensão dianteira")]
    pub notes: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,

    // Snapshot congelado na passagem para FINANCEIRO
    #[schema(example = "350.00")]
    pub parts_total: Option<Decimal>,
    #[schema(example = "200.00")]
    pub labor_total: Option<Decimal>,
    #[schema(example = "550.00")]
    pub client_total: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OsItem {
    pub id: i64,
    pub os_id: i64,
    pub part_id: Option<i64>,
    #[schema(example = "Pastilha de freio dianteira")]
    pub description: String,
    #[schema(example = "PF-2231")]
    pub ref_code: Option<String>,
    #[schema(example = "2")]
    pub quantity: Decimal,
    #[schema(example = "89.90")]
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OsItem {
    pub fn total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// Item como sai na API: o total é sempre recalculado.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OsItemView {
    #[serde(flatten)]
    pub item: OsItem,
    #[schema(example = "179.80")]
    pub total: Decimal,
}

impl From<OsItem> for OsItemView {
    fn from(item: OsItem) -> Self {
        let total = item.total();
        Self { item, total }
    }
}

/// Resposta de inclusão/edição de item: o item e os avisos de estoque.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemMutation {
    pub item: OsItemView,
    pub warnings: Vec<StockWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LaborService {
    pub id: i64,
    pub os_id: i64,
    #[schema(example = "Troca de pastilhas")]
    pub description: String,
    #[schema(example = "120.00")]
    pub amount: Decimal,
    pub employee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrderDetail {
    #[serde(flatten)]
    pub header: ServiceOrder,
    pub items: Vec<OsItemView>,
    pub labor: Vec<LaborService>,
    pub payments: Vec<ClientPayment>,
    pub totals: OsTotals,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn legacy_aliases_map_to_single_variant() {
        assert_eq!("PRONTO PARA FINANCEIRO".parse::<OsStatus>(), Ok(OsStatus::Financeiro));
        assert_eq!("pronto_para_financeiro".parse::<OsStatus>(), Ok(OsStatus::Financeiro));
        assert_eq!("Em Andamento".parse::<OsStatus>(), Ok(OsStatus::EmAndamento));
        assert!("ENTREGUE".parse::<OsStatus>().is_err());
    }

    #[test]
    fn canonical_tags_round_trip() {
        for status in OsStatus::ALL {
            assert_eq!(status.as_str().parse::<OsStatus>(), Ok(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let back: OsStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn json_accepts_legacy_financeiro_label() {
        let status: OsStatus = serde_json::from_str("\"PRONTO PARA FINANCEIRO\"").unwrap();
        assert_eq!(status, OsStatus::Financeiro);
    }

    #[test]
    fn only_pre_closure_statuses_accept_item_changes() {
        let editable: Vec<_> = OsStatus::ALL
            .into_iter()
            .filter(|s| s.allows_item_changes())
            .collect();
        assert_eq!(
            editable,
            vec![
                OsStatus::Agendamento,
                OsStatus::Orcamento,
                OsStatus::Aberta,
                OsStatus::EmAndamento
            ]
        );
    }

    #[test]
    fn item_total_is_derived_from_inputs() {
        let mut item = OsItem {
            id: 1,
            os_id: 1,
            part_id: None,
            description: "Óleo 5W30".into(),
            ref_code: None,
            quantity: dec!(4),
            unit_price: dec!(42.50),
            created_at: Utc::now(),
        };
        assert_eq!(item.total(), dec!(170.00));
        item.quantity = dec!(3);
        assert_eq!(OsItemView::from(item).total, dec!(127.50));
    }
}
