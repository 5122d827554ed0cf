// src/docs.rs

use utoipa::OpenApi;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- SERVICE ORDERS ---
        handlers::service_orders::create_order,
        handlers::service_orders::list_orders,
        handlers::service_orders::get_order,
        handlers::service_orders::transition_status,
        handlers::service_orders::add_item,
        handlers::service_orders::update_item,
        handlers::service_orders::delete_item,
        handlers::service_orders::add_labor,
        handlers::service_orders::delete_labor,

        // --- INVENTORY ---
        handlers::inventory::create_part,
        handlers::inventory::list_parts,
        handlers::inventory::check_availability,
        handlers::inventory::add_stock,

        // --- FINANCE ---
        handlers::finance::get_totals,
        handlers::finance::register_payment,
        handlers::finance::reverse_payment,
        handlers::finance::confirm_settlements,
        handlers::finance::create_operator,
        handlers::finance::list_operators,
        handlers::finance::update_operator,
        handlers::finance::simulate,
        handlers::finance::list_cash_book,
    ),
    components(
        schemas(
            // --- Service Orders ---
            models::service_order::OsStatus,
            models::service_order::ServiceOrder,
            models::service_order::OsItem,
            models::service_order::OsItemView,
            models::service_order::ItemMutation,
            models::service_order::LaborService,
            models::service_order::ServiceOrderDetail,

            // --- Inventory ---
            models::inventory::StockPart,
            models::inventory::StockAvailability,
            models::inventory::StockWarningLevel,
            models::inventory::StockWarning,
            models::inventory::StockMovementReason,
            models::inventory::StockMovement,

            // --- Finance ---
            models::finance::PaymentMethod,
            models::finance::CardModality,
            models::finance::PaymentStatus,
            models::finance::CashBookOrigin,
            models::finance::CardOperator,
            models::finance::InstallmentRate,
            models::finance::CardOperatorDetail,
            models::finance::Settlement,
            models::finance::ClientPayment,
            models::finance::PaymentReceipt,
            models::finance::CashBookEntry,
            models::finance::SettlementLabel,
            models::finance::OsTotals,

            // --- Payloads ---
            handlers::service_orders::CreateOrderPayload,
            handlers::service_orders::TransitionPayload,
            handlers::service_orders::ItemPayload,
            handlers::service_orders::LaborPayload,
            handlers::inventory::CreatePartPayload,
            handlers::inventory::AddStockPayload,
            handlers::finance::RegisterPaymentPayload,
            handlers::finance::ConfirmSettlementsPayload,
            handlers::finance::CardOperatorPayload,
            handlers::finance::SimulatePayload,
        )
    ),
    tags(
        (name = "Service Orders", description = "Ordens de Serviço: status, itens e mão de obra"),
        (name = "Inventory", description = "Peças, entradas e disponibilidade"),
        (name = "Finance", description = "Pagamentos, operadoras de cartão e livro caixa")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/api/service-orders",
            "/api/service-orders/{id}/status",
            "/api/service-items/{item_id}",
            "/api/payments/settlements/confirm",
            "/api/card-operators/{id}/simulate",
            "/api/inventory/parts/{id}/availability",
            "/api/cash-book",
        ] {
            assert!(paths.contains(&expected), "faltando {expected}");
        }
    }
}
