//src/main.rs

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod services;

use crate::config::{AppConfig, AppState};
use crate::docs::ApiDoc;

fn router(app_state: AppState) -> Router {
    let service_order_routes = Router::new()
        .route(
            "/",
            post(handlers::service_orders::create_order).get(handlers::service_orders::list_orders),
        )
        .route("/{id}", get(handlers::service_orders::get_order))
        .route("/{id}/status", post(handlers::service_orders::transition_status))
        .route("/{id}/items", post(handlers::service_orders::add_item))
        .route("/{id}/labor", post(handlers::service_orders::add_labor))
        .route("/{id}/totals", get(handlers::finance::get_totals))
        .route("/{id}/payments", post(handlers::finance::register_payment));

    let inventory_routes = Router::new()
        .route(
            "/parts",
            post(handlers::inventory::create_part).get(handlers::inventory::list_parts),
        )
        .route("/parts/{id}/availability", get(handlers::inventory::check_availability))
        .route("/parts/{id}/stock-entry", post(handlers::inventory::add_stock));

    let card_operator_routes = Router::new()
        .route(
            "/",
            post(handlers::finance::create_operator).get(handlers::finance::list_operators),
        )
        .route("/{id}", put(handlers::finance::update_operator))
        .route("/{id}/simulate", post(handlers::finance::simulate));

    // Combina tudo no router principal
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/service-orders", service_order_routes)
        .route(
            "/api/service-items/{item_id}",
            put(handlers::service_orders::update_item).delete(handlers::service_orders::delete_item),
        )
        .route("/api/labor/{labor_id}", delete(handlers::service_orders::delete_labor))
        .route("/api/payments/{payment_id}", delete(handlers::finance::reverse_payment))
        .route(
            "/api/payments/settlements/confirm",
            post(handlers::finance::confirm_settlements),
        )
        .nest("/api/card-operators", card_operator_routes)
        .nest("/api/inventory", inventory_routes)
        .route("/api/cash-book", get(handlers::finance::list_cash_book))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controla o nível; sem ele, info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let config = AppConfig::from_env()?;
    let app_state = AppState::new(&config).await?;

    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Falha ao rodar as migrações do banco de dados: {e}"))?;

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    let app = router(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
