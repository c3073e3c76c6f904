//src/main.rs

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Declaração dos nossos módulos
mod common;
mod config;
mod db;
mod docs;
mod gateway;
mod handlers;
mod models;
mod services;

use crate::config::AppState;

#[tokio::main]
async fn main() {
    // Inicializa o logger.
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Roda as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    let inventory_routes = Router::new()
        .route(
            "/records",
            post(handlers::inventory::create_record).get(handlers::inventory::list_records),
        )
        .route(
            "/records/{product_id}",
            get(handlers::inventory::get_record).delete(handlers::inventory::delete_record),
        )
        .route(
            "/records/by-variant/{variant_id}",
            get(handlers::inventory::get_record_by_variant),
        )
        .route("/search", get(handlers::inventory::search_records))
        .route(
            "/external/locations",
            get(handlers::inventory::list_external_locations),
        )
        .route(
            "/external/variants",
            get(handlers::inventory::search_external_variants),
        )
        .route(
            "/{product_id}/transfer",
            post(handlers::inventory::transfer_stock),
        )
        .route(
            "/{product_id}/adjust",
            post(handlers::inventory::adjust_stock),
        )
        .route(
            "/{product_id}/reserve",
            post(handlers::inventory::reserve_stock),
        )
        .route(
            "/{product_id}/release",
            post(handlers::inventory::release_stock),
        );

    // Entrega assíncrona da plataforma externa (sem gateway no caminho:
    // o evento já reflete o estado da plataforma).
    let webhook_routes = Router::new().route(
        "/inventory-levels",
        post(handlers::webhooks::inventory_level_changed),
    );

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/inventory", inventory_routes)
        .nest("/api/webhooks", webhook_routes)
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
        )
        .with_state(app_state);

    // Inicia o servidor
    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .await
        .expect("Erro no servidor Axum");
}
