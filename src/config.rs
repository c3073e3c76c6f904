// src/config.rs

use std::{env, sync::Arc, time::Duration};

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
    db::PgLedgerStore,
    gateway::{ShopifyConfig, ShopifyGateway},
    services::ReconciliationService,
};

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub reconciliation_service: ReconciliationService,
}

impl AppState {
    // Função para carregar as configurações e criar o AppState
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // O cliente da plataforma externa é construído aqui e INJETADO no
        // serviço; o motor de reconciliação só enxerga o trait, nunca um
        // singleton de módulo.
        let shopify_config = ShopifyConfig {
            shop_domain: env::var("SHOPIFY_SHOP_DOMAIN")
                .expect("SHOPIFY_SHOP_DOMAIN deve ser definida"),
            access_token: env::var("SHOPIFY_ADMIN_TOKEN")
                .expect("SHOPIFY_ADMIN_TOKEN deve ser definido"),
            api_version: env::var("SHOPIFY_API_VERSION")
                .unwrap_or_else(|_| "2024-10".to_string()),
            location_id: env::var("SHOPIFY_LOCATION_ID").ok(),
            timeout: Duration::from_secs(
                env::var("SHOPIFY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
        };

        let gateway = Arc::new(ShopifyGateway::new(shopify_config)?);
        let ledger_store = Arc::new(PgLedgerStore::new(db_pool.clone()));
        let reconciliation_service = ReconciliationService::new(ledger_store, gateway);

        Ok(Self {
            db_pool,
            reconciliation_service,
        })
    }
}
