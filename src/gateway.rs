// src/gateway.rs

pub mod shopify;
pub use shopify::{ShopifyConfig, ShopifyGateway};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

// ---
// Erro do Gateway
// ---
// A classificação acontece NA FRONTEIRA do gateway: quem chama decide
// rollback vs repropagar sem olhar código HTTP cru.
#[derive(Debug, Error)]
pub enum GatewayError {
    // Rede, timeout, limite de requisições, 5xx. A operação inteira pode ser
    // repetida do zero pelo chamador.
    #[error("falha transitória: {0}")]
    Transient(String),

    // Identificador inválido, falha de autenticação. Repetir não ajuda;
    // exige intervenção do operador para corrigir o vínculo.
    #[error("falha permanente: {0}")]
    Permanent(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

// ---
// DTOs do Gateway (visão local dos objetos da plataforma)
// ---
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLocation {
    pub id: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalVariant {
    pub external_product_id: String,
    pub external_variant_id: String,
    pub external_inventory_item_id: String,
    pub product_title: String,
    pub variant_title: String,
    pub sku: Option<String>,
    pub available: i64,
}

// ---
// Contrato do Gateway de Inventário Externo
// ---
// Tradução fina entre operações locais e a API da plataforma de comércio.
// O gateway não guarda estado mutável e NÃO faz retry: a política de
// repetição/backoff é responsabilidade do chamador. Toda chamada bem-sucedida
// de `set_availability` é uma escrita externa durável.
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Lê a quantidade disponível atual de uma variante na plataforma.
    async fn fetch_availability(&self, external_variant_id: &str) -> Result<i64, GatewayError>;

    /// Escreve (write-through) a quantidade disponível de um item de inventário.
    /// Se `location_id` for None, resolve primeiro a localização primária da loja.
    async fn set_availability(
        &self,
        external_inventory_item_id: &str,
        quantity: i64,
        location_id: Option<&str>,
    ) -> Result<(), GatewayError>;

    /// Lista as localizações físicas cadastradas na plataforma.
    async fn list_locations(&self) -> Result<Vec<ExternalLocation>, GatewayError>;

    /// Busca variantes por título de produto (ferramenta de operador para
    /// vincular registros locais).
    async fn search_variants(&self, query: &str) -> Result<Vec<ExternalVariant>, GatewayError>;
}
