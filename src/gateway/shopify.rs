// src/gateway/shopify.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::{ExternalLocation, ExternalVariant, GatewayError, InventoryGateway};

// ---
// Configuração (injetada pelo AppState, nunca um singleton de módulo)
// ---
#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    // Ex: "minha-loja.myshopify.com"
    pub shop_domain: String,
    pub access_token: String,
    // Ex: "2024-10"
    pub api_version: String,
    // Se presente, todas as escritas vão para esta localização em vez da primária.
    pub location_id: Option<String>,
    pub timeout: Duration,
}

// ---
// Cliente da Admin REST API da Shopify
// ---
pub struct ShopifyGateway {
    client: reqwest::Client,
    shop_domain: String,
    access_token: String,
    api_version: String,
    location_override: Option<String>,
    // A localização primária da loja muda raramente; resolvemos uma vez.
    primary_location: OnceCell<String>,
}

impl ShopifyGateway {
    pub fn new(config: ShopifyConfig) -> anyhow::Result<Self> {
        // Timeout limitado: um timeout vira GatewayError::Transient e dispara
        // o mesmo caminho de rollback que qualquer outra falha de escrita.
        let client = reqwest::Client::builder()
            .user_agent("inventory-backend/0.1")
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            shop_domain: config.shop_domain,
            access_token: config.access_token,
            api_version: config.api_version,
            location_override: config.location_id,
            primary_location: OnceCell::new(),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "https://{}/admin/api/{}/{}",
            self.shop_domain, self.api_version, endpoint
        )
    }

    fn build_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("X-Shopify-Access-Token", &self.access_token)
    }

    /// Classifica um status HTTP de erro da plataforma.
    /// 429 e 5xx são repetíveis; o resto (401/403/404/422...) não.
    fn classify_status(status: StatusCode, context: &str) -> GatewayError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            GatewayError::Transient(format!("{}: HTTP {}", context, status))
        } else {
            GatewayError::Permanent(format!("{}: HTTP {}", context, status))
        }
    }

    /// Classifica um erro do próprio cliente HTTP (antes de haver resposta).
    fn classify_request_error(err: reqwest::Error, context: &str) -> GatewayError {
        if err.is_decode() {
            // A plataforma respondeu algo que não bate com o contrato.
            GatewayError::Permanent(format!("{}: resposta inesperada ({})", context, err))
        } else {
            // Timeout, conexão recusada, DNS... tudo repetível.
            GatewayError::Transient(format!("{}: {}", context, err))
        }
    }

    /// Os ids REST da Shopify são numéricos; no ledger eles trafegam como
    /// string. Um id não numérico é um vínculo quebrado, não uma falha de rede.
    fn parse_external_id(id: &str, context: &str) -> Result<i64, GatewayError> {
        id.parse::<i64>()
            .map_err(|_| GatewayError::Permanent(format!("{}: id externo inválido '{}'", context, id)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        context: &str,
    ) -> Result<T, GatewayError> {
        let url = self.api_url(endpoint);
        let response = self
            .build_request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| Self::classify_request_error(e, context))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(response.status(), context));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Self::classify_request_error(e, context))
    }

    /// Resolve a localização de destino das escritas: override da configuração,
    /// senão a localização primária da loja (cacheada).
    async fn resolve_location(&self) -> Result<String, GatewayError> {
        if let Some(id) = &self.location_override {
            return Ok(id.clone());
        }

        self.primary_location
            .get_or_try_init(|| async {
                let shop: ShopEnvelope = self.get_json("shop.json", "consulta da loja").await?;
                Ok::<_, GatewayError>(shop.shop.primary_location_id.to_string())
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl InventoryGateway for ShopifyGateway {
    async fn fetch_availability(&self, external_variant_id: &str) -> Result<i64, GatewayError> {
        let variant_id = Self::parse_external_id(external_variant_id, "leitura de variante")?;
        let envelope: VariantEnvelope = self
            .get_json(
                &format!("variants/{}.json", variant_id),
                "leitura de variante",
            )
            .await?;
        Ok(envelope.variant.inventory_quantity)
    }

    async fn set_availability(
        &self,
        external_inventory_item_id: &str,
        quantity: i64,
        location_id: Option<&str>,
    ) -> Result<(), GatewayError> {
        let context = "escrita de nível de inventário";
        let inventory_item_id = Self::parse_external_id(external_inventory_item_id, context)?;

        let location = match location_id {
            Some(id) => id.to_string(),
            None => self.resolve_location().await?,
        };
        let location_id = Self::parse_external_id(&location, context)?;

        let url = self.api_url("inventory_levels/set.json");
        let body = SetLevelRequest {
            location_id,
            inventory_item_id,
            available: quantity,
        };

        let response = self
            .build_request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::classify_request_error(e, context))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(response.status(), context));
        }

        Ok(())
    }

    async fn list_locations(&self) -> Result<Vec<ExternalLocation>, GatewayError> {
        let envelope: LocationsEnvelope = self
            .get_json("locations.json", "listagem de localizações")
            .await?;

        Ok(envelope
            .locations
            .into_iter()
            .map(|l| ExternalLocation {
                id: l.id.to_string(),
                name: l.name,
                active: l.active,
            })
            .collect())
    }

    async fn search_variants(&self, query: &str) -> Result<Vec<ExternalVariant>, GatewayError> {
        let envelope: ProductsEnvelope = self
            .get_json(
                &format!("products.json?title={}&limit=10", urlencode(query)),
                "busca de variantes",
            )
            .await?;

        let variants = envelope
            .products
            .into_iter()
            .flat_map(|product| {
                let product_id = product.id;
                let product_title = product.title;
                product.variants.into_iter().map(move |v| ExternalVariant {
                    external_product_id: product_id.to_string(),
                    external_variant_id: v.id.to_string(),
                    external_inventory_item_id: v.inventory_item_id.to_string(),
                    product_title: product_title.clone(),
                    variant_title: v.title,
                    sku: v.sku,
                    available: v.inventory_quantity,
                })
            })
            .collect();

        Ok(variants)
    }
}

// Escapa o mínimo necessário para um parâmetro de query string.
fn urlencode(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            ' ' => "+".to_string(),
            other => {
                let mut buf = [0u8; 4];
                other
                    .encode_utf8(&mut buf)
                    .as_bytes()
                    .iter()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect()
}

// ---
// Formas de payload da Admin REST API
// ---
#[derive(Deserialize)]
struct VariantEnvelope {
    variant: VariantBody,
}

#[derive(Deserialize)]
struct VariantBody {
    id: i64,
    title: String,
    sku: Option<String>,
    inventory_item_id: i64,
    inventory_quantity: i64,
}

#[derive(Deserialize)]
struct LocationsEnvelope {
    locations: Vec<LocationBody>,
}

#[derive(Deserialize)]
struct LocationBody {
    id: i64,
    name: String,
    active: bool,
}

#[derive(Deserialize)]
struct ShopEnvelope {
    shop: ShopBody,
}

#[derive(Deserialize)]
struct ShopBody {
    primary_location_id: i64,
}

#[derive(Deserialize)]
struct ProductsEnvelope {
    products: Vec<ProductBody>,
}

#[derive(Deserialize)]
struct ProductBody {
    id: i64,
    title: String,
    variants: Vec<VariantBody>,
}

#[derive(Serialize)]
struct SetLevelRequest {
    location_id: i64,
    inventory_item_id: i64,
    available: i64,
}
