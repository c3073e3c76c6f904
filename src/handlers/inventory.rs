// src/handlers/inventory.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::error::AppError,
    config::AppState,
    models::inventory::{ExternalLink, InventoryRecord, StockChannel, TransferDirection},
};

// ---
// Validação Customizada
// ---
fn validate_not_negative(val: i64) -> Result<(), ValidationError> {
    if val < 0 {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

fn validate_nonzero(val: i64) -> Result<(), ValidationError> {
    if val == 0 {
        let mut err = ValidationError::new("nonzero");
        err.message = Some("O ajuste deve ser diferente de zero.".into());
        return Err(err);
    }
    Ok(())
}

// ---
// Payload: CreateRecord
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordPayload {
    pub product_id: Uuid,

    #[validate(length(min = 1, message = "O nome do produto é obrigatório."))]
    pub product_name: String,

    // Vínculo com a plataforma externa: ou os três ids, ou nenhum.
    pub external_product_id: Option<String>,
    pub external_variant_id: Option<String>,
    pub external_inventory_item_id: Option<String>,

    // Ignorado quando o registro é vinculado (o estoque vem da plataforma).
    #[validate(custom(function = "validate_not_negative"))]
    #[serde(default)] // Se o JSON não tiver esse campo, assume 0
    pub initial_stock: i64,
}

// Validação de Consistência: o vínculo externo é tudo-ou-nada.
impl CreateRecordPayload {
    fn validate_consistency(&self) -> Result<(), ValidationError> {
        let present = [
            self.external_product_id.is_some(),
            self.external_variant_id.is_some(),
            self.external_inventory_item_id.is_some(),
        ];
        if present.iter().any(|p| *p) && !present.iter().all(|p| *p) {
            return Err(ValidationError::new("ExternalLinkIncomplete"));
        }
        Ok(())
    }

    fn external_link(&self) -> Option<ExternalLink> {
        match (
            &self.external_product_id,
            &self.external_variant_id,
            &self.external_inventory_item_id,
        ) {
            (Some(product_id), Some(variant_id), Some(inventory_item_id)) => Some(ExternalLink {
                external_product_id: product_id.clone(),
                external_variant_id: variant_id.clone(),
                external_inventory_item_id: inventory_item_id.clone(),
            }),
            _ => None,
        }
    }
}

// POST /api/inventory/records
#[utoipa::path(
    post,
    path = "/api/inventory/records",
    tag = "Inventory",
    request_body = CreateRecordPayload,
    responses(
        (status = 201, description = "Registro criado", body = InventoryRecord),
        (status = 409, description = "Já existe registro para o produto")
    )
)]
pub async fn create_record(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateRecordPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    payload.validate_consistency().map_err(|e| {
        // Criamos um ValidationErrors manual para manter o padrão de resposta
        let mut errors = validator::ValidationErrors::new();
        errors.add("externalVariantId".into(), e);
        AppError::ValidationError(errors)
    })?;

    let record = app_state
        .reconciliation_service
        .create_record(
            payload.product_id,
            &payload.product_name,
            payload.external_link(),
            payload.initial_stock,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

// GET /api/inventory/records
#[utoipa::path(
    get,
    path = "/api/inventory/records",
    tag = "Inventory",
    responses(
        (status = 200, description = "Todos os registros do ledger", body = [InventoryRecord])
    )
)]
pub async fn list_records(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let records = app_state.reconciliation_service.list_records().await?;
    Ok((StatusCode::OK, Json(records)))
}

// GET /api/inventory/records/{product_id}
#[utoipa::path(
    get,
    path = "/api/inventory/records/{product_id}",
    tag = "Inventory",
    responses(
        (status = 200, description = "Snapshot do registro", body = InventoryRecord),
        (status = 404, description = "Registro não encontrado")
    ),
    params(
        ("product_id" = Uuid, Path, description = "ID do produto")
    )
)]
pub async fn get_record(
    State(app_state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let record = app_state.reconciliation_service.get_record(product_id).await?;
    Ok((StatusCode::OK, Json(record)))
}

// GET /api/inventory/records/by-variant/{variant_id}
// Lookup reverso para ferramentas de operador (qual produto local atende
// esta variante da plataforma?).
#[utoipa::path(
    get,
    path = "/api/inventory/records/by-variant/{variant_id}",
    tag = "Inventory",
    responses(
        (status = 200, description = "Registro vinculado à variante", body = InventoryRecord),
        (status = 404, description = "Nenhum registro vinculado à variante")
    ),
    params(
        ("variant_id" = String, Path, description = "ID da variante na plataforma externa")
    )
)]
pub async fn get_record_by_variant(
    State(app_state): State<AppState>,
    Path(variant_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = app_state
        .reconciliation_service
        .get_record_by_external_variant(&variant_id)
        .await?;
    Ok((StatusCode::OK, Json(record)))
}

// DELETE /api/inventory/records/{product_id}
// Chamado pelo serviço de catálogo quando o produto dono é removido (cascata).
#[utoipa::path(
    delete,
    path = "/api/inventory/records/{product_id}",
    tag = "Inventory",
    responses(
        (status = 204, description = "Registro removido"),
        (status = 404, description = "Registro não encontrado")
    ),
    params(
        ("product_id" = Uuid, Path, description = "ID do produto")
    )
)]
pub async fn delete_record(
    State(app_state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.reconciliation_service.delete_record(product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---
// Payload: Transferência entre canais
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    #[schema(example = "B2C_TO_B2B")]
    pub direction: TransferDirection,

    #[validate(range(min = 1, message = "A quantidade deve ser positiva."))]
    #[schema(example = 30)]
    pub amount: i64,
}

// POST /api/inventory/{product_id}/transfer
#[utoipa::path(
    post,
    path = "/api/inventory/{product_id}/transfer",
    tag = "Inventory",
    request_body = TransferPayload,
    responses(
        (status = 200, description = "Registro após a transferência", body = InventoryRecord),
        (status = 409, description = "Estoque insuficiente no canal de origem"),
        (status = 503, description = "Abortada: escrita externa falhou, ledger restaurado")
    ),
    params(
        ("product_id" = Uuid, Path, description = "ID do produto")
    )
)]
pub async fn transfer_stock(
    State(app_state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<TransferPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let record = app_state
        .reconciliation_service
        .transfer(product_id, payload.direction, payload.amount)
        .await?;

    Ok((StatusCode::OK, Json(record)))
}

// ---
// Payload: Ajuste administrativo
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustPayload {
    #[schema(example = "B2C")]
    pub channel: StockChannel,

    #[validate(custom(function = "validate_nonzero"))]
    #[schema(example = 5)]
    pub delta: i64,

    pub notes: Option<String>,
}

// POST /api/inventory/{product_id}/adjust
#[utoipa::path(
    post,
    path = "/api/inventory/{product_id}/adjust",
    tag = "Inventory",
    request_body = AdjustPayload,
    responses(
        (status = 200, description = "Registro após o ajuste", body = InventoryRecord),
        (status = 409, description = "O ajuste deixaria o canal negativo")
    ),
    params(
        ("product_id" = Uuid, Path, description = "ID do produto")
    )
)]
pub async fn adjust_stock(
    State(app_state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<AdjustPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let record = app_state
        .reconciliation_service
        .adjust(
            product_id,
            payload.channel,
            payload.delta,
            payload.notes.as_deref(),
        )
        .await?;

    Ok((StatusCode::OK, Json(record)))
}

// ---
// Payload: Reserva (fluxo de pedidos)
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReservePayload {
    #[validate(range(min = 1, message = "A quantidade deve ser positiva."))]
    #[schema(example = 2)]
    pub quantity: i64,
}

// POST /api/inventory/{product_id}/reserve
#[utoipa::path(
    post,
    path = "/api/inventory/{product_id}/reserve",
    tag = "Inventory",
    request_body = ReservePayload,
    responses(
        (status = 200, description = "Registro após a reserva", body = InventoryRecord),
        (status = 409, description = "Disponibilidade insuficiente")
    ),
    params(
        ("product_id" = Uuid, Path, description = "ID do produto")
    )
)]
pub async fn reserve_stock(
    State(app_state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<ReservePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let record = app_state
        .reconciliation_service
        .reserve(product_id, payload.quantity)
        .await?;
    Ok((StatusCode::OK, Json(record)))
}

// POST /api/inventory/{product_id}/release
#[utoipa::path(
    post,
    path = "/api/inventory/{product_id}/release",
    tag = "Inventory",
    request_body = ReservePayload,
    responses(
        (status = 200, description = "Registro após a liberação", body = InventoryRecord),
        (status = 409, description = "Não há reserva suficiente para liberar")
    ),
    params(
        ("product_id" = Uuid, Path, description = "ID do produto")
    )
)]
pub async fn release_stock(
    State(app_state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<ReservePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let record = app_state
        .reconciliation_service
        .release(product_id, payload.quantity)
        .await?;
    Ok((StatusCode::OK, Json(record)))
}

// ---
// Busca de operador
// ---
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchQuery {
    // Substring do nome do produto OU id externo exato (produto/variante).
    pub q: String,
    pub limit: Option<i64>,
}

// GET /api/inventory/search
#[utoipa::path(
    get,
    path = "/api/inventory/search",
    tag = "Inventory",
    responses(
        (status = 200, description = "Correspondências de nome primeiro, depois de id", body = [InventoryRecord])
    ),
    params(
        ("q" = String, Query, description = "Termo de busca"),
        ("limit" = Option<i64>, Query, description = "Máximo de resultados (padrão 20)")
    )
)]
pub async fn search_records(
    State(app_state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let records = app_state
        .reconciliation_service
        .search_records(&query.q, limit)
        .await?;
    Ok((StatusCode::OK, Json(records)))
}

// ---
// Ferramentas de operador contra a plataforma externa (para vincular produtos)
// ---

// GET /api/inventory/external/locations
#[utoipa::path(
    get,
    path = "/api/inventory/external/locations",
    tag = "Inventory",
    responses(
        (status = 200, description = "Localizações cadastradas na plataforma externa",
         body = [crate::gateway::ExternalLocation])
    )
)]
pub async fn list_external_locations(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let locations = app_state
        .reconciliation_service
        .list_external_locations()
        .await?;
    Ok((StatusCode::OK, Json(locations)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExternalSearchQuery {
    pub q: String,
}

// GET /api/inventory/external/variants
#[utoipa::path(
    get,
    path = "/api/inventory/external/variants",
    tag = "Inventory",
    responses(
        (status = 200, description = "Variantes da plataforma externa por título",
         body = [crate::gateway::ExternalVariant])
    ),
    params(
        ("q" = String, Query, description = "Título do produto na plataforma")
    )
)]
pub async fn search_external_variants(
    State(app_state): State<AppState>,
    Query(query): Query<ExternalSearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let variants = app_state
        .reconciliation_service
        .search_external_variants(&query.q)
        .await?;
    Ok((StatusCode::OK, Json(variants)))
}
