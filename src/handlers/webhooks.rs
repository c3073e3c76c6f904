// src/handlers/webhooks.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{common::error::AppError, config::AppState};

// ---
// Payload: evento "inventory_levels/update" da plataforma externa.
// As chaves vêm no formato da plataforma (snake_case), não no nosso.
// ---
#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryLevelPayload {
    pub inventory_item_id: String,
    pub available: i64,
    pub location_id: Option<String>,
}

// POST /api/webhooks/inventory-levels
//
// Entrega at-least-once: o handler responde 200 para tudo que não for falha
// nossa (item desconhecido, quantidade malformada), senão a plataforma
// reenviaria eternamente um evento que nunca vai ser aplicável.
#[utoipa::path(
    post,
    path = "/api/webhooks/inventory-levels",
    tag = "Webhooks",
    request_body = InventoryLevelPayload,
    responses(
        (status = 200, description = "Evento aplicado ou ignorado")
    )
)]
pub async fn inventory_level_changed(
    State(app_state): State<AppState>,
    Json(payload): Json<InventoryLevelPayload>,
) -> Result<impl IntoResponse, AppError> {
    tracing::debug!(
        inventory_item_id = %payload.inventory_item_id,
        available = payload.available,
        location_id = payload.location_id.as_deref().unwrap_or("-"),
        "Webhook de nível de inventário recebido"
    );

    app_state
        .reconciliation_service
        .apply_external_level(&payload.inventory_item_id, payload.available)
        .await?;

    Ok(StatusCode::OK)
}
