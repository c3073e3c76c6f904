// src/docs.rs

use utoipa::OpenApi;

use crate::gateway;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- INVENTORY ---
        handlers::inventory::create_record,
        handlers::inventory::list_records,
        handlers::inventory::get_record,
        handlers::inventory::get_record_by_variant,
        handlers::inventory::delete_record,
        handlers::inventory::transfer_stock,
        handlers::inventory::adjust_stock,
        handlers::inventory::reserve_stock,
        handlers::inventory::release_stock,
        handlers::inventory::search_records,
        handlers::inventory::list_external_locations,
        handlers::inventory::search_external_variants,

        // --- WEBHOOKS ---
        handlers::webhooks::inventory_level_changed,
    ),
    components(
        schemas(
            // --- Inventory ---
            models::inventory::InventoryRecord,
            models::inventory::ExternalLink,
            models::inventory::StockChannel,
            models::inventory::TransferDirection,
            models::inventory::StockMovementReason,
            models::inventory::StockMovement,

            // --- Gateway ---
            gateway::ExternalLocation,
            gateway::ExternalVariant,

            // --- Payloads ---
            handlers::inventory::CreateRecordPayload,
            handlers::inventory::TransferPayload,
            handlers::inventory::AdjustPayload,
            handlers::inventory::ReservePayload,
            handlers::webhooks::InventoryLevelPayload,
        )
    ),
    tags(
        (name = "Inventory", description = "Ledger de estoque e transferências entre canais"),
        (name = "Webhooks", description = "Eventos de inventário da plataforma externa")
    )
)]
pub struct ApiDoc;
