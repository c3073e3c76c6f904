// src/models/inventory.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- 1. Registro de Inventário (Ledger) ---
// Uma linha por produto vendável. É a ÚNICA representação gravável do estoque;
// qualquer visão legada é somente leitura.
//
// Invariante central: total_stock == b2b_stock + b2c_stock após toda operação
// concluída, e nenhum campo de estoque fica negativo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    pub product_id: Uuid,

    // Nome do produto (cópia do catálogo), usado pela busca de operador.
    pub product_name: String,

    // Identificadores da plataforma externa. Ou os três estão presentes
    // (registro "vinculado") ou os três ausentes (registro local).
    pub external_product_id: Option<String>,
    pub external_variant_id: Option<String>,
    pub external_inventory_item_id: Option<String>,

    // Quantidade FÍSICA total
    pub total_stock: i64,

    // Divisão por canal de venda
    pub b2b_stock: i64,
    pub b2c_stock: i64,

    // Quantidade reservada contra pedidos em andamento
    pub reserved_stock: i64,

    // true somente quando os três ids externos estão populados.
    // Governa se escritas locais no canal B2C precisam de write-through.
    pub sync_enabled: bool,

    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Um registro vinculado tem os três identificadores externos populados.
    pub fn is_linked(&self) -> bool {
        self.external_product_id.is_some()
            && self.external_variant_id.is_some()
            && self.external_inventory_item_id.is_some()
    }

    /// Quantidade disponível para o fluxo de pedidos (total menos reservas).
    pub fn available(&self) -> i64 {
        self.total_stock - self.reserved_stock
    }
}

// Vínculo com a plataforma externa, sempre completo (os três ids juntos).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLink {
    pub external_product_id: String,
    pub external_variant_id: String,
    pub external_inventory_item_id: String,
}

// --- 2. Canal de Estoque ---
// Dois canais de venda (B2B, B2C) consomem o mesmo estoque físico.
// RESERVED não é um canal de venda: é a fatia retida contra pedidos em andamento.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "stock_channel", rename_all = "SCREAMING_SNAKE_CASE")] // Banco
#[serde(rename_all = "SCREAMING_SNAKE_CASE")] // JSON
pub enum StockChannel {
    B2b,      // Vira "B2B"
    B2c,      // Vira "B2C"
    Reserved, // Vira "RESERVED"
}

// --- 3. Direção de Transferência ---
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferDirection {
    B2bToB2c, // Vira "B2B_TO_B2C"
    B2cToB2b, // Vira "B2C_TO_B2B"
}

// --- 4. Movimentações de Estoque (Histórico) ---
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "stock_movement_reason", rename_all = "SCREAMING_SNAKE_CASE")] // Banco
#[serde(rename_all = "SCREAMING_SNAKE_CASE")] // JSON
pub enum StockMovementReason {
    InitialStock, // Vira "INITIAL_STOCK"
    Correction,
    TransferOut,  // Vira "TRANSFER_OUT"
    TransferIn,   // Vira "TRANSFER_IN"
    ExternalSync, // Evento de webhook aplicado ao ledger
    Reservation,
    Release,
}

// --- STOCK MOVEMENT (Histórico) ---
// Livro-razão append-only: uma linha por mutação do ledger.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub channel: StockChannel,
    pub quantity_changed: i64,
    pub reason: StockMovementReason,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
