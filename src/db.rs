pub mod ledger_repo;
pub use ledger_repo::PgLedgerStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::inventory::{InventoryRecord, StockChannel, StockMovement, StockMovementReason},
};

// ---
// Contrato do Stock Ledger Store
// ---
// O ledger é o ÚNICO recurso mutável compartilhado. Toda mutação passa por
// estas operações atômicas por registro (nunca ler-e-escrever na camada de
// cima): nenhum chamador observa uma divisão total/canal pela metade.
//
// O trait existe para injeção de dependência: o motor de reconciliação é
// testado com um ledger em memória, e o caminho fatal de rollback com um
// ledger que falha sob demanda.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, product_id: Uuid) -> Result<InventoryRecord, AppError>;

    async fn get_by_external_variant(
        &self,
        external_variant_id: &str,
    ) -> Result<InventoryRecord, AppError>;

    /// Busca pelo id de item de inventário externo. `None` quando o item ainda
    /// não foi vinculado localmente (caminho de no-op do webhook).
    async fn find_by_external_inventory_item(
        &self,
        external_inventory_item_id: &str,
    ) -> Result<Option<InventoryRecord>, AppError>;

    async fn insert(&self, record: &InventoryRecord) -> Result<InventoryRecord, AppError>;

    async fn delete(&self, product_id: Uuid) -> Result<(), AppError>;

    /// Soma/subtrai atomicamente em um canal, limitado pela não-negatividade.
    /// Deltas em B2B/B2C movem também o total; RESERVED move apenas a reserva.
    /// Resultado negativo => `InsufficientStock`, nada é mutado.
    async fn apply_delta(
        &self,
        product_id: Uuid,
        channel: StockChannel,
        delta: i64,
    ) -> Result<InventoryRecord, AppError>;

    /// Reescreve atomicamente a divisão por canal (total = b2b + b2c).
    /// É a primitiva de commit local E de rollback do protocolo de transferência.
    async fn set_channel_split(
        &self,
        product_id: Uuid,
        b2b_stock: i64,
        b2c_stock: i64,
    ) -> Result<InventoryRecord, AppError>;

    /// Aplica um nível vindo da plataforma externa: b2c = available,
    /// total = b2b + available, em uma única escrita. `None` se nenhum
    /// registro está vinculado ao item.
    async fn apply_external_level(
        &self,
        external_inventory_item_id: &str,
        available: i64,
    ) -> Result<Option<InventoryRecord>, AppError>;

    /// Registra uma movimentação no livro-razão (auditoria, append-only).
    async fn record_movement(
        &self,
        product_id: Uuid,
        channel: StockChannel,
        quantity_changed: i64,
        reason: StockMovementReason,
        notes: Option<&str>,
    ) -> Result<StockMovement, AppError>;

    /// Busca de operador: substring do nome OU id externo exato.
    /// Correspondências de nome vêm primeiro.
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<InventoryRecord>, AppError>;

    async fn list(&self) -> Result<Vec<InventoryRecord>, AppError>;
}
