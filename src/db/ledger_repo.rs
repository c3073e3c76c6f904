// src/db/ledger_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::LedgerStore,
    models::inventory::{InventoryRecord, StockChannel, StockMovement, StockMovementReason},
};

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Distingue "registro não existe" de "delta rejeitado pela guarda de
    // não-negatividade" depois que um UPDATE condicional não retornou linha.
    async fn exists(&self, product_id: Uuid) -> Result<bool, AppError> {
        let found: Option<(Uuid,)> =
            sqlx::query_as("SELECT product_id FROM inventory_records WHERE product_id = $1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get(&self, product_id: Uuid) -> Result<InventoryRecord, AppError> {
        sqlx::query_as::<_, InventoryRecord>(
            "SELECT * FROM inventory_records WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::RecordNotFound)
    }

    async fn get_by_external_variant(
        &self,
        external_variant_id: &str,
    ) -> Result<InventoryRecord, AppError> {
        sqlx::query_as::<_, InventoryRecord>(
            "SELECT * FROM inventory_records WHERE external_variant_id = $1",
        )
        .bind(external_variant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::RecordNotFound)
    }

    async fn find_by_external_inventory_item(
        &self,
        external_inventory_item_id: &str,
    ) -> Result<Option<InventoryRecord>, AppError> {
        let record = sqlx::query_as::<_, InventoryRecord>(
            "SELECT * FROM inventory_records WHERE external_inventory_item_id = $1",
        )
        .bind(external_inventory_item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn insert(&self, record: &InventoryRecord) -> Result<InventoryRecord, AppError> {
        sqlx::query_as::<_, InventoryRecord>(
            r#"
            INSERT INTO inventory_records
                (product_id, product_name, external_product_id, external_variant_id,
                 external_inventory_item_id, total_stock, b2b_stock, b2c_stock,
                 reserved_stock, sync_enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(record.product_id)
        .bind(&record.product_name)
        .bind(&record.external_product_id)
        .bind(&record.external_variant_id)
        .bind(&record.external_inventory_item_id)
        .bind(record.total_stock)
        .bind(record.b2b_stock)
        .bind(record.b2c_stock)
        .bind(record.reserved_stock)
        .bind(record.sync_enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // Converte violação de chave única em um erro mais amigável
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::RecordAlreadyExists;
                }
            }
            e.into()
        })
    }

    async fn delete(&self, product_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM inventory_records WHERE product_id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::RecordNotFound);
        }
        Ok(())
    }

    async fn apply_delta(
        &self,
        product_id: Uuid,
        channel: StockChannel,
        delta: i64,
    ) -> Result<InventoryRecord, AppError> {
        // UPDATE condicional: a guarda de não-negatividade fica na cláusula
        // WHERE, então a verificação e a escrita são a mesma operação atômica.
        let sql = match channel {
            StockChannel::B2b => {
                r#"
                UPDATE inventory_records
                SET b2b_stock = b2b_stock + $2,
                    total_stock = total_stock + $2,
                    updated_at = now()
                WHERE product_id = $1
                  AND b2b_stock + $2 >= 0
                  AND total_stock + $2 >= reserved_stock
                RETURNING *
                "#
            }
            StockChannel::B2c => {
                r#"
                UPDATE inventory_records
                SET b2c_stock = b2c_stock + $2,
                    total_stock = total_stock + $2,
                    updated_at = now()
                WHERE product_id = $1
                  AND b2c_stock + $2 >= 0
                  AND total_stock + $2 >= reserved_stock
                RETURNING *
                "#
            }
            StockChannel::Reserved => {
                r#"
                UPDATE inventory_records
                SET reserved_stock = reserved_stock + $2,
                    updated_at = now()
                WHERE product_id = $1
                  AND reserved_stock + $2 >= 0
                  AND reserved_stock + $2 <= total_stock
                RETURNING *
                "#
            }
        };

        let updated = sqlx::query_as::<_, InventoryRecord>(sql)
            .bind(product_id)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(record) => Ok(record),
            None => {
                if self.exists(product_id).await? {
                    Err(AppError::InsufficientStock)
                } else {
                    Err(AppError::RecordNotFound)
                }
            }
        }
    }

    async fn set_channel_split(
        &self,
        product_id: Uuid,
        b2b_stock: i64,
        b2c_stock: i64,
    ) -> Result<InventoryRecord, AppError> {
        sqlx::query_as::<_, InventoryRecord>(
            r#"
            UPDATE inventory_records
            SET b2b_stock = $2,
                b2c_stock = $3,
                total_stock = $2 + $3,
                updated_at = now()
            WHERE product_id = $1
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(b2b_stock)
        .bind(b2c_stock)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::RecordNotFound)
    }

    async fn apply_external_level(
        &self,
        external_inventory_item_id: &str,
        available: i64,
    ) -> Result<Option<InventoryRecord>, AppError> {
        // A porção B2C vem inteira da plataforma; a B2B não é afetada pelo
        // evento. "Set", não incremento: entrega duplicada produz o mesmo estado.
        let record = sqlx::query_as::<_, InventoryRecord>(
            r#"
            UPDATE inventory_records
            SET b2c_stock = $2,
                total_stock = b2b_stock + $2,
                updated_at = now()
            WHERE external_inventory_item_id = $1
            RETURNING *
            "#,
        )
        .bind(external_inventory_item_id)
        .bind(available)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn record_movement(
        &self,
        product_id: Uuid,
        channel: StockChannel,
        quantity_changed: i64,
        reason: StockMovementReason,
        notes: Option<&str>,
    ) -> Result<StockMovement, AppError> {
        let movement = sqlx::query_as::<_, StockMovement>(
            r#"
            INSERT INTO stock_movements (product_id, channel, quantity_changed, reason, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(channel)
        .bind(quantity_changed)
        .bind(reason)
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;

        Ok(movement)
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<InventoryRecord>, AppError> {
        // Correspondência de título primeiro, depois id externo exato.
        let records = sqlx::query_as::<_, InventoryRecord>(
            r#"
            SELECT * FROM inventory_records
            WHERE product_name ILIKE '%' || $1 || '%'
               OR external_product_id = $1
               OR external_variant_id = $1
            ORDER BY (product_name ILIKE '%' || $1 || '%') DESC, product_name ASC
            LIMIT $2
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn list(&self) -> Result<Vec<InventoryRecord>, AppError> {
        let records = sqlx::query_as::<_, InventoryRecord>(
            "SELECT * FROM inventory_records ORDER BY product_name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
