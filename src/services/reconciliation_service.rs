// src/services/reconciliation_service.rs

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::LedgerStore,
    gateway::{ExternalLocation, ExternalVariant, GatewayError, InventoryGateway},
    models::inventory::{
        ExternalLink, InventoryRecord, StockChannel, StockMovementReason, TransferDirection,
    },
};

// Constrói um ValidationErrors manual para manter o padrão de resposta
// (mesma forma que o validator geraria num payload).
fn validation_error(field: &'static str, code: &'static str, message: &'static str) -> AppError {
    let mut err = validator::ValidationError::new(code);
    err.message = Some(message.into());
    let mut errors = validator::ValidationErrors::new();
    errors.add(field.into(), err);
    AppError::ValidationError(errors)
}

// ---
// Motor de Reconciliação
// ---
// Mantém o ledger local e a quantidade B2C visível na plataforma externa
// consistentes. Dependências injetadas (nunca singletons de módulo): isso
// deixa os caminhos de rollback e de falha fatal testáveis com fakes.
#[derive(Clone)]
pub struct ReconciliationService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn InventoryGateway>,

    // Seção crítica por product_id: duas mutações no mesmo registro nunca
    // intercalam suas janelas de ler-modificar-escrever. O mapa cresce até o
    // número de produtos com mutação desde o início do processo.
    record_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn LedgerStore>, gateway: Arc<dyn InventoryGateway>) -> Self {
        Self {
            store,
            gateway,
            record_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_for(&self, product_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.record_locks.lock().await;
        locks
            .entry(product_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ---
    // Leituras (sem seção crítica)
    // ---

    pub async fn get_record(&self, product_id: Uuid) -> Result<InventoryRecord, AppError> {
        self.store.get(product_id).await
    }

    pub async fn list_records(&self) -> Result<Vec<InventoryRecord>, AppError> {
        self.store.list().await
    }

    pub async fn get_record_by_external_variant(
        &self,
        external_variant_id: &str,
    ) -> Result<InventoryRecord, AppError> {
        self.store.get_by_external_variant(external_variant_id).await
    }

    pub async fn search_records(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<InventoryRecord>, AppError> {
        self.store.search(query, limit).await
    }

    pub async fn list_external_locations(&self) -> Result<Vec<ExternalLocation>, AppError> {
        Ok(self.gateway.list_locations().await?)
    }

    pub async fn search_external_variants(
        &self,
        query: &str,
    ) -> Result<Vec<ExternalVariant>, AppError> {
        Ok(self.gateway.search_variants(query).await?)
    }

    // ---
    // Ciclo de vida (1:1 com o produto do catálogo)
    // ---

    /// Cria o registro de inventário de um produto recém-criado no catálogo.
    /// Vinculado: semeia o B2C com a disponibilidade atual da plataforma.
    /// Não vinculado: semeia com o valor informado pelo operador (ou zero).
    pub async fn create_record(
        &self,
        product_id: Uuid,
        product_name: &str,
        external_link: Option<ExternalLink>,
        initial_stock: i64,
    ) -> Result<InventoryRecord, AppError> {
        if initial_stock < 0 {
            return Err(validation_error(
                "initialStock",
                "range",
                "O estoque inicial não pode ser negativo.",
            ));
        }

        let (b2c_stock, link, sync_enabled) = match external_link {
            Some(link) => {
                let seeded = self
                    .gateway
                    .fetch_availability(&link.external_variant_id)
                    .await?;
                // A plataforma pode reportar negativo (sobrevenda); o ledger não
                // representa estoque negativo, então entra como zero.
                (seeded.max(0), Some(link), true)
            }
            None => (initial_stock, None, false),
        };

        let record = InventoryRecord {
            product_id,
            product_name: product_name.to_string(),
            external_product_id: link.as_ref().map(|l| l.external_product_id.clone()),
            external_variant_id: link.as_ref().map(|l| l.external_variant_id.clone()),
            external_inventory_item_id: link
                .as_ref()
                .map(|l| l.external_inventory_item_id.clone()),
            total_stock: b2c_stock,
            b2b_stock: 0,
            b2c_stock,
            reserved_stock: 0,
            sync_enabled,
            updated_at: chrono::Utc::now(),
        };

        let created = self.store.insert(&record).await?;

        if created.total_stock > 0 {
            self.store
                .record_movement(
                    product_id,
                    StockChannel::B2c,
                    created.total_stock,
                    StockMovementReason::InitialStock,
                    Some("Criação de registro de inventário"),
                )
                .await?;
        }

        tracing::info!(
            product_id = %product_id,
            sync_enabled = created.sync_enabled,
            total_stock = created.total_stock,
            "Registro de inventário criado"
        );
        Ok(created)
    }

    /// Remove o registro quando o produto dono é removido do catálogo
    /// (cascata). O registro nunca é removido de forma independente.
    pub async fn delete_record(&self, product_id: Uuid) -> Result<(), AppError> {
        let lock = self.lock_for(product_id).await;
        let _guard = lock.lock().await;
        self.store.delete(product_id).await
    }

    // ---
    // Transferência entre canais (o protocolo central)
    // ---

    /// Move `amount` unidades de um canal para o outro sem alterar o total.
    ///
    /// Registros vinculados: commit local otimista, depois write-through da
    /// nova quantidade B2C na plataforma; se a escrita externa falhar, o
    /// ledger local é revertido para a divisão original. O ledger local é
    /// barato de reverter; a chamada externa é o único ponto de falha caro,
    /// isolado com uma ação compensatória explícita.
    pub async fn transfer(
        &self,
        product_id: Uuid,
        direction: TransferDirection,
        amount: i64,
    ) -> Result<InventoryRecord, AppError> {
        if amount <= 0 {
            return Err(validation_error(
                "amount",
                "range",
                "A quantidade transferida deve ser positiva.",
            ));
        }

        let lock = self.lock_for(product_id).await;
        let _guard = lock.lock().await;

        // 1. Lê o registro dentro da seção crítica e valida a nova divisão.
        let record = self.store.get(product_id).await?;

        let (new_b2b, new_b2c, from, to) = match direction {
            TransferDirection::B2cToB2b => (
                record.b2b_stock + amount,
                record.b2c_stock - amount,
                StockChannel::B2c,
                StockChannel::B2b,
            ),
            TransferDirection::B2bToB2c => (
                record.b2b_stock - amount,
                record.b2c_stock + amount,
                StockChannel::B2b,
                StockChannel::B2c,
            ),
        };

        if new_b2b < 0 || new_b2c < 0 {
            return Err(AppError::InsufficientStock);
        }

        // 2. Commit local otimista.
        let updated = self
            .store
            .set_channel_split(product_id, new_b2b, new_b2c)
            .await?;

        // 3. Write-through: o que o comprador externo vê acompanha o que
        //    sobrou alocado para B2C. Registros locais pulam esta etapa.
        if record.sync_enabled {
            if let Err(cause) = self.write_through_b2c(&record, new_b2c).await {
                // 4. Reverte o ledger local para a divisão pré-transferência.
                return Err(self.rollback_split(&record, cause).await);
            }
        }

        // 5. Auditoria e retorno do registro atualizado.
        self.store
            .record_movement(product_id, from, -amount, StockMovementReason::TransferOut, None)
            .await?;
        self.store
            .record_movement(product_id, to, amount, StockMovementReason::TransferIn, None)
            .await?;

        tracing::info!(
            product_id = %product_id,
            amount,
            b2b_stock = updated.b2b_stock,
            b2c_stock = updated.b2c_stock,
            "Transferência de canal concluída"
        );
        Ok(updated)
    }

    async fn write_through_b2c(
        &self,
        record: &InventoryRecord,
        new_b2c: i64,
    ) -> Result<(), GatewayError> {
        let item_id = record.external_inventory_item_id.as_deref().ok_or_else(|| {
            GatewayError::Permanent(
                "registro com sync habilitado sem id de item de inventário".to_string(),
            )
        })?;
        self.gateway.set_availability(item_id, new_b2c, None).await
    }

    /// Ação compensatória após falha da escrita externa. Rollback bem-sucedido
    /// equivale a "a operação nunca aconteceu"; rollback falho é fatal e
    /// precisa aparecer alto no alerting, nunca ser repetido silenciosamente.
    async fn rollback_split(&self, original: &InventoryRecord, cause: GatewayError) -> AppError {
        tracing::warn!(
            product_id = %original.product_id,
            "Escrita externa falhou ({}), revertendo o ledger local",
            cause
        );

        match self
            .store
            .set_channel_split(original.product_id, original.b2b_stock, original.b2c_stock)
            .await
        {
            Ok(_) => {
                if cause.is_transient() {
                    // Estado restaurado + falha repetível: o chamador pode
                    // tentar a operação inteira de novo.
                    AppError::TransferAborted(cause.to_string())
                } else {
                    // Estado restaurado, mas repetir não ajuda: o vínculo
                    // precisa de correção do operador.
                    AppError::Gateway(cause)
                }
            }
            Err(rollback_err) => {
                tracing::error!(
                    product_id = %original.product_id,
                    external_failure = %cause,
                    rollback_failure = %rollback_err,
                    "🔥 ESTADO INCONSISTENTE: a escrita externa E o rollback local falharam; \
                     ledger e plataforma exigem reconciliação manual"
                );
                AppError::InconsistentState(original.product_id)
            }
        }
    }

    // ---
    // Edição administrativa de estoque
    // ---

    /// Soma/subtrai estoque físico em um canal de venda. Se o registro é
    /// vinculado e o B2C mudou, a nova quantidade sofre write-through com o
    /// mesmo protocolo de rollback da transferência.
    pub async fn adjust(
        &self,
        product_id: Uuid,
        channel: StockChannel,
        delta: i64,
        notes: Option<&str>,
    ) -> Result<InventoryRecord, AppError> {
        if delta == 0 {
            return Err(validation_error(
                "delta",
                "nonzero",
                "O ajuste deve ser diferente de zero.",
            ));
        }
        if channel == StockChannel::Reserved {
            return Err(validation_error(
                "channel",
                "channel",
                "Reservas são ajustadas pelos endpoints de reserva.",
            ));
        }

        let lock = self.lock_for(product_id).await;
        let _guard = lock.lock().await;

        let original = self.store.get(product_id).await?;
        let updated = self.store.apply_delta(product_id, channel, delta).await?;

        if original.sync_enabled && updated.b2c_stock != original.b2c_stock {
            if let Err(cause) = self.write_through_b2c(&original, updated.b2c_stock).await {
                tracing::warn!(
                    product_id = %product_id,
                    "Escrita externa do ajuste falhou ({}), revertendo o delta",
                    cause
                );
                return Err(match self.store.apply_delta(product_id, channel, -delta).await {
                    Ok(_) if cause.is_transient() => AppError::TransferAborted(cause.to_string()),
                    Ok(_) => AppError::Gateway(cause),
                    Err(rollback_err) => {
                        tracing::error!(
                            product_id = %product_id,
                            external_failure = %cause,
                            rollback_failure = %rollback_err,
                            "🔥 ESTADO INCONSISTENTE: ajuste aplicado localmente, \
                             escrita externa e rollback falharam"
                        );
                        AppError::InconsistentState(product_id)
                    }
                });
            }
        }

        self.store
            .record_movement(product_id, channel, delta, StockMovementReason::Correction, notes)
            .await?;

        Ok(updated)
    }

    // ---
    // Reserva (consumida pelo fluxo de pedidos)
    // ---

    pub async fn reserve(&self, product_id: Uuid, quantity: i64) -> Result<InventoryRecord, AppError> {
        if quantity <= 0 {
            return Err(validation_error(
                "quantity",
                "range",
                "A quantidade reservada deve ser positiva.",
            ));
        }

        let lock = self.lock_for(product_id).await;
        let _guard = lock.lock().await;

        let updated = self
            .store
            .apply_delta(product_id, StockChannel::Reserved, quantity)
            .await?;
        self.store
            .record_movement(
                product_id,
                StockChannel::Reserved,
                quantity,
                StockMovementReason::Reservation,
                None,
            )
            .await?;
        Ok(updated)
    }

    pub async fn release(&self, product_id: Uuid, quantity: i64) -> Result<InventoryRecord, AppError> {
        if quantity <= 0 {
            return Err(validation_error(
                "quantity",
                "range",
                "A quantidade liberada deve ser positiva.",
            ));
        }

        let lock = self.lock_for(product_id).await;
        let _guard = lock.lock().await;

        let updated = self
            .store
            .apply_delta(product_id, StockChannel::Reserved, -quantity)
            .await?;
        self.store
            .record_movement(
                product_id,
                StockChannel::Reserved,
                -quantity,
                StockMovementReason::Release,
                None,
            )
            .await?;
        Ok(updated)
    }

    // ---
    // Ingestão de webhook (mudança originada na plataforma)
    // ---

    /// Aplica um evento "nível de inventário mudou" da plataforma ao ledger,
    /// SEM nova escrita externa (a plataforma já tem o valor autoritativo).
    /// Retorna None quando o evento é ignorado (item não vinculado ou payload
    /// malformado) — entrega at-least-once nunca vira erro para a plataforma.
    pub async fn apply_external_level(
        &self,
        external_inventory_item_id: &str,
        available: i64,
    ) -> Result<Option<InventoryRecord>, AppError> {
        if available < 0 {
            tracing::warn!(
                external_inventory_item_id,
                available,
                "Evento de inventário com quantidade negativa; descartando como malformado"
            );
            return Ok(None);
        }

        // Primeiro lookup só para descobrir o product_id da seção crítica.
        let Some(record) = self
            .store
            .find_by_external_inventory_item(external_inventory_item_id)
            .await?
        else {
            tracing::info!(
                external_inventory_item_id,
                "Evento de inventário para item ainda não vinculado localmente; ignorando"
            );
            return Ok(None);
        };

        let lock = self.lock_for(record.product_id).await;
        let _guard = lock.lock().await;

        // Relê dentro da seção crítica: o registro pode ter mudado (ou sumido)
        // entre o lookup e o lock.
        let Some(before) = self
            .store
            .find_by_external_inventory_item(external_inventory_item_id)
            .await?
        else {
            return Ok(None);
        };

        let Some(updated) = self
            .store
            .apply_external_level(external_inventory_item_id, available)
            .await?
        else {
            return Ok(None);
        };

        let delta = updated.b2c_stock - before.b2c_stock;
        if delta != 0 {
            self.store
                .record_movement(
                    updated.product_id,
                    StockChannel::B2c,
                    delta,
                    StockMovementReason::ExternalSync,
                    Some("Webhook de nível de inventário"),
                )
                .await?;
        }

        tracing::info!(
            product_id = %updated.product_id,
            available,
            "Nível de inventário externo aplicado ao ledger"
        );
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::models::inventory::StockMovement;

    // ---
    // Ledger em memória com a mesma semântica de guarda do Postgres
    // ---
    struct MemoryLedger {
        records: Mutex<HashMap<Uuid, InventoryRecord>>,
        movements: Mutex<Vec<StockMovement>>,
        // Quantas chamadas de set_channel_split ainda funcionam; depois disso
        // toda chamada falha (simula banco fora do ar no meio da operação).
        splits_allowed: AtomicI64,
    }

    impl MemoryLedger {
        fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                movements: Mutex::new(Vec::new()),
                splits_allowed: AtomicI64::new(i64::MAX),
            }
        }

        fn with_record(record: InventoryRecord) -> Arc<Self> {
            let ledger = Self::new();
            ledger
                .records
                .try_lock()
                .unwrap()
                .insert(record.product_id, record);
            Arc::new(ledger)
        }

        fn fail_splits_after(&self, successful_calls: i64) {
            self.splits_allowed.store(successful_calls, Ordering::SeqCst);
        }

        async fn snapshot(&self, product_id: Uuid) -> InventoryRecord {
            self.records.lock().await.get(&product_id).unwrap().clone()
        }

        async fn movement_count(&self) -> usize {
            self.movements.lock().await.len()
        }
    }

    #[async_trait]
    impl LedgerStore for MemoryLedger {
        async fn get(&self, product_id: Uuid) -> Result<InventoryRecord, AppError> {
            self.records
                .lock()
                .await
                .get(&product_id)
                .cloned()
                .ok_or(AppError::RecordNotFound)
        }

        async fn get_by_external_variant(
            &self,
            external_variant_id: &str,
        ) -> Result<InventoryRecord, AppError> {
            self.records
                .lock()
                .await
                .values()
                .find(|r| r.external_variant_id.as_deref() == Some(external_variant_id))
                .cloned()
                .ok_or(AppError::RecordNotFound)
        }

        async fn find_by_external_inventory_item(
            &self,
            external_inventory_item_id: &str,
        ) -> Result<Option<InventoryRecord>, AppError> {
            Ok(self
                .records
                .lock()
                .await
                .values()
                .find(|r| {
                    r.external_inventory_item_id.as_deref() == Some(external_inventory_item_id)
                })
                .cloned())
        }

        async fn insert(&self, record: &InventoryRecord) -> Result<InventoryRecord, AppError> {
            let mut records = self.records.lock().await;
            if records.contains_key(&record.product_id) {
                return Err(AppError::RecordAlreadyExists);
            }
            records.insert(record.product_id, record.clone());
            Ok(record.clone())
        }

        async fn delete(&self, product_id: Uuid) -> Result<(), AppError> {
            self.records
                .lock()
                .await
                .remove(&product_id)
                .map(|_| ())
                .ok_or(AppError::RecordNotFound)
        }

        async fn apply_delta(
            &self,
            product_id: Uuid,
            channel: StockChannel,
            delta: i64,
        ) -> Result<InventoryRecord, AppError> {
            let mut records = self.records.lock().await;
            let record = records.get_mut(&product_id).ok_or(AppError::RecordNotFound)?;

            match channel {
                StockChannel::B2b => {
                    if record.b2b_stock + delta < 0
                        || record.total_stock + delta < record.reserved_stock
                    {
                        return Err(AppError::InsufficientStock);
                    }
                    record.b2b_stock += delta;
                    record.total_stock += delta;
                }
                StockChannel::B2c => {
                    if record.b2c_stock + delta < 0
                        || record.total_stock + delta < record.reserved_stock
                    {
                        return Err(AppError::InsufficientStock);
                    }
                    record.b2c_stock += delta;
                    record.total_stock += delta;
                }
                StockChannel::Reserved => {
                    let next = record.reserved_stock + delta;
                    if next < 0 || next > record.total_stock {
                        return Err(AppError::InsufficientStock);
                    }
                    record.reserved_stock = next;
                }
            }
            record.updated_at = chrono::Utc::now();
            Ok(record.clone())
        }

        async fn set_channel_split(
            &self,
            product_id: Uuid,
            b2b_stock: i64,
            b2c_stock: i64,
        ) -> Result<InventoryRecord, AppError> {
            if self.splits_allowed.fetch_sub(1, Ordering::SeqCst) <= 0 {
                return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
            }
            let mut records = self.records.lock().await;
            let record = records.get_mut(&product_id).ok_or(AppError::RecordNotFound)?;
            record.b2b_stock = b2b_stock;
            record.b2c_stock = b2c_stock;
            record.total_stock = b2b_stock + b2c_stock;
            record.updated_at = chrono::Utc::now();
            Ok(record.clone())
        }

        async fn apply_external_level(
            &self,
            external_inventory_item_id: &str,
            available: i64,
        ) -> Result<Option<InventoryRecord>, AppError> {
            let mut records = self.records.lock().await;
            let record = records.values_mut().find(|r| {
                r.external_inventory_item_id.as_deref() == Some(external_inventory_item_id)
            });
            Ok(record.map(|r| {
                r.b2c_stock = available;
                r.total_stock = r.b2b_stock + available;
                r.updated_at = chrono::Utc::now();
                r.clone()
            }))
        }

        async fn record_movement(
            &self,
            product_id: Uuid,
            channel: StockChannel,
            quantity_changed: i64,
            reason: StockMovementReason,
            notes: Option<&str>,
        ) -> Result<StockMovement, AppError> {
            let movement = StockMovement {
                id: Uuid::new_v4(),
                product_id,
                channel,
                quantity_changed,
                reason,
                notes: notes.map(str::to_string),
                created_at: chrono::Utc::now(),
            };
            self.movements.lock().await.push(movement.clone());
            Ok(movement)
        }

        async fn search(&self, query: &str, limit: i64) -> Result<Vec<InventoryRecord>, AppError> {
            let records = self.records.lock().await;
            let needle = query.to_lowercase();
            let mut hits: Vec<(bool, InventoryRecord)> = records
                .values()
                .filter(|r| {
                    r.product_name.to_lowercase().contains(&needle)
                        || r.external_product_id.as_deref() == Some(query)
                        || r.external_variant_id.as_deref() == Some(query)
                })
                .map(|r| (r.product_name.to_lowercase().contains(&needle), r.clone()))
                .collect();
            hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.product_name.cmp(&b.1.product_name)));
            Ok(hits
                .into_iter()
                .take(limit as usize)
                .map(|(_, r)| r)
                .collect())
        }

        async fn list(&self) -> Result<Vec<InventoryRecord>, AppError> {
            Ok(self.records.lock().await.values().cloned().collect())
        }
    }

    // ---
    // Gateway fake com contagem de chamadas e falha determinística
    // ---
    struct FakeGateway {
        availability: AtomicI64,
        set_calls: AtomicUsize,
        fail_transient: AtomicBool,
        fail_permanent: AtomicBool,
        last_set: Mutex<Option<(String, i64)>>,
    }

    impl FakeGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                availability: AtomicI64::new(0),
                set_calls: AtomicUsize::new(0),
                fail_transient: AtomicBool::new(false),
                fail_permanent: AtomicBool::new(false),
                last_set: Mutex::new(None),
            })
        }

        fn set_call_count(&self) -> usize {
            self.set_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InventoryGateway for FakeGateway {
        async fn fetch_availability(&self, _variant_id: &str) -> Result<i64, GatewayError> {
            Ok(self.availability.load(Ordering::SeqCst))
        }

        async fn set_availability(
            &self,
            external_inventory_item_id: &str,
            quantity: i64,
            _location_id: Option<&str>,
        ) -> Result<(), GatewayError> {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_transient.load(Ordering::SeqCst) {
                return Err(GatewayError::Transient("timeout simulado".to_string()));
            }
            if self.fail_permanent.load(Ordering::SeqCst) {
                return Err(GatewayError::Permanent("id inválido simulado".to_string()));
            }
            *self.last_set.lock().await =
                Some((external_inventory_item_id.to_string(), quantity));
            Ok(())
        }

        async fn list_locations(&self) -> Result<Vec<ExternalLocation>, GatewayError> {
            Ok(vec![])
        }

        async fn search_variants(&self, _query: &str) -> Result<Vec<ExternalVariant>, GatewayError> {
            Ok(vec![])
        }
    }

    // ---
    // Montagem
    // ---

    fn linked_record(product_id: Uuid, total: i64, b2b: i64, b2c: i64) -> InventoryRecord {
        InventoryRecord {
            product_id,
            product_name: "Caneca Esmaltada".to_string(),
            external_product_id: Some("900100".to_string()),
            external_variant_id: Some("900200".to_string()),
            external_inventory_item_id: Some("900300".to_string()),
            total_stock: total,
            b2b_stock: b2b,
            b2c_stock: b2c,
            reserved_stock: 0,
            sync_enabled: true,
            updated_at: chrono::Utc::now(),
        }
    }

    fn local_record(product_id: Uuid, total: i64, b2b: i64, b2c: i64) -> InventoryRecord {
        InventoryRecord {
            product_id,
            product_name: "Caneca Local".to_string(),
            external_product_id: None,
            external_variant_id: None,
            external_inventory_item_id: None,
            total_stock: total,
            b2b_stock: b2b,
            b2c_stock: b2c,
            reserved_stock: 0,
            sync_enabled: false,
            updated_at: chrono::Utc::now(),
        }
    }

    fn service(store: Arc<MemoryLedger>, gateway: Arc<FakeGateway>) -> ReconciliationService {
        ReconciliationService::new(store, gateway)
    }

    // --- Cenários do protocolo de transferência ---

    #[tokio::test]
    async fn transferencia_b2c_para_b2b_com_gateway_ok() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 100, 0, 100));
        let gateway = FakeGateway::new();
        let svc = service(store.clone(), gateway.clone());

        let updated = svc
            .transfer(product_id, TransferDirection::B2cToB2b, 30)
            .await
            .unwrap();

        assert_eq!(updated.total_stock, 100);
        assert_eq!(updated.b2b_stock, 30);
        assert_eq!(updated.b2c_stock, 70);

        // O que o comprador externo vê acompanha o novo B2C.
        let last_set = gateway.last_set.lock().await.clone();
        assert_eq!(last_set, Some(("900300".to_string(), 70)));
    }

    #[tokio::test]
    async fn transferencia_preserva_o_total() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 80, 30, 50));
        let svc = service(store.clone(), FakeGateway::new());

        let before = store.snapshot(product_id).await;
        let updated = svc
            .transfer(product_id, TransferDirection::B2bToB2c, 15)
            .await
            .unwrap();

        assert_eq!(updated.total_stock, before.total_stock);
        assert_eq!(updated.b2b_stock, 15);
        assert_eq!(updated.b2c_stock, 65);
    }

    #[tokio::test]
    async fn estoque_insuficiente_nao_muta_nada() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 100, 0, 20));
        let gateway = FakeGateway::new();
        let svc = service(store.clone(), gateway.clone());

        let before = store.snapshot(product_id).await;
        let err = svc
            .transfer(product_id, TransferDirection::B2cToB2b, 30)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InsufficientStock));
        // Registro idêntico ao pré-transferência, e o gateway nunca foi tocado.
        assert_eq!(store.snapshot(product_id).await, before);
        assert_eq!(gateway.set_call_count(), 0);
        assert_eq!(store.movement_count().await, 0);
    }

    #[tokio::test]
    async fn quantidade_nao_positiva_e_rejeitada() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 100, 0, 100));
        let svc = service(store, FakeGateway::new());

        let err = svc
            .transfer(product_id, TransferDirection::B2cToB2b, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn registro_local_nao_invoca_gateway() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(local_record(product_id, 40, 10, 30));
        let gateway = FakeGateway::new();
        let svc = service(store.clone(), gateway.clone());

        let updated = svc
            .transfer(product_id, TransferDirection::B2cToB2b, 10)
            .await
            .unwrap();

        assert_eq!(updated.b2b_stock, 20);
        assert_eq!(updated.b2c_stock, 20);
        assert_eq!(gateway.set_call_count(), 0);
    }

    #[tokio::test]
    async fn falha_externa_transitoria_reverte_e_aborta() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 100, 0, 100));
        let gateway = FakeGateway::new();
        gateway.fail_transient.store(true, Ordering::SeqCst);
        let svc = service(store.clone(), gateway.clone());

        let before = store.snapshot(product_id).await;
        let err = svc
            .transfer(product_id, TransferDirection::B2cToB2b, 30)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::TransferAborted(_)));
        // "A operação nunca aconteceu": divisão restaurada, sem auditoria.
        let after = store.snapshot(product_id).await;
        assert_eq!(after.b2b_stock, before.b2b_stock);
        assert_eq!(after.b2c_stock, before.b2c_stock);
        assert_eq!(after.total_stock, before.total_stock);
        assert_eq!(store.movement_count().await, 0);
    }

    #[tokio::test]
    async fn falha_externa_permanente_reverte_e_propaga_classificada() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 100, 0, 100));
        let gateway = FakeGateway::new();
        gateway.fail_permanent.store(true, Ordering::SeqCst);
        let svc = service(store.clone(), gateway.clone());

        let err = svc
            .transfer(product_id, TransferDirection::B2cToB2b, 30)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Gateway(GatewayError::Permanent(_))));
        let after = store.snapshot(product_id).await;
        assert_eq!(after.b2c_stock, 100);
        assert_eq!(after.b2b_stock, 0);
    }

    #[tokio::test]
    async fn falha_externa_e_rollback_falho_viram_estado_inconsistente() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 100, 0, 100));
        let gateway = FakeGateway::new();
        gateway.fail_transient.store(true, Ordering::SeqCst);
        // Primeira chamada (commit local) funciona; a segunda (rollback) falha.
        store.fail_splits_after(1);
        let svc = service(store.clone(), gateway.clone());

        let err = svc
            .transfer(product_id, TransferDirection::B2cToB2b, 30)
            .await
            .unwrap_err();

        // Não um erro genérico: o chamador precisa distinguir este estado.
        assert!(matches!(err, AppError::InconsistentState(id) if id == product_id));
    }

    #[tokio::test]
    async fn transferencias_concorrentes_nao_estouram_o_canal() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 100, 0, 100));
        let svc = service(store.clone(), FakeGateway::new());

        // Duas transferências de 60 sobre b2c=100: sem a seção crítica por
        // registro, ambas leriam o mesmo snapshot e validariam.
        let (a, b) = tokio::join!(
            svc.transfer(product_id, TransferDirection::B2cToB2b, 60),
            svc.transfer(product_id, TransferDirection::B2cToB2b, 60),
        );

        assert_eq!(a.is_ok() as usize + b.is_ok() as usize, 1);
        let after = store.snapshot(product_id).await;
        assert_eq!(after.total_stock, 100);
        assert_eq!(after.b2b_stock, 60);
        assert_eq!(after.b2c_stock, 40);
    }

    // --- Ingestão de webhook ---

    #[tokio::test]
    async fn webhook_aplica_nivel_externo() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 50, 10, 40));
        let svc = service(store.clone(), FakeGateway::new());

        let updated = svc.apply_external_level("900300", 35).await.unwrap().unwrap();

        assert_eq!(updated.total_stock, 45);
        assert_eq!(updated.b2b_stock, 10);
        assert_eq!(updated.b2c_stock, 35);
    }

    #[tokio::test]
    async fn webhook_e_idempotente_sob_entrega_duplicada() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 50, 10, 40));
        let gateway = FakeGateway::new();
        let svc = service(store.clone(), gateway.clone());

        let first = svc.apply_external_level("900300", 35).await.unwrap().unwrap();
        let movements_after_first = store.movement_count().await;
        let second = svc.apply_external_level("900300", 35).await.unwrap().unwrap();

        // "Set", não incremento: reaplicar produz o mesmo registro,
        // sem movimentação extra no livro-razão.
        assert_eq!(second.total_stock, first.total_stock);
        assert_eq!(second.b2c_stock, first.b2c_stock);
        assert_eq!(store.movement_count().await, movements_after_first);
        // E nunca há round-trip de volta para a plataforma.
        assert_eq!(gateway.set_call_count(), 0);
    }

    #[tokio::test]
    async fn webhook_de_item_desconhecido_e_noop() {
        let store = Arc::new(MemoryLedger::new());
        let svc = service(store, FakeGateway::new());

        let result = svc.apply_external_level("desconhecido", 10).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn webhook_com_quantidade_negativa_e_descartado() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 50, 10, 40));
        let svc = service(store.clone(), FakeGateway::new());

        let before = store.snapshot(product_id).await;
        let result = svc.apply_external_level("900300", -5).await.unwrap();

        assert!(result.is_none());
        assert_eq!(store.snapshot(product_id).await, before);
    }

    // --- Ajuste administrativo ---

    #[tokio::test]
    async fn ajuste_b2c_vinculado_faz_write_through() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 50, 10, 40));
        let gateway = FakeGateway::new();
        let svc = service(store.clone(), gateway.clone());

        let updated = svc
            .adjust(product_id, StockChannel::B2c, 5, Some("Recontagem"))
            .await
            .unwrap();

        assert_eq!(updated.b2c_stock, 45);
        assert_eq!(updated.total_stock, 55);
        let last_set = gateway.last_set.lock().await.clone();
        assert_eq!(last_set, Some(("900300".to_string(), 45)));
    }

    #[tokio::test]
    async fn ajuste_b2b_vinculado_nao_toca_a_plataforma() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 50, 10, 40));
        let gateway = FakeGateway::new();
        let svc = service(store.clone(), gateway.clone());

        let updated = svc
            .adjust(product_id, StockChannel::B2b, 5, None)
            .await
            .unwrap();

        // B2B é puramente local mesmo em registro vinculado.
        assert_eq!(updated.b2b_stock, 15);
        assert_eq!(gateway.set_call_count(), 0);
    }

    #[tokio::test]
    async fn ajuste_b2c_com_falha_externa_reverte_o_delta() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(linked_record(product_id, 50, 10, 40));
        let gateway = FakeGateway::new();
        gateway.fail_transient.store(true, Ordering::SeqCst);
        let svc = service(store.clone(), gateway.clone());

        let before = store.snapshot(product_id).await;
        let err = svc
            .adjust(product_id, StockChannel::B2c, 5, None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::TransferAborted(_)));
        let after = store.snapshot(product_id).await;
        assert_eq!(after.b2c_stock, before.b2c_stock);
        assert_eq!(after.total_stock, before.total_stock);
    }

    #[tokio::test]
    async fn ajuste_em_reservas_e_rejeitado() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(local_record(product_id, 50, 10, 40));
        let svc = service(store, FakeGateway::new());

        let err = svc
            .adjust(product_id, StockChannel::Reserved, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    // --- Reserva ---

    #[tokio::test]
    async fn reserva_e_limitada_pelo_estoque_total() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(local_record(product_id, 10, 0, 10));
        let svc = service(store.clone(), FakeGateway::new());

        let updated = svc.reserve(product_id, 6).await.unwrap();
        assert_eq!(updated.reserved_stock, 6);
        assert_eq!(updated.available(), 4);

        let err = svc.reserve(product_id, 5).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock));

        let updated = svc.release(product_id, 6).await.unwrap();
        assert_eq!(updated.reserved_stock, 0);

        let err = svc.release(product_id, 1).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock));
    }

    // --- Ciclo de vida ---

    #[tokio::test]
    async fn criacao_vinculada_semeia_do_gateway() {
        let store = Arc::new(MemoryLedger::new());
        let gateway = FakeGateway::new();
        gateway.availability.store(25, Ordering::SeqCst);
        let svc = service(store, gateway);

        let product_id = Uuid::new_v4();
        let link = ExternalLink {
            external_product_id: "900100".to_string(),
            external_variant_id: "900200".to_string(),
            external_inventory_item_id: "900300".to_string(),
        };

        let created = svc
            .create_record(product_id, "Caneca Esmaltada", Some(link), 0)
            .await
            .unwrap();

        assert!(created.sync_enabled);
        assert!(created.is_linked());
        assert_eq!(created.b2c_stock, 25);
        assert_eq!(created.b2b_stock, 0);
        assert_eq!(created.total_stock, 25);
    }

    #[tokio::test]
    async fn criacao_local_usa_valor_do_operador() {
        let store = Arc::new(MemoryLedger::new());
        let svc = service(store, FakeGateway::new());

        let product_id = Uuid::new_v4();
        let created = svc
            .create_record(product_id, "Caneca Local", None, 12)
            .await
            .unwrap();

        assert!(!created.sync_enabled);
        assert_eq!(created.b2c_stock, 12);
        assert_eq!(created.total_stock, 12);
    }

    #[tokio::test]
    async fn criacao_duplicada_e_conflito() {
        let product_id = Uuid::new_v4();
        let store = MemoryLedger::with_record(local_record(product_id, 0, 0, 0));
        let svc = service(store, FakeGateway::new());

        let err = svc
            .create_record(product_id, "Outra Caneca", None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RecordAlreadyExists));
    }
}
