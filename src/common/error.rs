use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::gateway::GatewayError;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
//
// Erros de validação (`RecordNotFound`, `InsufficientStock`) são resultados
// tipados devolvidos ao chamador; nunca viram exceção genérica. Falhas do
// gateway chegam aqui já classificadas (transitória vs permanente) — o motor
// de reconciliação decide rollback sem reinspecionar códigos HTTP crus.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Registro de inventário não encontrado")]
    RecordNotFound,

    #[error("Já existe um registro de inventário para este produto")]
    RecordAlreadyExists,

    #[error("Estoque insuficiente no canal de origem")]
    InsufficientStock,

    #[error("Falha no gateway de inventário externo: {0}")]
    Gateway(#[from] GatewayError),

    // A escrita local foi desfeita com sucesso após a falha externa:
    // nenhuma alteração observável, seguro repetir a operação do zero.
    #[error("Transferência abortada (estado local restaurado): {0}")]
    TransferAborted(String),

    // A escrita externa falhou E o rollback local também falhou. Fatal:
    // ledger local e plataforma externa estão comprovadamente divergentes.
    #[error("Estado inconsistente entre ledger local e plataforma externa (produto {0})")]
    InconsistentState(Uuid),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::RecordNotFound => {
                (StatusCode::NOT_FOUND, "Registro de inventário não encontrado.".to_string())
            }
            AppError::RecordAlreadyExists => (
                StatusCode::CONFLICT,
                "Já existe um registro de inventário para este produto.".to_string(),
            ),
            AppError::InsufficientStock => (
                StatusCode::CONFLICT,
                "Estoque insuficiente no canal de origem. Escolha uma quantidade menor.".to_string(),
            ),
            AppError::Gateway(GatewayError::Transient(msg)) => {
                tracing::warn!("Falha transitória no gateway externo: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Falha temporária na plataforma externa. Tente novamente.".to_string(),
                )
            }
            AppError::Gateway(GatewayError::Permanent(msg)) => {
                tracing::error!("Falha permanente no gateway externo: {}", msg);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "A plataforma externa rejeitou a operação. Verifique o vínculo do produto.".to_string(),
                )
            }
            AppError::TransferAborted(reason) => {
                tracing::warn!("Transferência abortada, estado restaurado: {}", reason);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "A operação foi abortada e nenhuma alteração foi aplicada. Tente novamente.".to_string(),
                )
            }
            // O único caso que escapa do tratamento normal: o admin deve ver um
            // estado distinto, não um toast genérico de falha.
            AppError::InconsistentState(product_id) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "O estoque do produto {} pode estar incorreto — contate o suporte.",
                    product_id
                ),
            ),

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` vai logar a mensagem detalhada que `thiserror` nos deu.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.".to_string())
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
