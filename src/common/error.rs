use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::service_order::OsStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Transição de status inválida: {from} -> {to}")]
    InvalidTransition { from: OsStatus, to: OsStatus },

    #[error("OS bloqueada para alterações (status {0})")]
    Locked(OsStatus),

    #[error("{0} não encontrado(a)")]
    ResourceNotFound(String),

    #[error("Dados insuficientes: {0}")]
    InsufficientData(String),

    #[error("Configuração de operadora inválida: {0}")]
    InvalidOperatorConfig(String),

    #[error("Já existe uma peça com a referência '{0}'")]
    RefCodeAlreadyExists(String),

    #[error("Pagamento inválido: {0}")]
    InvalidPayment(String),

    #[error("Falha ao aplicar a transição: {0}")]
    TransitionFailed(String),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Uma falha de persistência no meio de uma transição vira um único erro.
    pub fn into_transition_failure(self) -> Self {
        match self {
            AppError::DatabaseError(e) => AppError::TransitionFailed(e.to_string()),
            AppError::InternalServerError(e) => AppError::TransitionFailed(e.to_string()),
            other => other,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidPayment(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Locked(_) => StatusCode::LOCKED,
            AppError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::RefCodeAlreadyExists(_) => StatusCode::CONFLICT,
            AppError::InsufficientData(_) | AppError::InvalidOperatorConfig(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::TransitionFailed(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_message = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (status, body).into_response();
            }

            // O `tracing` loga a mensagem detalhada; o cliente recebe uma genérica.
            ref e @ (AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::TransitionFailed(_)) => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                match e {
                    AppError::TransitionFailed(_) => {
                        "Não foi possível aplicar a transição; nenhuma alteração foi gravada."
                            .to_string()
                    }
                    _ => "Ocorreu um erro inesperado.".to_string(),
                }
            }

            other => other.to_string(),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
