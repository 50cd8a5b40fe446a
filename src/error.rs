use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Insufficient funds: available={available}, requested={requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Bank period not found: {0}")]
    BankNotFound(i64),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            CrmError::InsufficientFunds { .. } => {
                tracing::warn!("Insufficient funds: {}", self);
                (StatusCode::BAD_REQUEST, "Insufficient funds", self.to_string())
            }
            CrmError::InvalidAmount(_) => {
                tracing::warn!("Invalid amount: {}", self);
                (StatusCode::BAD_REQUEST, "Invalid amount", self.to_string())
            }
            CrmError::EntityNotFound(_) => {
                tracing::warn!("Entity not found: {}", self);
                (StatusCode::NOT_FOUND, "Entity not found", self.to_string())
            }
            CrmError::BankNotFound(_) => {
                tracing::warn!("Bank period not found: {}", self);
                (StatusCode::NOT_FOUND, "Bank period not found", self.to_string())
            }
            CrmError::StorageUnavailable(e) => {
                tracing::error!("Storage unavailable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable", self.to_string())
            }
            CrmError::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error", self.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "details": details,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for CrmError {
    fn from(error: sqlx::Error) -> Self {
        CrmError::StorageUnavailable(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CrmError>;
