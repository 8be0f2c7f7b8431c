use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::repository::{BuildRepository, CatalogRepository};
use crate::leaderboard::repository::HighScoreRepository;
use crate::score::repository::ScoreRepository;
use crate::session::token::TokenConfig;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub catalog_repository: Arc<dyn CatalogRepository + Send + Sync>,
    pub build_repository: Arc<dyn BuildRepository + Send + Sync>,
    pub score_repository: Arc<dyn ScoreRepository + Send + Sync>,
    pub high_score_repository: Arc<dyn HighScoreRepository + Send + Sync>,
    pub token_config: TokenConfig,
}

impl AppState {
    pub fn new(
        catalog_repository: Arc<dyn CatalogRepository + Send + Sync>,
        build_repository: Arc<dyn BuildRepository + Send + Sync>,
        score_repository: Arc<dyn ScoreRepository + Send + Sync>,
        high_score_repository: Arc<dyn HighScoreRepository + Send + Sync>,
    ) -> Self {
        Self {
            catalog_repository,
            build_repository,
            score_repository,
            high_score_repository,
            token_config: TokenConfig::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Client build hash missing or not on the ranked allow-list
    #[error("Client not allowed: {0}")]
    ClientNotAllowed(String),

    /// Domain-rule breach carrying a caller-facing message and status code
    #[error("{message}")]
    InvariantViolation { message: String, status: u16 },

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Invariant failure with the default 422 status
    pub fn invariant(message: impl Into<String>) -> Self {
        AppError::InvariantViolation {
            message: message.into(),
            status: 422,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::JwtError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ClientNotAllowed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::InvariantViolation { message, status } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY),
                message,
            ),
            AppError::InvalidCursor(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
