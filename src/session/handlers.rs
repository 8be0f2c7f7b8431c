use axum::{extract::State, Json};
use tracing::{info, instrument};
use uuid::Uuid;

use super::types::{SessionCreateRequest, SessionResponse};
use crate::shared::{AppError, AppState};

/// HTTP handler for issuing a session token
///
/// POST /session
/// Returns a bearer token for the given (or a freshly generated) user id
#[instrument(name = "create_session", skip(state))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionCreateRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let user_id = request
        .user_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let token = state
        .token_config
        .create_token(user_id.clone(), request.is_admin)?;

    info!(user_id = %user_id, is_admin = request.is_admin, "Session token issued");

    Ok(Json(SessionResponse { token, user_id }))
}
