use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use super::types::SessionClaims;
use crate::shared::{AppError, AppState};

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

/// JWT authentication middleware - validates Authorization Bearer header and
/// adds SessionClaims to request extensions.
/// Usage: .layer(middleware::from_fn_with_state(app_state.clone(), session::jwt_auth))
/// Handlers can then extract Extension(claims): Extension<SessionClaims>.
#[instrument(skip(state, req, next))]
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| {
        warn!(uri = %req.uri(), "Missing or malformed Authorization header");
        AppError::Unauthorized("Missing authorization header".to_string())
    })?;

    let claims = match state.token_config.validate_token(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("JWT authentication failed: {}", e);
            return Err(e);
        }
    };

    debug!(user_id = %claims.user_id, "Authentication successful, adding claims to request");
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Optional-auth variant for public leaderboard reads: a valid bearer token
/// attaches the caller's identity (used for `user_score`), anything else
/// passes through anonymously instead of failing the request.
#[instrument(skip(state, req, next))]
pub async fn jwt_auth_optional(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims: Option<SessionClaims> =
        bearer_token(&req).and_then(|token| match state.token_config.validate_token(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!("Ignoring invalid bearer token on public route: {}", e);
                None
            }
        });

    req.extensions_mut().insert(claims);

    next.run(req).await
}
