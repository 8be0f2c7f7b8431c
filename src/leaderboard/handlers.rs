use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::service::LeaderboardService;
use super::types::{ListQuery, ScoresResponse, ScoreWithPosition};
use crate::session::types::SessionClaims;
use crate::shared::{AppError, AppState};

fn leaderboard_service(state: &AppState) -> LeaderboardService {
    LeaderboardService::new(
        Arc::clone(&state.catalog_repository),
        Arc::clone(&state.score_repository),
        Arc::clone(&state.high_score_repository),
    )
}

/// HTTP handler for the paginated leaderboard listing
///
/// GET /rooms/:room_id/playlist/:playlist_item_id/scores
/// Auth optional; an authenticated caller gets their own score attached.
#[instrument(name = "list_scores", skip(state, claims, query))]
pub async fn list_scores(
    State(state): State<AppState>,
    Path((room_id, playlist_item_id)): Path<(i64, i64)>,
    Query(query): Query<ListQuery>,
    Extension(claims): Extension<Option<SessionClaims>>,
) -> Result<Json<ScoresResponse>, AppError> {
    let service = leaderboard_service(&state);
    let current_user = claims.as_ref().map(|c| c.user_id.as_str());

    let response = service
        .list(room_id, playlist_item_id, query, current_user)
        .await?;

    Ok(Json(response))
}

/// HTTP handler for a single score with its leaderboard context
///
/// GET /rooms/:room_id/playlist/:playlist_item_id/scores/:score_id
#[instrument(name = "show_score", skip(state))]
pub async fn show_score(
    State(state): State<AppState>,
    Path((room_id, playlist_item_id, score_id)): Path<(i64, i64, i64)>,
) -> Result<Json<ScoreWithPosition>, AppError> {
    let service = leaderboard_service(&state);
    let response = service.show(room_id, playlist_item_id, score_id).await?;
    Ok(Json(response))
}

/// HTTP handler for a user's high score with its leaderboard context
///
/// GET /rooms/:room_id/playlist/:playlist_item_id/users/:user_id/scores
/// 404 when the user has no aggregate on the playlist item.
#[instrument(name = "show_user_high_score", skip(state))]
pub async fn show_user_high_score(
    State(state): State<AppState>,
    Path((room_id, playlist_item_id, user_id)): Path<(i64, i64, String)>,
) -> Result<Json<ScoreWithPosition>, AppError> {
    let service = leaderboard_service(&state);
    let response = service
        .show_user(room_id, playlist_item_id, &user_id)
        .await?;
    Ok(Json(response))
}
