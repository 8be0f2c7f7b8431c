use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::models::Score;
use super::service::ScoreService;
use super::types::{CompletePlayRequest, StartPlayRequest};
use crate::leaderboard::service::LeaderboardService;
use crate::leaderboard::types::ScoreWithPosition;
use crate::session::types::SessionClaims;
use crate::shared::{AppError, AppState};

fn score_service(state: &AppState) -> ScoreService {
    ScoreService::new(
        Arc::clone(&state.catalog_repository),
        Arc::clone(&state.build_repository),
        Arc::clone(&state.score_repository),
        Arc::clone(&state.high_score_repository),
    )
}

/// HTTP handler for starting a play
///
/// POST /rooms/:room_id/playlist/:playlist_item_id/scores
/// Requires authentication; non-admins must submit an allow-listed
/// version_hash.
#[instrument(name = "start_play", skip(state, claims, request))]
pub async fn start_play(
    State(state): State<AppState>,
    Path((room_id, playlist_item_id)): Path<(i64, i64)>,
    Extension(claims): Extension<SessionClaims>,
    Json(request): Json<StartPlayRequest>,
) -> Result<Json<Score>, AppError> {
    info!(user_id = %claims.user_id, room_id, playlist_item_id, "Starting play");

    let service = score_service(&state);
    let score = service
        .start_play(&claims, room_id, playlist_item_id, request)
        .await?;

    Ok(Json(score))
}

/// HTTP handler for completing a play
///
/// PUT /rooms/:room_id/playlist/:playlist_item_id/scores/:score_id
/// Owner-only; returns the terminal score annotated with its leaderboard
/// context.
#[instrument(name = "complete_play", skip(state, claims, request))]
pub async fn complete_play(
    State(state): State<AppState>,
    Path((room_id, playlist_item_id, score_id)): Path<(i64, i64, i64)>,
    Extension(claims): Extension<SessionClaims>,
    Json(request): Json<CompletePlayRequest>,
) -> Result<Json<ScoreWithPosition>, AppError> {
    info!(user_id = %claims.user_id, room_id, playlist_item_id, score_id, "Completing play");

    let service = score_service(&state);
    let score = service
        .complete_play(&claims, room_id, playlist_item_id, score_id, request)
        .await?;

    let leaderboard = LeaderboardService::new(
        Arc::clone(&state.catalog_repository),
        Arc::clone(&state.score_repository),
        Arc::clone(&state.high_score_repository),
    );
    let annotated = leaderboard.annotate(playlist_item_id, score).await?;

    Ok(Json(annotated))
}
