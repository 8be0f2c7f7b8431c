use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::models::{NewScore, Score, ScoreState};
use super::repository::ScoreRepository;
use super::types::{CompletePlayRequest, StartPlayRequest};
use crate::catalog::models::{normalize_version_hash, PlaylistItem, Room};
use crate::catalog::repository::{BuildRepository, CatalogRepository};
use crate::leaderboard::repository::{HighScore, HighScoreRepository};
use crate::mods::ModSet;
use crate::session::types::SessionClaims;
use crate::shared::AppError;

/// Service for the play lifecycle: `started → completed | failed`.
///
/// Scores are created here, reach a terminal state exactly once, and on a
/// successful passed completion are offered to the high-score aggregator.
pub struct ScoreService {
    catalog: Arc<dyn CatalogRepository + Send + Sync>,
    builds: Arc<dyn BuildRepository + Send + Sync>,
    scores: Arc<dyn ScoreRepository + Send + Sync>,
    high_scores: Arc<dyn HighScoreRepository + Send + Sync>,
}

impl ScoreService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository + Send + Sync>,
        builds: Arc<dyn BuildRepository + Send + Sync>,
        scores: Arc<dyn ScoreRepository + Send + Sync>,
        high_scores: Arc<dyn HighScoreRepository + Send + Sync>,
    ) -> Self {
        Self {
            catalog,
            builds,
            scores,
            high_scores,
        }
    }

    async fn resolve(
        &self,
        room_id: i64,
        playlist_item_id: i64,
    ) -> Result<(Room, PlaylistItem), AppError> {
        let room = self
            .catalog
            .get_room(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid room id".to_string()))?;

        let item = self
            .catalog
            .get_playlist_item(room_id, playlist_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid playlist id".to_string()))?;

        Ok((room, item))
    }

    /// Verifies the submitting client build is on the ranked allow-list.
    /// Admins bypass this entirely.
    async fn check_client_build(
        &self,
        claims: &SessionClaims,
        request: &StartPlayRequest,
    ) -> Result<Option<String>, AppError> {
        if claims.is_admin {
            return Ok(None);
        }

        let raw = request
            .version_hash
            .as_deref()
            .map(str::trim)
            .filter(|hash| !hash.is_empty())
            .ok_or_else(|| AppError::ClientNotAllowed("missing client version".to_string()))?;

        let hash = normalize_version_hash(raw);

        self.builds.find_ranked(&hash).await?.ok_or_else(|| {
            warn!(user_id = %claims.user_id, "Rejected non-allow-listed client build");
            AppError::ClientNotAllowed("client version not allowed".to_string())
        })?;

        Ok(Some(hash))
    }

    /// Starts a play against a playlist item, creating a `started` score
    #[instrument(skip(self, claims, request))]
    pub async fn start_play(
        &self,
        claims: &SessionClaims,
        room_id: i64,
        playlist_item_id: i64,
        request: StartPlayRequest,
    ) -> Result<Score, AppError> {
        let (room, item) = self.resolve(room_id, playlist_item_id).await?;
        let now = Utc::now();

        if !room.can_be_played_by(&claims.user_id) {
            return Err(AppError::Forbidden(
                "User cannot play in this room".to_string(),
            ));
        }
        if room.has_ended(now) {
            return Err(AppError::invariant("Room has ended"));
        }
        if item.expired {
            return Err(AppError::invariant("Playlist item has expired"));
        }

        if let Some(max_attempts) = item.max_attempts {
            let attempts = self.scores.count_attempts(item.id, &claims.user_id).await?;
            if attempts >= max_attempts {
                return Err(AppError::invariant(
                    "Maximum attempts for this playlist item reached",
                ));
            }
        }

        let build_hash = self.check_client_build(claims, &request).await?;

        let score = self
            .scores
            .create(NewScore {
                user_id: claims.user_id.clone(),
                room_id: room.id,
                playlist_item_id: item.id,
                started_at: now,
                build_hash,
            })
            .await?;

        info!(
            score_id = score.id,
            user_id = %claims.user_id,
            playlist_item_id = item.id,
            "Play started"
        );

        Ok(score)
    }

    fn validate_submission(
        item: &PlaylistItem,
        request: &CompletePlayRequest,
    ) -> Result<ModSet, AppError> {
        if request.total_score < 0 {
            return Err(AppError::invariant("total_score must be non-negative"));
        }
        if request.max_combo < 0 {
            return Err(AppError::invariant("max_combo must be non-negative"));
        }
        if !(0.0..=1.0).contains(&request.accuracy) {
            return Err(AppError::invariant("accuracy must be between 0 and 1"));
        }

        let mods = ModSet::normalize(&request.mods, item.ruleset_id)?;
        item.assert_mods_allowed(&mods)?;

        Ok(mods)
    }

    /// Completes a play owned by the caller.
    ///
    /// Validation failure still terminalizes the score (state `failed`); a
    /// score already terminal is rejected without touching anything. On a
    /// successful passed completion the aggregate is updated through the
    /// repository's per-(item, user) compare-and-swap, so concurrent
    /// completions converge on the best score without caller-visible
    /// conflicts.
    #[instrument(skip(self, claims, request))]
    pub async fn complete_play(
        &self,
        claims: &SessionClaims,
        room_id: i64,
        playlist_item_id: i64,
        score_id: i64,
        request: CompletePlayRequest,
    ) -> Result<Score, AppError> {
        let (_room, item) = self.resolve(room_id, playlist_item_id).await?;

        // scoped to the owning user: someone else's score id is a 404
        let mut score = self
            .scores
            .get(score_id)
            .await?
            .filter(|score| score.playlist_item_id == item.id && score.user_id == claims.user_id)
            .ok_or_else(|| AppError::NotFound("Invalid score id".to_string()))?;

        if score.state.is_terminal() {
            debug!(score_id, state = %score.state, "Rejecting completion of terminal score");
            return Err(AppError::invariant("Score has already been submitted"));
        }

        let now = Utc::now();
        match Self::validate_submission(&item, &request) {
            Err(validation_error) => {
                score.state = ScoreState::Failed;
                score.ended_at = Some(now);
                self.scores.update(&score).await?;
                warn!(
                    score_id,
                    error = %validation_error,
                    "Completion failed validation; score marked failed"
                );
                Err(validation_error)
            }
            Ok(mods) => {
                score.state = ScoreState::Completed;
                score.ended_at = Some(now);
                score.total_score = request.total_score;
                score.accuracy = request.accuracy;
                score.max_combo = request.max_combo;
                score.passed = request.passed;
                score.rank_grade = request.rank.clone();
                score.mods = mods;
                score.statistics = request.statistics.clone();
                self.scores.update(&score).await?;

                if score.passed {
                    let replaced = self
                        .high_scores
                        .upsert_if_better(HighScore::candidate(&score))
                        .await?;
                    debug!(score_id, replaced, "Offered completion to aggregator");
                }

                info!(
                    score_id,
                    user_id = %claims.user_id,
                    total_score = score.total_score,
                    passed = score.passed,
                    "Play completed"
                );

                Ok(score)
            }
        }
    }
}
