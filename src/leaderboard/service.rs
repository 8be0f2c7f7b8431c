use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::cursor;
use super::rank::RankCalculator;
use super::repository::{HighScore, HighScoreRepository};
use super::sort::{strictly_better, SortKey, SortName};
use super::types::{ListParams, ListQuery, ScoresAround, ScoresResponse, ScoreWithPosition};
use crate::catalog::models::PlaylistItem;
use crate::catalog::repository::CatalogRepository;
use crate::score::models::Score;
use crate::score::repository::ScoreRepository;
use crate::shared::AppError;

/// Number of ranked neighbors returned on each side of a score
pub const SCORES_AROUND_WINDOW: usize = 10;

const MAX_PAGE_SIZE: i64 = 50;

/// Read-side service over the high-score aggregates: paginated listings,
/// single-score context and per-user lookups.
pub struct LeaderboardService {
    catalog: Arc<dyn CatalogRepository + Send + Sync>,
    scores: Arc<dyn ScoreRepository + Send + Sync>,
    high_scores: Arc<dyn HighScoreRepository + Send + Sync>,
    rank: RankCalculator,
}

impl LeaderboardService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository + Send + Sync>,
        scores: Arc<dyn ScoreRepository + Send + Sync>,
        high_scores: Arc<dyn HighScoreRepository + Send + Sync>,
    ) -> Self {
        let rank = RankCalculator::new(Arc::clone(&high_scores));
        Self {
            catalog,
            scores,
            high_scores,
            rank,
        }
    }

    async fn resolve_item(
        &self,
        room_id: i64,
        playlist_item_id: i64,
    ) -> Result<PlaylistItem, AppError> {
        self.catalog
            .get_room(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid room id".to_string()))?;

        self.catalog
            .get_playlist_item(room_id, playlist_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid playlist id".to_string()))
    }

    async fn hydrate(&self, aggregate: &HighScore) -> Result<Score, AppError> {
        self.scores.get(aggregate.score_id).await?.ok_or_else(|| {
            AppError::DatabaseError(format!(
                "aggregate references missing score {}",
                aggregate.score_id
            ))
        })
    }

    /// One page of the playlist item's leaderboard.
    ///
    /// `limit` is clamped to [1, 50] (default 50); an extra row is fetched to
    /// detect whether more pages exist and dropped before returning. `total`
    /// comes from a separate count query and may be momentarily out of step
    /// with the page under concurrent completions.
    #[instrument(skip(self, query))]
    pub async fn list(
        &self,
        room_id: i64,
        playlist_item_id: i64,
        query: ListQuery,
        current_user: Option<&str>,
    ) -> Result<ScoresResponse, AppError> {
        let item = self.resolve_item(room_id, playlist_item_id).await?;

        let sort = SortName::from_param(query.sort.as_deref());
        let limit = query.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize;
        let after = query
            .cursor
            .as_deref()
            .map(|token| cursor::decode(token, sort))
            .transpose()?;

        let mut rows = self
            .high_scores
            .fetch_page(item.id, sort, after.as_ref(), limit + 1)
            .await?;

        let has_more = rows.len() == limit + 1;
        if has_more {
            rows.pop();
        }

        let next_cursor = if has_more {
            rows.last()
                .map(|last| cursor::encode(sort, last))
                .transpose()?
        } else {
            None
        };

        let mut scores = Vec::with_capacity(rows.len());
        for row in &rows {
            scores.push(self.hydrate(row).await?);
        }

        let total = self.high_scores.count(item.id).await?;

        let user_score = match current_user {
            Some(user_id) => match self.high_scores.find_for_user(item.id, user_id).await? {
                Some(aggregate) => Some(self.hydrate(&aggregate).await?),
                None => None,
            },
            None => None,
        };

        debug!(
            playlist_item_id = item.id,
            page_len = scores.len(),
            total,
            has_more,
            "Listed leaderboard page"
        );

        Ok(ScoresResponse {
            cursor: next_cursor,
            params: ListParams {
                limit,
                sort: sort.to_string(),
            },
            scores,
            total,
            user_score,
        })
    }

    /// A specific score annotated with its rank and surrounding window
    #[instrument(skip(self))]
    pub async fn show(
        &self,
        room_id: i64,
        playlist_item_id: i64,
        score_id: i64,
    ) -> Result<ScoreWithPosition, AppError> {
        let item = self.resolve_item(room_id, playlist_item_id).await?;

        let score = self
            .scores
            .get(score_id)
            .await?
            .filter(|score| score.playlist_item_id == item.id)
            .ok_or_else(|| AppError::NotFound("Invalid score id".to_string()))?;

        self.annotate(item.id, score).await
    }

    /// A user's current high score annotated with its rank and surrounding
    /// window; NotFound when the user has no aggregate on this item
    #[instrument(skip(self))]
    pub async fn show_user(
        &self,
        room_id: i64,
        playlist_item_id: i64,
        user_id: &str,
    ) -> Result<ScoreWithPosition, AppError> {
        let item = self.resolve_item(room_id, playlist_item_id).await?;

        let aggregate = self
            .high_scores
            .find_for_user(item.id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No high score for user".to_string()))?;

        let score = self.hydrate(&aggregate).await?;
        self.annotate(item.id, score).await
    }

    /// Annotates a score with `position` and its `scores_around` window.
    /// Works for aggregate members and for arbitrary plays alike; the
    /// position of a non-aggregate score is where it would slot in.
    #[instrument(skip(self, score))]
    pub async fn annotate(
        &self,
        playlist_item_id: i64,
        score: Score,
    ) -> Result<ScoreWithPosition, AppError> {
        let key = SortKey::from(&score);
        let position = self.rank.rank(playlist_item_id, &key).await?;

        let slice = self
            .rank
            .neighbors(playlist_item_id, position, SCORES_AROUND_WINDOW)
            .await?;

        let mut higher = Vec::new();
        let mut lower = Vec::new();
        for row in &slice {
            if row.score_id == score.id {
                continue;
            }
            if strictly_better(&row.sort_key(), &key) {
                higher.push(self.hydrate(row).await?);
            } else if lower.len() < SCORES_AROUND_WINDOW {
                lower.push(self.hydrate(row).await?);
            }
        }

        info!(
            playlist_item_id,
            score_id = score.id,
            position,
            higher = higher.len(),
            lower = lower.len(),
            "Annotated score with leaderboard context"
        );

        Ok(ScoreWithPosition {
            score,
            position,
            scores_around: ScoresAround { higher, lower },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::{PlaylistItem, Room};
    use crate::catalog::repository::InMemoryCatalogRepository;
    use crate::leaderboard::repository::InMemoryHighScoreRepository;
    use crate::score::models::{NewScore, ScoreState};
    use crate::score::repository::InMemoryScoreRepository;
    use chrono::Utc;

    struct Fixture {
        scores: Arc<InMemoryScoreRepository>,
        high_scores: Arc<InMemoryHighScoreRepository>,
        service: LeaderboardService,
    }

    async fn fixture() -> Fixture {
        let catalog = Arc::new(InMemoryCatalogRepository::new());
        catalog
            .seed_room(Room {
                id: 1,
                name: "room".to_string(),
                ends_at: None,
                participant_ids: vec![],
            })
            .await;
        catalog
            .seed_playlist_item(PlaylistItem {
                id: 10,
                room_id: 1,
                ruleset_id: 0,
                beatmap_id: 1,
                required_mods: vec![],
                allowed_mods: vec![],
                max_attempts: None,
                expired: false,
            })
            .await;

        let scores = Arc::new(InMemoryScoreRepository::new());
        let high_scores = Arc::new(InMemoryHighScoreRepository::new());
        let service = LeaderboardService::new(catalog, scores.clone(), high_scores.clone());

        Fixture {
            scores,
            high_scores,
            service,
        }
    }

    /// Seeds one completed score + aggregate for a user
    async fn seed_completion(fixture: &Fixture, user_id: &str, total_score: i64, accuracy: f64) {
        let mut score = fixture
            .scores
            .create(NewScore {
                user_id: user_id.to_string(),
                room_id: 1,
                playlist_item_id: 10,
                started_at: Utc::now(),
                build_hash: None,
            })
            .await
            .unwrap();
        score.state = ScoreState::Completed;
        score.ended_at = Some(Utc::now());
        score.total_score = total_score;
        score.accuracy = accuracy;
        score.passed = true;
        fixture.scores.update(&score).await.unwrap();
        fixture
            .high_scores
            .upsert_if_better(HighScore::candidate(&score))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lists_default_sorted_page_with_total() {
        let fx = fixture().await;
        seed_completion(&fx, "a", 900_000, 0.95).await;
        seed_completion(&fx, "b", 950_000, 0.9).await;

        let response = fx
            .service
            .list(1, 10, ListQuery::default(), None)
            .await
            .unwrap();

        assert_eq!(response.total, 2);
        assert!(response.cursor.is_none());
        assert_eq!(response.params.limit, 50);
        assert_eq!(response.params.sort, "score_desc");
        assert_eq!(response.scores[0].user_id, "b");
        assert_eq!(response.scores[1].user_id, "a");
        assert!(response.user_score.is_none());
    }

    #[tokio::test]
    async fn limit_one_pages_through_with_cursor() {
        let fx = fixture().await;
        seed_completion(&fx, "a", 900_000, 0.95).await;
        seed_completion(&fx, "b", 950_000, 0.9).await;

        let first = fx
            .service
            .list(
                1,
                10,
                ListQuery {
                    limit: Some(1),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(first.scores.len(), 1);
        assert_eq!(first.scores[0].user_id, "b");
        let token = first.cursor.expect("first page should have a cursor");

        let second = fx
            .service
            .list(
                1,
                10,
                ListQuery {
                    limit: Some(1),
                    cursor: Some(token),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(second.scores.len(), 1);
        assert_eq!(second.scores[0].user_id, "a");
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn limit_is_clamped_and_bad_sort_falls_back() {
        let fx = fixture().await;
        seed_completion(&fx, "a", 900_000, 0.95).await;

        let response = fx
            .service
            .list(
                1,
                10,
                ListQuery {
                    limit: Some(500),
                    sort: Some("sideways".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(response.params.limit, 50);
        assert_eq!(response.params.sort, "score_desc");
    }

    #[tokio::test]
    async fn attaches_callers_own_score() {
        let fx = fixture().await;
        seed_completion(&fx, "a", 900_000, 0.95).await;
        seed_completion(&fx, "b", 950_000, 0.9).await;

        let response = fx
            .service
            .list(1, 10, ListQuery::default(), Some("a"))
            .await
            .unwrap();
        assert_eq!(response.user_score.unwrap().user_id, "a");

        let response = fx
            .service
            .list(1, 10, ListQuery::default(), Some("nobody"))
            .await
            .unwrap();
        assert!(response.user_score.is_none());
    }

    #[tokio::test]
    async fn rejects_bad_cursor_tokens() {
        let fx = fixture().await;
        let result = fx
            .service
            .list(
                1,
                10,
                ListQuery {
                    cursor: Some("@@@".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await;
        assert!(matches!(result, Err(AppError::InvalidCursor(_))));
    }

    #[tokio::test]
    async fn unknown_room_or_item_is_not_found() {
        let fx = fixture().await;
        assert!(matches!(
            fx.service.list(99, 10, ListQuery::default(), None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.list(1, 99, ListQuery::default(), None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn show_user_annotates_position_and_neighbors() {
        let fx = fixture().await;
        seed_completion(&fx, "a", 900_000, 0.95).await;
        seed_completion(&fx, "b", 950_000, 0.9).await;
        seed_completion(&fx, "c", 850_000, 0.85).await;

        let shown = fx.service.show_user(1, 10, "a").await.unwrap();
        assert_eq!(shown.position, 2);
        assert_eq!(shown.scores_around.higher.len(), 1);
        assert_eq!(shown.scores_around.higher[0].user_id, "b");
        assert_eq!(shown.scores_around.lower.len(), 1);
        assert_eq!(shown.scores_around.lower[0].user_id, "c");
    }

    #[tokio::test]
    async fn show_user_without_aggregate_is_not_found() {
        let fx = fixture().await;
        let result = fx.service.show_user(1, 10, "ghost").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn show_resolves_score_by_id() {
        let fx = fixture().await;
        seed_completion(&fx, "a", 900_000, 0.95).await;
        seed_completion(&fx, "b", 950_000, 0.9).await;

        let aggregate = fx.high_scores.find_for_user(10, "b").await.unwrap().unwrap();
        let shown = fx.service.show(1, 10, aggregate.score_id).await.unwrap();
        assert_eq!(shown.position, 1);
        assert!(shown.scores_around.higher.is_empty());
        assert_eq!(shown.scores_around.lower.len(), 1);

        let missing = fx.service.show(1, 10, 9999).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
