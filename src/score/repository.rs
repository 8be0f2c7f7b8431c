use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::models::{NewScore, Score, ScoreState};
use crate::shared::AppError;

/// Persistence for individual plays. Score rows are write-once after
/// creation (one terminal update by their owner), so no locking beyond
/// atomic single-row writes is needed here.
#[async_trait]
pub trait ScoreRepository {
    /// Inserts a fresh `started` score and returns it with its assigned id
    async fn create(&self, new_score: NewScore) -> Result<Score, AppError>;
    async fn get(&self, score_id: i64) -> Result<Option<Score>, AppError>;
    /// Persists the terminal state of an existing score
    async fn update(&self, score: &Score) -> Result<(), AppError>;
    /// Number of plays (any state) by a user against a playlist item
    async fn count_attempts(&self, playlist_item_id: i64, user_id: &str)
        -> Result<u32, AppError>;
}

/// In-memory implementation for development and testing. Ids are assigned
/// from a monotonically increasing sequence so the earliest attempt always
/// has the smallest id, matching the comparator's tie-break.
pub struct InMemoryScoreRepository {
    scores: RwLock<HashMap<i64, Score>>,
    next_id: AtomicI64,
}

impl Default for InMemoryScoreRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryScoreRepository {
    pub fn new() -> Self {
        Self {
            scores: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl ScoreRepository for InMemoryScoreRepository {
    #[instrument(skip(self, new_score))]
    async fn create(&self, new_score: NewScore) -> Result<Score, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let score = Score {
            id,
            user_id: new_score.user_id,
            room_id: new_score.room_id,
            playlist_item_id: new_score.playlist_item_id,
            state: ScoreState::Started,
            started_at: new_score.started_at,
            ended_at: None,
            total_score: 0,
            accuracy: 0.0,
            max_combo: 0,
            passed: false,
            rank_grade: None,
            mods: Default::default(),
            statistics: serde_json::Value::Null,
            build_hash: new_score.build_hash,
        };

        debug!(score_id = id, user_id = %score.user_id, "Created score in memory");
        self.scores.write().await.insert(id, score.clone());
        Ok(score)
    }

    #[instrument(skip(self))]
    async fn get(&self, score_id: i64) -> Result<Option<Score>, AppError> {
        Ok(self.scores.read().await.get(&score_id).cloned())
    }

    #[instrument(skip(self, score))]
    async fn update(&self, score: &Score) -> Result<(), AppError> {
        let mut scores = self.scores.write().await;
        if !scores.contains_key(&score.id) {
            warn!(score_id = score.id, "Score not found for update in memory");
            return Err(AppError::NotFound("Score not found".to_string()));
        }
        scores.insert(score.id, score.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_attempts(
        &self,
        playlist_item_id: i64,
        user_id: &str,
    ) -> Result<u32, AppError> {
        let scores = self.scores.read().await;
        Ok(scores
            .values()
            .filter(|s| s.playlist_item_id == playlist_item_id && s.user_id == user_id)
            .count() as u32)
    }
}

/// PostgreSQL implementation of score persistence
pub struct PostgresScoreRepository {
    pool: PgPool,
}

impl PostgresScoreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> Result<Score, AppError> {
        let state: String = row.get("state");
        let mods: String = row.get("mods");
        let statistics: String = row.get("statistics");

        Ok(Score {
            id: row.get("id"),
            user_id: row.get("user_id"),
            room_id: row.get("room_id"),
            playlist_item_id: row.get("playlist_item_id"),
            state: state
                .parse()
                .map_err(|_| AppError::DatabaseError(format!("bad score state: {}", state)))?,
            started_at: row.get("started_at"),
            ended_at: row.get("ended_at"),
            total_score: row.get("total_score"),
            accuracy: row.get("accuracy"),
            max_combo: row.get("max_combo"),
            passed: row.get("passed"),
            rank_grade: row.get("rank_grade"),
            mods: serde_json::from_str(&mods)
                .map_err(|e| AppError::DatabaseError(format!("bad mods payload: {}", e)))?,
            statistics: serde_json::from_str(&statistics)
                .map_err(|e| AppError::DatabaseError(format!("bad statistics payload: {}", e)))?,
            build_hash: row.get("build_hash"),
        })
    }
}

#[async_trait]
impl ScoreRepository for PostgresScoreRepository {
    #[instrument(skip(self, new_score))]
    async fn create(&self, new_score: NewScore) -> Result<Score, AppError> {
        debug!(user_id = %new_score.user_id, "Creating score in database");

        let row = sqlx::query(
            "INSERT INTO scores \
             (user_id, room_id, playlist_item_id, state, started_at, total_score, accuracy, \
              max_combo, passed, mods, statistics, build_hash) \
             VALUES ($1, $2, $3, 'started', $4, 0, 0, 0, FALSE, '[]', 'null', $5) \
             RETURNING id",
        )
        .bind(&new_score.user_id)
        .bind(new_score.room_id)
        .bind(new_score.playlist_item_id)
        .bind(new_score.started_at)
        .bind(&new_score.build_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create score in database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(Score {
            id: row.get("id"),
            user_id: new_score.user_id,
            room_id: new_score.room_id,
            playlist_item_id: new_score.playlist_item_id,
            state: ScoreState::Started,
            started_at: new_score.started_at,
            ended_at: None,
            total_score: 0,
            accuracy: 0.0,
            max_combo: 0,
            passed: false,
            rank_grade: None,
            mods: Default::default(),
            statistics: serde_json::Value::Null,
            build_hash: new_score.build_hash,
        })
    }

    #[instrument(skip(self))]
    async fn get(&self, score_id: i64) -> Result<Option<Score>, AppError> {
        let row = sqlx::query("SELECT * FROM scores WHERE id = $1")
            .bind(score_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, score_id, "Failed to fetch score from database");
                AppError::DatabaseError(e.to_string())
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    #[instrument(skip(self, score))]
    async fn update(&self, score: &Score) -> Result<(), AppError> {
        debug!(score_id = score.id, state = %score.state, "Updating score in database");

        let mods = serde_json::to_string(&score.mods)
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        let statistics = serde_json::to_string(&score.statistics)
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE scores SET state = $2, ended_at = $3, total_score = $4, accuracy = $5, \
             max_combo = $6, passed = $7, rank_grade = $8, mods = $9, statistics = $10 \
             WHERE id = $1",
        )
        .bind(score.id)
        .bind(score.state.to_string())
        .bind(score.ended_at)
        .bind(score.total_score)
        .bind(score.accuracy)
        .bind(score.max_combo)
        .bind(score.passed)
        .bind(&score.rank_grade)
        .bind(mods)
        .bind(statistics)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, score_id = score.id, "Failed to update score in database");
            AppError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Score not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_attempts(
        &self,
        playlist_item_id: i64,
        user_id: &str,
    ) -> Result<u32, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS attempts FROM scores \
             WHERE playlist_item_id = $1 AND user_id = $2",
        )
        .bind(playlist_item_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to count attempts in database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.get::<i64, _>("attempts") as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_score(user_id: &str, playlist_item_id: i64) -> NewScore {
        NewScore {
            user_id: user_id.to_string(),
            room_id: 1,
            playlist_item_id,
            started_at: Utc::now(),
            build_hash: None,
        }
    }

    #[tokio::test]
    async fn assigns_increasing_ids() {
        let repo = InMemoryScoreRepository::new();
        let first = repo.create(new_score("u1", 10)).await.unwrap();
        let second = repo.create(new_score("u1", 10)).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(first.state, ScoreState::Started);
        assert!(first.ended_at.is_none());
    }

    #[tokio::test]
    async fn updates_persist() {
        let repo = InMemoryScoreRepository::new();
        let mut score = repo.create(new_score("u1", 10)).await.unwrap();
        score.state = ScoreState::Completed;
        score.ended_at = Some(Utc::now());
        score.total_score = 900_000;
        repo.update(&score).await.unwrap();

        let fetched = repo.get(score.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, ScoreState::Completed);
        assert_eq!(fetched.total_score, 900_000);
        assert!(fetched.ended_at.is_some());
    }

    #[tokio::test]
    async fn update_of_missing_score_is_not_found() {
        let repo = InMemoryScoreRepository::new();
        let mut score = repo.create(new_score("u1", 10)).await.unwrap();
        score.id = 999;
        let err = repo.update(&score).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn counts_attempts_per_item_and_user() {
        let repo = InMemoryScoreRepository::new();
        repo.create(new_score("u1", 10)).await.unwrap();
        repo.create(new_score("u1", 10)).await.unwrap();
        repo.create(new_score("u1", 11)).await.unwrap();
        repo.create(new_score("u2", 10)).await.unwrap();

        assert_eq!(repo.count_attempts(10, "u1").await.unwrap(), 2);
        assert_eq!(repo.count_attempts(11, "u1").await.unwrap(), 1);
        assert_eq!(repo.count_attempts(10, "u3").await.unwrap(), 0);
    }
}
