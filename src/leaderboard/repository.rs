use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::cursor::Cursor;
use super::sort::{cmp_for, strictly_better, SortKey, SortName};
use crate::score::models::Score;
use crate::shared::AppError;

/// Per-(playlist item, user) aggregate: a reference to the single best
/// completed score for that pair, denormalizing the sort-key columns the
/// leaderboard orders by. A materialized view over scores, not source of
/// truth for history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighScore {
    pub playlist_item_id: i64,
    pub user_id: String,
    pub score_id: i64,
    pub total_score: i64,
    pub accuracy: f64,
    /// Bumped on every replacement; the Postgres upsert conditions on it
    pub version: i64,
}

impl HighScore {
    /// Builds the aggregate candidate for a terminal completed score
    pub fn candidate(score: &Score) -> Self {
        Self {
            playlist_item_id: score.playlist_item_id,
            user_id: score.user_id.clone(),
            score_id: score.id,
            total_score: score.total_score,
            accuracy: score.accuracy,
            version: 0,
        }
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey {
            total_score: self.total_score,
            accuracy: self.accuracy,
            score_id: self.score_id,
        }
    }
}

/// Persistence for high-score aggregates.
///
/// `upsert_if_better` is the aggregator's compare-and-swap: it must be
/// atomic per (playlist item, user) pair under concurrent completions. Read
/// methods reflect a snapshot at query time and may run at weaker isolation.
#[async_trait]
pub trait HighScoreRepository {
    /// Creates the aggregate on first qualifying completion, or replaces it
    /// when `candidate` strictly beats the current one under the canonical
    /// comparator. Returns true if the aggregate was created or replaced.
    async fn upsert_if_better(&self, candidate: HighScore) -> Result<bool, AppError>;

    /// One page of aggregates in `sort` order, starting strictly after the
    /// cursor position when one is given
    async fn fetch_page(
        &self,
        playlist_item_id: i64,
        sort: SortName,
        after: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<HighScore>, AppError>;

    async fn count(&self, playlist_item_id: i64) -> Result<u64, AppError>;

    /// Number of aggregates strictly preceding `key` under the canonical
    /// comparator; rank is this plus one
    async fn count_better(&self, playlist_item_id: i64, key: &SortKey) -> Result<u64, AppError>;

    async fn find_for_user(
        &self,
        playlist_item_id: i64,
        user_id: &str,
    ) -> Result<Option<HighScore>, AppError>;

    /// Contiguous canonical-order slice, 0-based offset
    async fn ranked_slice(
        &self,
        playlist_item_id: i64,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<HighScore>, AppError>;
}

/// In-memory implementation. The compare-and-swap in `upsert_if_better`
/// holds the map's write lock for the whole read-compare-write, which
/// serializes replacements for the same (playlist item, user) pair.
#[derive(Default)]
pub struct InMemoryHighScoreRepository {
    // playlist_item_id -> user_id -> aggregate
    items: RwLock<HashMap<i64, HashMap<String, HighScore>>>,
}

impl InMemoryHighScoreRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sorted_for_item(&self, playlist_item_id: i64, sort: SortName) -> Vec<HighScore> {
        let items = self.items.read().await;
        let mut rows: Vec<HighScore> = items
            .get(&playlist_item_id)
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| cmp_for(sort, &a.sort_key(), &b.sort_key()));
        rows
    }
}

#[async_trait]
impl HighScoreRepository for InMemoryHighScoreRepository {
    #[instrument(skip(self, candidate))]
    async fn upsert_if_better(&self, candidate: HighScore) -> Result<bool, AppError> {
        use std::collections::hash_map::Entry;

        let mut items = self.items.write().await;
        let users = items.entry(candidate.playlist_item_id).or_default();

        match users.entry(candidate.user_id.clone()) {
            Entry::Vacant(entry) => {
                debug!(
                    playlist_item_id = candidate.playlist_item_id,
                    user_id = %candidate.user_id,
                    score_id = candidate.score_id,
                    "Creating high score aggregate"
                );
                entry.insert(HighScore {
                    version: 1,
                    ..candidate
                });
                Ok(true)
            }
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if strictly_better(&candidate.sort_key(), &current.sort_key()) {
                    debug!(
                        playlist_item_id = candidate.playlist_item_id,
                        user_id = %candidate.user_id,
                        old_score_id = current.score_id,
                        new_score_id = candidate.score_id,
                        "Replacing high score aggregate"
                    );
                    let version = current.version + 1;
                    entry.insert(HighScore {
                        version,
                        ..candidate
                    });
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    #[instrument(skip(self, after))]
    async fn fetch_page(
        &self,
        playlist_item_id: i64,
        sort: SortName,
        after: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<HighScore>, AppError> {
        let rows = self.sorted_for_item(playlist_item_id, sort).await;
        Ok(rows
            .into_iter()
            .filter(|row| after.map_or(true, |cursor| cursor.is_before(row, sort)))
            .take(limit)
            .collect())
    }

    #[instrument(skip(self))]
    async fn count(&self, playlist_item_id: i64) -> Result<u64, AppError> {
        let items = self.items.read().await;
        Ok(items
            .get(&playlist_item_id)
            .map(|users| users.len() as u64)
            .unwrap_or(0))
    }

    #[instrument(skip(self, key))]
    async fn count_better(&self, playlist_item_id: i64, key: &SortKey) -> Result<u64, AppError> {
        let items = self.items.read().await;
        Ok(items
            .get(&playlist_item_id)
            .map(|users| {
                users
                    .values()
                    .filter(|row| strictly_better(&row.sort_key(), key))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn find_for_user(
        &self,
        playlist_item_id: i64,
        user_id: &str,
    ) -> Result<Option<HighScore>, AppError> {
        let items = self.items.read().await;
        Ok(items
            .get(&playlist_item_id)
            .and_then(|users| users.get(user_id))
            .cloned())
    }

    #[instrument(skip(self))]
    async fn ranked_slice(
        &self,
        playlist_item_id: i64,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<HighScore>, AppError> {
        let rows = self
            .sorted_for_item(playlist_item_id, SortName::ScoreDesc)
            .await;
        Ok(rows.into_iter().skip(offset as usize).take(limit).collect())
    }
}

/// PostgreSQL implementation. The replace-if-better condition runs inside a
/// single `INSERT .. ON CONFLICT .. DO UPDATE .. WHERE`, so the database
/// evaluates the comparator atomically per (playlist item, user) row and
/// concurrent completions cannot lose a superior score.
pub struct PostgresHighScoreRepository {
    pool: PgPool,
}

impl PostgresHighScoreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::postgres::PgRow) -> HighScore {
        HighScore {
            playlist_item_id: row.get("playlist_item_id"),
            user_id: row.get("user_id"),
            score_id: row.get("score_id"),
            total_score: row.get("total_score"),
            accuracy: row.get("accuracy"),
            version: row.get("version"),
        }
    }
}

#[async_trait]
impl HighScoreRepository for PostgresHighScoreRepository {
    #[instrument(skip(self, candidate))]
    async fn upsert_if_better(&self, candidate: HighScore) -> Result<bool, AppError> {
        // (total, accuracy, -score_id) tuple comparison implements the
        // canonical order: desc, desc, id asc
        let result = sqlx::query(
            "INSERT INTO playlist_high_scores \
             (playlist_item_id, user_id, score_id, total_score, accuracy, version) \
             VALUES ($1, $2, $3, $4, $5, 1) \
             ON CONFLICT (playlist_item_id, user_id) DO UPDATE SET \
               score_id = EXCLUDED.score_id, \
               total_score = EXCLUDED.total_score, \
               accuracy = EXCLUDED.accuracy, \
               version = playlist_high_scores.version + 1 \
             WHERE (EXCLUDED.total_score, EXCLUDED.accuracy, -EXCLUDED.score_id) > \
                   (playlist_high_scores.total_score, playlist_high_scores.accuracy, \
                    -playlist_high_scores.score_id)",
        )
        .bind(candidate.playlist_item_id)
        .bind(&candidate.user_id)
        .bind(candidate.score_id)
        .bind(candidate.total_score)
        .bind(candidate.accuracy)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to upsert high score");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, after))]
    async fn fetch_page(
        &self,
        playlist_item_id: i64,
        sort: SortName,
        after: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<HighScore>, AppError> {
        let order_by = match sort {
            SortName::ScoreDesc => "total_score DESC, accuracy DESC, score_id ASC",
            SortName::ScoreAsc => "total_score ASC, accuracy ASC, score_id DESC",
        };
        let cursor_predicate = match sort {
            SortName::ScoreDesc => {
                "(total_score < $2 OR (total_score = $2 AND accuracy < $3) \
                 OR (total_score = $2 AND accuracy = $3 AND score_id > $4))"
            }
            SortName::ScoreAsc => {
                "(total_score > $2 OR (total_score = $2 AND accuracy > $3) \
                 OR (total_score = $2 AND accuracy = $3 AND score_id < $4))"
            }
        };

        let rows = match after {
            Some(cursor) => {
                let sql = format!(
                    "SELECT * FROM playlist_high_scores \
                     WHERE playlist_item_id = $1 AND {} ORDER BY {} LIMIT $5",
                    cursor_predicate, order_by
                );
                sqlx::query(&sql)
                    .bind(playlist_item_id)
                    .bind(cursor.total_score)
                    .bind(cursor.accuracy)
                    .bind(cursor.score_id)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT * FROM playlist_high_scores \
                     WHERE playlist_item_id = $1 ORDER BY {} LIMIT $2",
                    order_by
                );
                sqlx::query(&sql)
                    .bind(playlist_item_id)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch high score page");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(rows.iter().map(Self::map_row).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self, playlist_item_id: i64) -> Result<u64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM playlist_high_scores WHERE playlist_item_id = $1",
        )
        .bind(playlist_item_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.get::<i64, _>("total") as u64)
    }

    #[instrument(skip(self, key))]
    async fn count_better(&self, playlist_item_id: i64, key: &SortKey) -> Result<u64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS better FROM playlist_high_scores \
             WHERE playlist_item_id = $1 AND \
               (total_score > $2 OR (total_score = $2 AND accuracy > $3) \
                OR (total_score = $2 AND accuracy = $3 AND score_id < $4))",
        )
        .bind(playlist_item_id)
        .bind(key.total_score)
        .bind(key.accuracy)
        .bind(key.score_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.get::<i64, _>("better") as u64)
    }

    #[instrument(skip(self))]
    async fn find_for_user(
        &self,
        playlist_item_id: i64,
        user_id: &str,
    ) -> Result<Option<HighScore>, AppError> {
        let row = sqlx::query(
            "SELECT * FROM playlist_high_scores \
             WHERE playlist_item_id = $1 AND user_id = $2",
        )
        .bind(playlist_item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.as_ref().map(Self::map_row))
    }

    #[instrument(skip(self))]
    async fn ranked_slice(
        &self,
        playlist_item_id: i64,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<HighScore>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM playlist_high_scores WHERE playlist_item_id = $1 \
             ORDER BY total_score DESC, accuracy DESC, score_id ASC \
             OFFSET $2 LIMIT $3",
        )
        .bind(playlist_item_id)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.iter().map(Self::map_row).collect())
    }
}
