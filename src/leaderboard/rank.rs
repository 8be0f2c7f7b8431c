use std::sync::Arc;

use tracing::instrument;

use super::repository::{HighScore, HighScoreRepository};
use super::sort::SortKey;
use crate::shared::AppError;

/// Computes 1-based ranks and neighbor windows over a playlist item's
/// aggregates, using the same canonical comparator the aggregator orders by.
pub struct RankCalculator {
    high_scores: Arc<dyn HighScoreRepository + Send + Sync>,
}

impl RankCalculator {
    pub fn new(high_scores: Arc<dyn HighScoreRepository + Send + Sync>) -> Self {
        Self { high_scores }
    }

    /// 1 + the number of aggregates strictly preceding `key`
    #[instrument(skip(self, key))]
    pub async fn rank(&self, playlist_item_id: i64, key: &SortKey) -> Result<u64, AppError> {
        let better = self.high_scores.count_better(playlist_item_id, key).await?;
        Ok(better + 1)
    }

    /// The contiguous ranked slice `[rank - window, rank + window]` clipped
    /// to bounds; when `rank` points at an existing aggregate the slice
    /// contains it.
    #[instrument(skip(self))]
    pub async fn neighbors(
        &self,
        playlist_item_id: i64,
        rank: u64,
        window: usize,
    ) -> Result<Vec<HighScore>, AppError> {
        let first_rank = rank.saturating_sub(window as u64).max(1);
        let last_rank = rank + window as u64;
        let offset = first_rank - 1;
        let limit = (last_rank - first_rank + 1) as usize;

        self.high_scores
            .ranked_slice(playlist_item_id, offset, limit)
            .await
    }
}
