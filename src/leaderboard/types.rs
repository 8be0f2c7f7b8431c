use serde::{Deserialize, Serialize};

use crate::score::models::Score;

/// Query parameters for the leaderboard listing
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub cursor: Option<String>,
}

/// The effective parameters a page was produced under, echoed back after
/// clamping and sort-name fallback
#[derive(Debug, Serialize, Deserialize)]
pub struct ListParams {
    pub limit: usize,
    pub sort: String,
}

/// Response shape for the leaderboard listing
#[derive(Debug, Serialize, Deserialize)]
pub struct ScoresResponse {
    /// Token resuming after the last row of this page; None on the last page
    pub cursor: Option<String>,
    pub params: ListParams,
    pub scores: Vec<Score>,
    /// Unpaginated aggregate count; may lag the page under concurrent writes
    pub total: u64,
    pub user_score: Option<Score>,
}

/// Ranked neighbors surrounding a score
#[derive(Debug, Serialize, Deserialize)]
pub struct ScoresAround {
    pub higher: Vec<Score>,
    pub lower: Vec<Score>,
}

/// A score annotated with its leaderboard context
#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreWithPosition {
    #[serde(flatten)]
    pub score: Score,
    pub position: u64,
    pub scores_around: ScoresAround,
}
