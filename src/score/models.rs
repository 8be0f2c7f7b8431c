use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::mods::ModSet;

/// Lifecycle state of a play. `Started` is the only non-terminal state and
/// no transition ever leaves a terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreState {
    Started,
    Completed,
    Failed,
}

impl ScoreState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScoreState::Completed | ScoreState::Failed)
    }
}

/// One user's attempt against a playlist item.
///
/// Created through `ScoreService::start_play` and written once more when the
/// play reaches a terminal state; `ended_at` is set if and only if the state
/// is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub id: i64,
    pub user_id: String,
    pub room_id: i64,
    pub playlist_item_id: i64,
    pub state: ScoreState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_score: i64,
    pub accuracy: f64,
    pub max_combo: i32,
    pub passed: bool,
    pub rank_grade: Option<String>,
    pub mods: ModSet,
    pub statistics: serde_json::Value,
    pub build_hash: Option<String>,
}

/// Fields needed to insert a fresh `started` score row; the repository
/// assigns the id.
#[derive(Debug, Clone)]
pub struct NewScore {
    pub user_id: String,
    pub room_id: i64,
    pub playlist_item_id: i64,
    pub started_at: DateTime<Utc>,
    pub build_hash: Option<String>,
}
