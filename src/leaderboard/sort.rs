use std::cmp::Ordering;

use strum_macros::{Display, EnumString};

use crate::score::models::Score;

/// Named leaderboard sort orders. Unrecognized names fall back to the
/// default (`score_desc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SortName {
    ScoreAsc,
    ScoreDesc,
}

impl SortName {
    pub const DEFAULT: SortName = SortName::ScoreDesc;

    pub fn from_param(param: Option<&str>) -> SortName {
        param
            .and_then(|p| p.parse().ok())
            .unwrap_or(SortName::DEFAULT)
    }
}

/// The sort-key tuple a leaderboard row is ordered by. The trailing
/// `score_id` is unique per row, making every ordering total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortKey {
    pub total_score: i64,
    pub accuracy: f64,
    pub score_id: i64,
}

impl From<&Score> for SortKey {
    fn from(score: &Score) -> Self {
        SortKey {
            total_score: score.total_score,
            accuracy: score.accuracy,
            score_id: score.id,
        }
    }
}

/// Canonical "better-than" ordering used by the aggregator and the rank
/// calculator: total score descending, accuracy descending, score id
/// ascending (earliest attempt wins ties). `Less` means `a` ranks ahead
/// of `b`.
pub fn cmp_canonical(a: &SortKey, b: &SortKey) -> Ordering {
    b.total_score
        .cmp(&a.total_score)
        .then_with(|| b.accuracy.total_cmp(&a.accuracy))
        .then_with(|| a.score_id.cmp(&b.score_id))
}

/// True if `a` strictly beats `b` under the canonical comparator
pub fn strictly_better(a: &SortKey, b: &SortKey) -> bool {
    cmp_canonical(a, b) == Ordering::Less
}

/// Ordering for a requested listing sort. `score_desc` is the canonical
/// order; `score_asc` is its exact reversal, so both stay total.
pub fn cmp_for(sort: SortName, a: &SortKey, b: &SortKey) -> Ordering {
    match sort {
        SortName::ScoreDesc => cmp_canonical(a, b),
        SortName::ScoreAsc => cmp_canonical(b, a),
    }
}
