use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::repository::HighScore;
use super::sort::{cmp_for, SortKey, SortName};
use crate::shared::AppError;

/// Decoded pagination cursor: the sort-key tuple values of the last row of
/// the previous page, plus the sort it was produced under. Pagination state
/// is entirely reconstructible from this; no server-side session exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub sort: String,
    pub total_score: i64,
    pub accuracy: f64,
    pub score_id: i64,
}

impl Cursor {
    pub fn sort_key(&self) -> SortKey {
        SortKey {
            total_score: self.total_score,
            accuracy: self.accuracy,
            score_id: self.score_id,
        }
    }

    /// True if `row` comes strictly after this cursor's position under the
    /// given sort, i.e. belongs to the next page.
    pub fn is_before(&self, row: &HighScore, sort: SortName) -> bool {
        cmp_for(sort, &row.sort_key(), &self.sort_key()) == std::cmp::Ordering::Greater
    }
}

/// Encodes the last row of a page into an opaque resumable token
pub fn encode(sort: SortName, last_row: &HighScore) -> Result<String, AppError> {
    let cursor = Cursor {
        sort: sort.to_string(),
        total_score: last_row.total_score,
        accuracy: last_row.accuracy,
        score_id: last_row.score_id,
    };

    let payload = serde_json::to_vec(&cursor).map_err(|_| AppError::Internal)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(payload))
}

/// Decodes an opaque cursor token. Any malformed or tampered token, and any
/// token produced under a different sort, is rejected with `InvalidCursor`.
pub fn decode(token: &str, sort: SortName) -> Result<Cursor, AppError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| AppError::InvalidCursor("malformed cursor".to_string()))?;

    let cursor: Cursor = serde_json::from_slice(&bytes)
        .map_err(|_| AppError::InvalidCursor("malformed cursor".to_string()))?;

    if cursor.sort != sort.to_string() {
        return Err(AppError::InvalidCursor(
            "cursor does not match requested sort".to_string(),
        ));
    }

    Ok(cursor)
}
