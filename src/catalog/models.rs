use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::mods::ModSet;
use crate::shared::AppError;

/// A multiplayer room. Owned externally; this service only reads it to decide
/// whether plays may be started against its playlist.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub ends_at: Option<DateTime<Utc>>,
    /// Empty list means the room is open to everyone
    pub participant_ids: Vec<String>,
}

impl Room {
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|ends_at| ends_at <= now)
    }

    pub fn can_be_played_by(&self, user_id: &str) -> bool {
        self.participant_ids.is_empty() || self.participant_ids.iter().any(|p| p == user_id)
    }
}

/// One map+ruleset slot within a room's playlist. Immutable once plays exist
/// against it, except for the administrative `expired` flag.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: i64,
    pub room_id: i64,
    pub ruleset_id: i16,
    pub beatmap_id: i64,
    /// Mods every play must include
    pub required_mods: Vec<String>,
    /// Extra mods a play may include; empty means no extras beyond required
    pub allowed_mods: Vec<String>,
    pub max_attempts: Option<u32>,
    pub expired: bool,
}

impl PlaylistItem {
    /// Checks an already-normalized mod set against this item's constraints.
    pub fn assert_mods_allowed(&self, mods: &ModSet) -> Result<(), AppError> {
        for required in &self.required_mods {
            if !mods.contains(required) {
                return Err(AppError::invariant(format!(
                    "missing required mod: {}",
                    required
                )));
            }
        }

        for submitted in mods.acronyms() {
            let is_required = self.required_mods.iter().any(|m| m == submitted);
            let is_allowed = self.allowed_mods.iter().any(|m| m == submitted);
            if !is_required && !is_allowed {
                return Err(AppError::invariant(format!(
                    "mod {} is not allowed on this playlist item",
                    submitted
                )));
            }
        }

        Ok(())
    }
}

/// Entry in the externally maintained client build allow-list
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Build {
    /// 32-hex-character digest of the client binary
    pub hash: String,
    pub allow_ranking: bool,
}

/// Normalizes a submitted client version hash for allow-list lookup.
///
/// Accepts either the 32-hex digest form directly or a raw value, which gets
/// MD5-digested first (legacy path for clients without access to the
/// underlying binary to hash).
pub fn normalize_version_hash(raw: &str) -> String {
    let already_digest = raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit());
    if already_digest {
        raw.to_ascii_lowercase()
    } else {
        hex::encode(Md5::digest(raw.as_bytes()))
    }
}
