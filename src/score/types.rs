use serde::{Deserialize, Serialize};

use crate::mods::GameplayMod;

/// Request payload for starting a play
///
/// `version_hash` identifies the submitting client build; required for
/// non-admin callers.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StartPlayRequest {
    pub version_hash: Option<String>,
}

/// Request payload for completing a play
#[derive(Debug, Deserialize, Serialize)]
pub struct CompletePlayRequest {
    pub rank: Option<String>,
    pub total_score: i64,
    pub accuracy: f64,
    pub max_combo: i32,
    pub passed: bool,
    #[serde(default)]
    pub mods: Vec<GameplayMod>,
    #[serde(default)]
    pub statistics: serde_json::Value,
}
