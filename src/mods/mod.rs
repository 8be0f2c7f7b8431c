use serde::{Deserialize, Serialize};

use crate::shared::AppError;

/// A single gameplay modifier as submitted by a client: an acronym plus an
/// optional free-form settings payload (e.g. {"speed_change": 1.5}).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameplayMod {
    pub acronym: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
}

impl GameplayMod {
    pub fn new(acronym: &str) -> Self {
        Self {
            acronym: acronym.to_string(),
            settings: serde_json::Value::Null,
        }
    }
}

/// Mods legal for every ruleset
const COMMON_MODS: &[&str] = &[
    "EZ", "NF", "HT", "HR", "SD", "PF", "DT", "NC", "HD", "FL",
];

/// Ruleset-specific additions, keyed by ruleset id
const STANDARD_MODS: &[&str] = &["SO", "TD"];
const MANIA_MODS: &[&str] = &["FI", "MR"];

/// Groups of mutually exclusive mods; at most one per group may be selected
const EXCLUSIVE_GROUPS: &[&[&str]] = &[
    &["DT", "NC", "HT"],
    &["EZ", "HR"],
    &["NF", "SD", "PF"],
];

fn is_legal(acronym: &str, ruleset_id: i16) -> Option<bool> {
    let extra: &[&str] = match ruleset_id {
        0 => STANDARD_MODS,
        1 | 2 => &[],
        3 => MANIA_MODS,
        _ => return None,
    };
    Some(COMMON_MODS.contains(&acronym) || extra.contains(&acronym))
}

/// Canonical, order-independent set of validated gameplay mods.
///
/// Two semantically identical submissions always produce the same `ModSet`
/// (and therefore the same serialized form): acronyms are upper-cased,
/// duplicates rejected, and the set is sorted by acronym.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModSet(Vec<GameplayMod>);

impl ModSet {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Validates raw client mods against a ruleset and normalizes them.
    ///
    /// Rejects unknown rulesets, mods not legal for the ruleset, duplicate
    /// acronyms and mutually exclusive combinations. Pure function; every
    /// failure is an `InvariantViolation` with a caller-facing message.
    pub fn normalize(raw: &[GameplayMod], ruleset_id: i16) -> Result<Self, AppError> {
        let mut mods: Vec<GameplayMod> = Vec::with_capacity(raw.len());

        for submitted in raw {
            let acronym = submitted.acronym.to_ascii_uppercase();

            match is_legal(&acronym, ruleset_id) {
                None => {
                    return Err(AppError::invariant(format!(
                        "unknown ruleset: {}",
                        ruleset_id
                    )))
                }
                Some(false) => {
                    return Err(AppError::invariant(format!(
                        "mod {} is not valid for ruleset {}",
                        acronym, ruleset_id
                    )))
                }
                Some(true) => {}
            }

            if mods.iter().any(|m| m.acronym == acronym) {
                return Err(AppError::invariant(format!(
                    "mod {} was specified more than once",
                    acronym
                )));
            }

            mods.push(GameplayMod {
                acronym,
                settings: submitted.settings.clone(),
            });
        }

        for group in EXCLUSIVE_GROUPS {
            let selected: Vec<&str> = mods
                .iter()
                .map(|m| m.acronym.as_str())
                .filter(|a| group.contains(a))
                .collect();
            if selected.len() > 1 {
                return Err(AppError::invariant(format!(
                    "incompatible mods: {}",
                    selected.join(", ")
                )));
            }
        }

        mods.sort_by(|a, b| a.acronym.cmp(&b.acronym));

        Ok(Self(mods))
    }

    pub fn contains(&self, acronym: &str) -> bool {
        self.0.iter().any(|m| m.acronym == acronym)
    }

    pub fn acronyms(&self) -> Vec<&str> {
        self.0.iter().map(|m| m.acronym.as_str()).collect()
    }

    pub fn as_slice(&self) -> &[GameplayMod] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
