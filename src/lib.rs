// Library crate for the playlist score service
// This file exposes the public API for integration tests

pub mod catalog;
pub mod leaderboard;
pub mod mods;
pub mod score;
pub mod session;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use catalog::{Build, PlaylistItem, Room};
pub use leaderboard::{HighScore, LeaderboardService, RankCalculator, SortName};
pub use mods::{GameplayMod, ModSet};
pub use score::{Score, ScoreService, ScoreState};
pub use session::{SessionClaims, TokenConfig};
pub use shared::{AppError, AppState};
