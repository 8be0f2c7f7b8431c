pub mod cursor;
pub mod handlers;
pub mod rank;
pub mod repository;
pub mod service;
pub mod sort;
pub mod types;

pub use handlers::{list_scores, show_score, show_user_high_score};
pub use rank::RankCalculator;
pub use repository::{HighScore, HighScoreRepository, InMemoryHighScoreRepository};
pub use service::LeaderboardService;
pub use sort::SortName;
