pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod types;

pub use handlers::{complete_play, start_play};
pub use models::{Score, ScoreState};
pub use repository::{InMemoryScoreRepository, ScoreRepository};
pub use service::ScoreService;
