mod catalog;
mod leaderboard;
mod mods;
mod score;
mod session;
mod shared;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use catalog::models::{Build, PlaylistItem, Room};
use catalog::repository::{InMemoryBuildRepository, InMemoryCatalogRepository};
use leaderboard::repository::InMemoryHighScoreRepository;
use score::repository::InMemoryScoreRepository;
use shared::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playscore=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting playlist score server");

    // Create shared application state with dependency injection
    // Easy to switch between implementations:
    let catalog_repository = Arc::new(InMemoryCatalogRepository::new());
    let build_repository = Arc::new(InMemoryBuildRepository::new());
    let score_repository = Arc::new(InMemoryScoreRepository::new());
    let high_score_repository = Arc::new(InMemoryHighScoreRepository::new());

    // For production with PostgreSQL:
    // let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    // let pool = sqlx::PgPool::connect(&database_url).await.expect("Failed to connect to database");
    // let catalog_repository = Arc::new(catalog::repository::PostgresCatalogRepository::new(pool.clone()));
    // let build_repository = Arc::new(catalog::repository::PostgresBuildRepository::new(pool.clone()));
    // let score_repository = Arc::new(score::repository::PostgresScoreRepository::new(pool.clone()));
    // let high_score_repository = Arc::new(leaderboard::repository::PostgresHighScoreRepository::new(pool));

    // Development seed: one open room with a single playlist item, and one
    // allow-listed ranked build taken from the environment when provided.
    catalog_repository
        .seed_room(Room {
            id: 1,
            name: "dev room".to_string(),
            ends_at: None,
            participant_ids: vec![],
        })
        .await;
    catalog_repository
        .seed_playlist_item(PlaylistItem {
            id: 1,
            room_id: 1,
            ruleset_id: 0,
            beatmap_id: 1,
            required_mods: vec![],
            allowed_mods: vec![],
            max_attempts: None,
            expired: false,
        })
        .await;
    if let Ok(hash) = std::env::var("RANKED_BUILD_HASH") {
        let hash = catalog::models::normalize_version_hash(&hash);
        info!(hash = %hash, "Seeding allow-listed ranked build");
        build_repository
            .seed_build(Build {
                hash,
                allow_ranking: true,
            })
            .await;
    }

    let app_state = AppState::new(
        catalog_repository,
        build_repository,
        score_repository,
        high_score_repository,
    );

    // Public leaderboard reads: auth optional, only used to attach the
    // caller's own score to listings
    let public_routes = Router::new()
        .route(
            "/rooms/:room_id/playlist/:playlist_item_id/scores",
            get(leaderboard::list_scores),
        )
        .route(
            "/rooms/:room_id/playlist/:playlist_item_id/scores/:score_id",
            get(leaderboard::show_score),
        )
        .route(
            "/rooms/:room_id/playlist/:playlist_item_id/users/:user_id/scores",
            get(leaderboard::show_user_high_score),
        )
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            session::jwt_auth_optional,
        ));

    // Play lifecycle: auth required
    let protected_routes = Router::new()
        .route(
            "/rooms/:room_id/playlist/:playlist_item_id/scores",
            post(score::start_play),
        )
        .route(
            "/rooms/:room_id/playlist/:playlist_item_id/scores/:score_id",
            put(score::complete_play),
        )
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            session::jwt_auth,
        ));

    let app = Router::new()
        .route("/", get(|| async { "playlist score service" }))
        .route("/session", post(session::create_session))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // run our app with hyper, listening globally on port 3000
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("Server running on http://localhost:3000");
    axum::serve(listener, app).await.unwrap();
}
