//! End-to-end workflow tests over the full router: session issuance,
//! starting and completing plays, then reading the leaderboard back
//! through cursors and context lookups.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use playscore::catalog::models::{Build, PlaylistItem, Room};
use playscore::catalog::repository::{InMemoryBuildRepository, InMemoryCatalogRepository};
use playscore::leaderboard;
use playscore::leaderboard::repository::InMemoryHighScoreRepository;
use playscore::score;
use playscore::score::repository::InMemoryScoreRepository;
use playscore::session;
use playscore::shared::AppState;

const RANKED_HASH: &str = "0123456789abcdef0123456789abcdef";

async fn seeded_app_state() -> AppState {
    let catalog = Arc::new(InMemoryCatalogRepository::new());
    catalog
        .seed_room(Room {
            id: 1,
            name: "weekly playlist".to_string(),
            ends_at: None,
            participant_ids: vec![],
        })
        .await;
    catalog
        .seed_playlist_item(PlaylistItem {
            id: 10,
            room_id: 1,
            ruleset_id: 0,
            beatmap_id: 42,
            required_mods: vec![],
            allowed_mods: vec!["HD".to_string(), "DT".to_string()],
            max_attempts: None,
            expired: false,
        })
        .await;

    let builds = Arc::new(InMemoryBuildRepository::new());
    builds
        .seed_build(Build {
            hash: RANKED_HASH.to_string(),
            allow_ranking: true,
        })
        .await;

    AppState::new(
        catalog,
        builds,
        Arc::new(InMemoryScoreRepository::new()),
        Arc::new(InMemoryHighScoreRepository::new()),
    )
}

/// Builds the same router `main` serves
fn build_app(state: AppState) -> Router {
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
            state.clone(),
            session::jwt_auth_optional,
        ));

    let protected_routes = Router::new()
        .route(
            "/rooms/:room_id/playlist/:playlist_item_id/scores",
            post(score::start_play),
        )
        .route(
            "/rooms/:room_id/playlist/:playlist_item_id/scores/:score_id",
            put(score::complete_play),
        )
        .layer(middleware::from_fn_with_state(state.clone(), session::jwt_auth));

    Router::new()
        .route("/session", post(session::create_session))
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn open_session(app: &Router, user_id: &str) -> String {
    let (status, body) = request_json(
        app,
        "POST",
        "/session",
        None,
        Some(serde_json::json!({"user_id": user_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

/// Starts and completes one passing play, returning the score id
async fn submit_play(
    app: &Router,
    token: &str,
    total_score: i64,
    accuracy: f64,
) -> i64 {
    let (status, started) = request_json(
        app,
        "POST",
        "/rooms/1/playlist/10/scores",
        Some(token),
        Some(serde_json::json!({"version_hash": RANKED_HASH})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "start failed: {}", started);
    let score_id = started["id"].as_i64().unwrap();

    let (status, completed) = request_json(
        app,
        "PUT",
        &format!("/rooms/1/playlist/10/scores/{}", score_id),
        Some(token),
        Some(serde_json::json!({
            "rank": "S",
            "total_score": total_score,
            "accuracy": accuracy,
            "max_combo": 300,
            "passed": true,
            "mods": [{"acronym": "HD"}],
            "statistics": {"great": 300, "miss": 2}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "complete failed: {}", completed);
    assert_eq!(completed["state"], "completed");

    score_id
}

#[tokio::test]
async fn full_playlist_score_workflow() {
    let app = build_app(seeded_app_state().await);

    let token_a = open_session(&app, "player-a").await;
    let token_b = open_session(&app, "player-b").await;

    let score_a = submit_play(&app, &token_a, 900_000, 0.95).await;
    submit_play(&app, &token_b, 950_000, 0.91).await;

    // default listing: B before A, total 2
    let (status, listing) =
        request_json(&app, "GET", "/rooms/1/playlist/10/scores", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 2);
    assert_eq!(listing["scores"][0]["user_id"], "player-b");
    assert_eq!(listing["scores"][1]["user_id"], "player-a");
    assert!(listing["cursor"].is_null());
    assert_eq!(listing["params"]["sort"], "score_desc");

    // A's score sits at rank 2 with B above it
    let (status, shown) = request_json(
        &app,
        "GET",
        &format!("/rooms/1/playlist/10/scores/{}", score_a),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shown["position"], 2);
    assert_eq!(shown["scores_around"]["higher"][0]["user_id"], "player-b");
    assert!(shown["scores_around"]["lower"].as_array().unwrap().is_empty());

    // user lookup mirrors it
    let (status, user_score) = request_json(
        &app,
        "GET",
        "/rooms/1/playlist/10/users/player-a/scores",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user_score["position"], 2);
}

#[tokio::test]
async fn limit_one_cursor_walk_returns_each_row_once() {
    let app = build_app(seeded_app_state().await);

    let token_a = open_session(&app, "player-a").await;
    let token_b = open_session(&app, "player-b").await;
    submit_play(&app, &token_a, 900_000, 0.95).await;
    submit_play(&app, &token_b, 950_000, 0.91).await;

    let (status, first) =
        request_json(&app, "GET", "/rooms/1/playlist/10/scores?limit=1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["scores"].as_array().unwrap().len(), 1);
    assert_eq!(first["scores"][0]["user_id"], "player-b");
    let cursor = first["cursor"].as_str().expect("more pages expected");

    let (status, second) = request_json(
        &app,
        "GET",
        &format!("/rooms/1/playlist/10/scores?limit=1&cursor={}", cursor),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["scores"][0]["user_id"], "player-a");
    assert!(second["cursor"].is_null());
}

#[tokio::test]
async fn retried_submission_keeps_the_best_aggregate() {
    let app = build_app(seeded_app_state().await);
    let token = open_session(&app, "player-a").await;

    submit_play(&app, &token, 900_000, 0.95).await;
    // a later, worse play does not displace the aggregate
    submit_play(&app, &token, 850_000, 0.99).await;

    let (status, listing) =
        request_json(&app, "GET", "/rooms/1/playlist/10/scores", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["scores"][0]["total_score"], 900_000);
}

#[tokio::test]
async fn completing_a_score_twice_is_rejected() {
    let app = build_app(seeded_app_state().await);
    let token = open_session(&app, "player-a").await;
    let score_id = submit_play(&app, &token, 900_000, 0.95).await;

    let (status, body) = request_json(
        &app,
        "PUT",
        &format!("/rooms/1/playlist/10/scores/{}", score_id),
        Some(&token),
        Some(serde_json::json!({
            "total_score": 999_999,
            "accuracy": 1.0,
            "max_combo": 400,
            "passed": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Score has already been submitted");

    // aggregate untouched
    let (_, listing) =
        request_json(&app, "GET", "/rooms/1/playlist/10/scores", None, None).await;
    assert_eq!(listing["scores"][0]["total_score"], 900_000);
}

#[tokio::test]
async fn disallowed_mods_fail_the_play() {
    let app = build_app(seeded_app_state().await);
    let token = open_session(&app, "player-a").await;

    let (status, started) = request_json(
        &app,
        "POST",
        "/rooms/1/playlist/10/scores",
        Some(&token),
        Some(serde_json::json!({"version_hash": RANKED_HASH})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let score_id = started["id"].as_i64().unwrap();

    // HR is legal for the ruleset but not in the item's allowed list
    let (status, body) = request_json(
        &app,
        "PUT",
        &format!("/rooms/1/playlist/10/scores/{}", score_id),
        Some(&token),
        Some(serde_json::json!({
            "total_score": 900_000,
            "accuracy": 0.95,
            "max_combo": 300,
            "passed": true,
            "mods": [{"acronym": "HR"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("not allowed on this playlist item"));

    // the failed play never reaches the leaderboard
    let (_, listing) =
        request_json(&app, "GET", "/rooms/1/playlist/10/scores", None, None).await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn anonymous_callers_cannot_start_plays() {
    let app = build_app(seeded_app_state().await);

    let (status, _) = request_json(
        &app,
        "POST",
        "/rooms/1/playlist/10/scores",
        None,
        Some(serde_json::json!({"version_hash": RANKED_HASH})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authenticated_listing_includes_user_score() {
    let app = build_app(seeded_app_state().await);
    let token_a = open_session(&app, "player-a").await;
    let token_b = open_session(&app, "player-b").await;
    submit_play(&app, &token_a, 900_000, 0.95).await;
    submit_play(&app, &token_b, 950_000, 0.91).await;

    let (status, listing) = request_json(
        &app,
        "GET",
        "/rooms/1/playlist/10/scores",
        Some(&token_a),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["user_score"]["user_id"], "player-a");
    assert_eq!(listing["user_score"]["total_score"], 900_000);
}

#[tokio::test]
async fn unknown_resources_return_not_found() {
    let app = build_app(seeded_app_state().await);

    let (status, body) =
        request_json(&app, "GET", "/rooms/9/playlist/10/scores", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid room id");

    let (status, body) =
        request_json(&app, "GET", "/rooms/1/playlist/99/scores", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid playlist id");

    let (status, _) = request_json(
        &app,
        "GET",
        "/rooms/1/playlist/10/users/ghost/scores",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
