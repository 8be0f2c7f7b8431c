use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::models::{Build, PlaylistItem, Room};
use crate::shared::AppError;

/// Read access to the externally-owned room/playlist catalog
#[async_trait]
pub trait CatalogRepository {
    async fn get_room(&self, room_id: i64) -> Result<Option<Room>, AppError>;
    async fn get_playlist_item(
        &self,
        room_id: i64,
        playlist_item_id: i64,
    ) -> Result<Option<PlaylistItem>, AppError>;
}

/// Read access to the externally-owned client build allow-list
#[async_trait]
pub trait BuildRepository {
    /// Looks up a build by its normalized 32-hex hash; only builds with
    /// `allow_ranking` set are returned.
    async fn find_ranked(&self, hash: &str) -> Result<Option<Build>, AppError>;
}

/// In-memory catalog for development and testing, seeded explicitly
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    rooms: RwLock<HashMap<i64, Room>>,
    playlist_items: RwLock<HashMap<i64, PlaylistItem>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_room(&self, room: Room) {
        self.rooms.write().await.insert(room.id, room);
    }

    pub async fn seed_playlist_item(&self, item: PlaylistItem) {
        self.playlist_items.write().await.insert(item.id, item);
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    #[instrument(skip(self))]
    async fn get_room(&self, room_id: i64) -> Result<Option<Room>, AppError> {
        Ok(self.rooms.read().await.get(&room_id).cloned())
    }

    #[instrument(skip(self))]
    async fn get_playlist_item(
        &self,
        room_id: i64,
        playlist_item_id: i64,
    ) -> Result<Option<PlaylistItem>, AppError> {
        let items = self.playlist_items.read().await;
        Ok(items
            .get(&playlist_item_id)
            .filter(|item| item.room_id == room_id)
            .cloned())
    }
}

/// In-memory build allow-list, seeded explicitly
#[derive(Default)]
pub struct InMemoryBuildRepository {
    builds: RwLock<HashMap<String, Build>>,
}

impl InMemoryBuildRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_build(&self, build: Build) {
        self.builds.write().await.insert(build.hash.clone(), build);
    }
}

#[async_trait]
impl BuildRepository for InMemoryBuildRepository {
    #[instrument(skip(self))]
    async fn find_ranked(&self, hash: &str) -> Result<Option<Build>, AppError> {
        let builds = self.builds.read().await;
        Ok(builds
            .get(hash)
            .filter(|build| build.allow_ranking)
            .cloned())
    }
}

/// PostgreSQL implementation of the catalog lookups
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    #[instrument(skip(self))]
    async fn get_room(&self, room_id: i64) -> Result<Option<Room>, AppError> {
        debug!(room_id, "Fetching room from database");

        let row = sqlx::query(
            "SELECT id, name, ends_at, participant_ids FROM rooms WHERE id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, room_id, "Failed to fetch room from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.map(|row| Room {
            id: row.get("id"),
            name: row.get("name"),
            ends_at: row.get("ends_at"),
            participant_ids: row.get("participant_ids"),
        }))
    }

    #[instrument(skip(self))]
    async fn get_playlist_item(
        &self,
        room_id: i64,
        playlist_item_id: i64,
    ) -> Result<Option<PlaylistItem>, AppError> {
        debug!(room_id, playlist_item_id, "Fetching playlist item from database");

        let row = sqlx::query(
            "SELECT id, room_id, ruleset_id, beatmap_id, required_mods, allowed_mods, \
             max_attempts, expired \
             FROM playlist_items WHERE id = $1 AND room_id = $2",
        )
        .bind(playlist_item_id)
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, playlist_item_id, "Failed to fetch playlist item from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.map(|row| PlaylistItem {
            id: row.get("id"),
            room_id: row.get("room_id"),
            ruleset_id: row.get("ruleset_id"),
            beatmap_id: row.get("beatmap_id"),
            required_mods: row.get("required_mods"),
            allowed_mods: row.get("allowed_mods"),
            max_attempts: row.get::<Option<i32>, _>("max_attempts").map(|n| n as u32),
            expired: row.get("expired"),
        }))
    }
}

/// PostgreSQL implementation of the build allow-list lookup
pub struct PostgresBuildRepository {
    pool: PgPool,
}

impl PostgresBuildRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildRepository for PostgresBuildRepository {
    #[instrument(skip(self))]
    async fn find_ranked(&self, hash: &str) -> Result<Option<Build>, AppError> {
        debug!(hash, "Looking up ranked build");

        let row = sqlx::query(
            "SELECT hash, allow_ranking FROM builds WHERE hash = $1 AND allow_ranking = TRUE",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch build from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.map(|row| Build {
            hash: row.get("hash"),
            allow_ranking: row.get("allow_ranking"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_room(id: i64) -> Room {
        Room {
            id,
            name: format!("room-{}", id),
            ends_at: None,
            participant_ids: vec![],
        }
    }

    fn item(id: i64, room_id: i64) -> PlaylistItem {
        PlaylistItem {
            id,
            room_id,
            ruleset_id: 0,
            beatmap_id: 1,
            required_mods: vec![],
            allowed_mods: vec![],
            max_attempts: None,
            expired: false,
        }
    }

    #[tokio::test]
    async fn playlist_item_lookup_is_scoped_to_room() {
        let repo = InMemoryCatalogRepository::new();
        repo.seed_room(open_room(1)).await;
        repo.seed_room(open_room(2)).await;
        repo.seed_playlist_item(item(10, 1)).await;

        assert!(repo.get_playlist_item(1, 10).await.unwrap().is_some());
        // item 10 belongs to room 1, not room 2
        assert!(repo.get_playlist_item(2, 10).await.unwrap().is_none());
        assert!(repo.get_playlist_item(1, 99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_ranked_ignores_non_ranking_builds() {
        let repo = InMemoryBuildRepository::new();
        repo.seed_build(Build {
            hash: "a".repeat(32),
            allow_ranking: true,
        })
        .await;
        repo.seed_build(Build {
            hash: "b".repeat(32),
            allow_ranking: false,
        })
        .await;

        assert!(repo.find_ranked(&"a".repeat(32)).await.unwrap().is_some());
        assert!(repo.find_ranked(&"b".repeat(32)).await.unwrap().is_none());
        assert!(repo.find_ranked(&"c".repeat(32)).await.unwrap().is_none());
    }
}
