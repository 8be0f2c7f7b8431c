pub mod models;
pub mod repository;

pub use models::{Build, PlaylistItem, Room};
pub use repository::{
    BuildRepository, CatalogRepository, InMemoryBuildRepository, InMemoryCatalogRepository,
};
