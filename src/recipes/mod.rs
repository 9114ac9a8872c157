mod dto;
pub mod handlers;
pub mod images;
mod repo;

pub use dto::{image_name, Collection, Recipe, RecipeDocument, RecipeQuery, IMAGE_SET};
pub use repo::{MemoryRecipeStore, PgRecipeStore, RecipeStore};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
