pub mod cache;
pub mod dates;
mod dto;
pub mod handlers;
mod sync;
pub mod tree;

pub use cache::{MealCache, MemoryMealCache};
pub use dto::{Meal, MealChoice, MealPerDate, WeekPhase, WeekState};
pub use sync::{GenerateTarget, WeekSync};
pub use tree::{MemoryTreeStore, PgTreeStore, TreeStore};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
