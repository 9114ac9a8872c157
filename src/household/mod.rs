mod code;
pub mod handlers;
mod prefs;

pub use code::HouseholdCode;
pub use prefs::{JsonPreferences, Preferences, HOUSEHOLD_CODE_KEY, IS_LOGGED_KEY};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
