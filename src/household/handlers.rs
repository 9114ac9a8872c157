use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::code::HouseholdCode;
use super::prefs::IS_LOGGED_KEY;
use crate::{error::PlannerError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/household", get(get_household).put(join_household))
}

#[derive(Debug, Serialize)]
pub struct HouseholdResponse {
    pub code: Option<HouseholdCode>,
    pub joined: bool,
}

#[derive(Debug, Deserialize)]
pub struct JoinHouseholdRequest {
    pub code: String,
}

pub async fn get_household(
    State(state): State<AppState>,
) -> Result<Json<HouseholdResponse>, PlannerError> {
    let code = match state.week.current_code().await {
        Ok(code) => Some(code),
        Err(PlannerError::NoHousehold) => None,
        Err(e) => return Err(e),
    };
    let joined = state.prefs.get_bool(IS_LOGGED_KEY).await?;
    Ok(Json(HouseholdResponse { code, joined }))
}

/// PUT /household { "code": "ABC1" }: switches household and resubscribes.
#[instrument(skip(state, body))]
pub async fn join_household(
    State(state): State<AppState>,
    Json(body): Json<JoinHouseholdRequest>,
) -> Result<Json<HouseholdResponse>, PlannerError> {
    let code = state.week.updating_with_a_new_code(&body.code).await?;
    Ok(Json(HouseholdResponse {
        code: Some(code),
        joined: true,
    }))
}
