use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use super::dates::{actual_date, week_labels};
use super::dto::{GenerationResponse, MealChoice, MealPerDate, WeekView};
use super::sync::GenerateTarget;
use crate::{error::PlannerError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/week", get(get_week))
        .route("/week/generate", post(generate_week))
        .route("/week/:slot/generate", post(generate_slot))
        .route("/week/:slot", put(set_slot))
}

/// GET /week: cached meals zipped with the labels of the planned week.
pub async fn get_week(State(state): State<AppState>) -> Json<WeekView> {
    let meals = state.week.cache().observe_all().borrow().clone();
    let today = OffsetDateTime::now_utc().date();
    let labels = week_labels(today, state.week.days());

    Json(WeekView {
        state: state.week.current_state(),
        actual_date: actual_date(today),
        days: MealPerDate::zip(meals, labels),
    })
}

#[instrument(skip(state))]
pub async fn generate_week(
    State(state): State<AppState>,
) -> Result<Json<GenerationResponse>, PlannerError> {
    let code = state.week.current_code().await?;
    let slots = state.week.generate(&code, GenerateTarget::Week).await?;
    Ok(Json(GenerationResponse { slots }))
}

#[instrument(skip(state))]
pub async fn generate_slot(
    State(state): State<AppState>,
    Path(slot): Path<usize>,
) -> Result<Json<GenerationResponse>, PlannerError> {
    let code = state.week.current_code().await?;
    let slots = state
        .week
        .change_single_meal(&code, slot, MealChoice::Auto)
        .await?;
    Ok(Json(GenerationResponse { slots }))
}

/// PUT /week/:slot { "mode": "auto" } | { "mode": "explicit", "meal": {...} }
#[instrument(skip(state, choice))]
pub async fn set_slot(
    State(state): State<AppState>,
    Path(slot): Path<usize>,
    Json(choice): Json<MealChoice>,
) -> Result<Json<GenerationResponse>, PlannerError> {
    let code = state.week.current_code().await?;
    let slots = state.week.change_single_meal(&code, slot, choice).await?;
    Ok(Json(GenerationResponse { slots }))
}
