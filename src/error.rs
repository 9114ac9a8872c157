use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::recipes::Collection;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("recipe catalog is empty")]
    EmptyCatalog,

    #[error("every main recipe is already on the menu ({avoided} avoided)")]
    CatalogExhausted { avoided: usize },

    #[error("recipe {key} not found in {collection}")]
    RecipeNotFound { collection: Collection, key: u64 },

    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("invalid household code")]
    InvalidHouseholdCode,

    #[error("no household code configured")]
    NoHousehold,

    #[error("slot {slot} is outside the {days}-day week")]
    SlotOutOfRange { slot: usize, days: usize },

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub type PlannerResult<T> = Result<T, PlannerError>;

impl IntoResponse for PlannerError {
    fn into_response(self) -> Response {
        let status = match self {
            PlannerError::InvalidRecipe(_)
            | PlannerError::InvalidHouseholdCode
            | PlannerError::SlotOutOfRange { .. } => StatusCode::BAD_REQUEST,
            PlannerError::RecipeNotFound { .. } => StatusCode::NOT_FOUND,
            PlannerError::EmptyCatalog
            | PlannerError::CatalogExhausted { .. }
            | PlannerError::NoHousehold => StatusCode::CONFLICT,
            PlannerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_statuses() {
        let cases = [
            (PlannerError::EmptyCatalog, StatusCode::CONFLICT),
            (PlannerError::InvalidHouseholdCode, StatusCode::BAD_REQUEST),
            (
                PlannerError::RecipeNotFound {
                    collection: Collection::Mains,
                    key: 3,
                },
                StatusCode::NOT_FOUND,
            ),
            (
                PlannerError::Store(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
