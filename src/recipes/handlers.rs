use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument};

use super::dto::{
    Collection, CreatedRecipeResponse, Recipe, RecipeDocument, RecipeQuery, UploadImageRequest,
    UploadedImageResponse,
};
use super::images::upload_recipe_image;
use crate::{error::PlannerError, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes))
        .route("/recipes/:collection/:key", get(get_recipe))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", post(add_recipe))
        .route(
            "/recipes/images",
            post(upload_image).layer(DefaultBodyLimit::max(10 * 1024 * 1024)),
        )
}

/// GET /recipes?collection=mains&limit=20&offset=0&prefix=Pa
///
/// Reads go straight to the store. The generator cache is only consulted or
/// warmed when no generation holds it.
#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    Query(q): Query<RecipeQuery>,
) -> Result<Json<Vec<RecipeDocument>>, PlannerError> {
    let docs = state.recipes.query(&q).await?;
    if let Ok(mut generator) = state.generator.try_lock() {
        generator.warm(q.collection, &docs);
    }
    Ok(Json(docs))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    Path((collection, key)): Path<(Collection, u64)>,
) -> Result<Json<RecipeDocument>, PlannerError> {
    let cached = state
        .generator
        .try_lock()
        .ok()
        .and_then(|g| g.cached(collection, key));
    let doc = match cached {
        Some(recipe) => RecipeDocument { id: key, recipe },
        None => {
            let recipe = state
                .recipes
                .get(collection, key)
                .await?
                .ok_or(PlannerError::RecipeNotFound { collection, key })?;
            let doc = RecipeDocument { id: key, recipe };
            if let Ok(mut generator) = state.generator.try_lock() {
                generator.warm(collection, std::iter::once(&doc));
            }
            doc
        }
    };
    Ok(Json(doc))
}

#[instrument(skip(state, recipe), fields(title = %recipe.title))]
pub async fn add_recipe(
    State(state): State<AppState>,
    Json(recipe): Json<Recipe>,
) -> Result<(StatusCode, HeaderMap, Json<CreatedRecipeResponse>), PlannerError> {
    let (collection, id) = state.generator.lock().await.add(recipe).await?;

    let mut headers = HeaderMap::new();
    let location = format!("/api/v1/recipes/{}/{}", collection.slug(), id);
    if let Ok(value) = HeaderValue::from_str(&location) {
        headers.insert(header::LOCATION, value);
    }

    Ok((
        StatusCode::CREATED,
        headers,
        Json(CreatedRecipeResponse { collection, id }),
    ))
}

/// POST /recipes/images { image: [bytes], content_type?: "image/jpeg" }
#[instrument(skip(state, body))]
pub async fn upload_image(
    State(state): State<AppState>,
    Json(body): Json<UploadImageRequest>,
) -> Result<(StatusCode, Json<UploadedImageResponse>), PlannerError> {
    if body.image.is_empty() {
        return Err(PlannerError::InvalidRecipe("image is empty".into()));
    }
    let ct = body
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");

    let uploaded =
        upload_recipe_image(state.storage.as_ref(), Bytes::from(body.image.into_vec()), ct).await?;
    info!(key = %uploaded.key, "image stored");

    Ok((
        StatusCode::CREATED,
        Json(UploadedImageResponse {
            key: uploaded.key,
            url: uploaded.url,
        }),
    ))
}
