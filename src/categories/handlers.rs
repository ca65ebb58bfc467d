use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CategoryResponse, CreateCategoryRequest, UpdateCategoryRequest};
use super::repo::{self, Category};
use crate::{auth::extractors::CurrentUser, error::ApiError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories", post(create_category))
        .route("/categories/:id", get(get_category))
        .route("/categories/:id", put(update_category))
        .route("/categories/:id", delete(delete_category))
}

fn to_response(c: Category) -> CategoryResponse {
    CategoryResponse {
        id: c.id,
        name: c.name,
        description: c.description,
        created_at: c.created_at,
        item_count: c.item_count,
    }
}

fn validate_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    Ok(name)
}

#[instrument(skip_all)]
pub async fn list_categories(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let rows = repo::list_all(&state.db).await?;
    Ok(Json(rows.into_iter().map(to_response).collect()))
}

#[instrument(skip(state, _user))]
pub async fn get_category(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CategoryResponse>, ApiError> {
    match repo::get(&state.db, id).await? {
        Some(c) => Ok(Json(to_response(c))),
        None => Err(ApiError::NotFound),
    }
}

#[instrument(skip(state, _user, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, HeaderMap, Json<CategoryResponse>), ApiError> {
    let name = validate_name(&payload.name)?;
    let category = repo::insert(&state.db, name, payload.description.trim()).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        format!("/api/v1/categories/{}", category.id)
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("location header: {e}")))?,
    );

    info!(category_id = %category.id, name = %category.name, "category created");
    Ok((StatusCode::CREATED, headers, Json(to_response(category))))
}

#[instrument(skip(state, _user, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> Result<StatusCode, ApiError> {
    let name = validate_name(&payload.name)?;
    match repo::update(&state.db, id, name, payload.description.trim()).await? {
        Some(()) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound),
    }
}

#[instrument(skip(state, _user))]
pub async fn delete_category(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if repo::delete(&state.db, id).await? {
        info!(category_id = %id, "category deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation_trims_and_rejects_blank() {
        assert_eq!(validate_name("  Tools  ").unwrap(), "Tools");
        assert!(matches!(validate_name("   "), Err(ApiError::Validation(_))));
        assert!(matches!(validate_name(""), Err(ApiError::Validation(_))));
    }
}
