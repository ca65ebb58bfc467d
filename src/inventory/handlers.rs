use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use base64::Engine;
use bytes::Bytes;
use tracing::instrument;
use uuid::Uuid;

use super::dto::{CreateItemJson, ItemResponse, SearchQuery, UpdateItemJson};
use super::services::{self, ItemInput, UploadedImage};
use crate::{auth::extractors::CurrentUser, error::ApiError, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items))
        .route("/items/search", get(search_items))
        .route("/items/:id", get(get_item))
        .route("/categories/:id/items", get(items_by_category))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/items", post(create_item_multipart))
        .route("/items/json", post(create_item_json))
        .route("/items/:id", put(update_item_multipart))
        .route("/items/:id/json", put(update_item_json))
        .route("/items/:id", delete(delete_item))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

// --- read handlers ---

#[instrument(skip_all)]
pub async fn list_items(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    Ok(Json(services::list_items(&state).await?))
}

#[instrument(skip(state, _user))]
pub async fn get_item(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ItemResponse>, ApiError> {
    match services::get_item(&state, id).await? {
        Some(item) => Ok(Json(item)),
        None => Err(ApiError::NotFound),
    }
}

#[instrument(skip(state, _user))]
pub async fn search_items(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    Ok(Json(services::search_items(&state, &query.q).await?))
}

#[instrument(skip(state, _user))]
pub async fn items_by_category(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    Ok(Json(services::items_by_category(&state, id).await?))
}

// --- write handlers ---

#[instrument(skip_all)]
pub async fn create_item_multipart(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<ItemResponse>), ApiError> {
    let input = collect_multipart(mp).await?;
    let item = services::create_item(&state, input).await?;
    Ok((StatusCode::CREATED, location_header(item.id)?, Json(item)))
}

#[instrument(skip_all)]
pub async fn create_item_json(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Json(body): Json<CreateItemJson>,
) -> Result<(StatusCode, HeaderMap, Json<ItemResponse>), ApiError> {
    let image = decode_image(body.image_b64.as_deref(), body.image_name.as_deref())?;
    let input = ItemInput {
        name: body.name,
        quantity: body.quantity,
        category_ids: body.category_ids,
        image,
        image_path: None,
    };
    let item = services::create_item(&state, input).await?;
    Ok((StatusCode::CREATED, location_header(item.id)?, Json(item)))
}

#[instrument(skip(state, _user, mp))]
pub async fn update_item_multipart(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
    mp: Multipart,
) -> Result<StatusCode, ApiError> {
    let input = collect_multipart(mp).await?;
    match services::update_item(&state, id, input).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound),
    }
}

#[instrument(skip(state, _user, body))]
pub async fn update_item_json(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateItemJson>,
) -> Result<StatusCode, ApiError> {
    let image = decode_image(body.image_b64.as_deref(), body.image_name.as_deref())?;
    let input = ItemInput {
        name: body.name,
        quantity: body.quantity,
        category_ids: body.category_ids,
        image,
        image_path: body.image_path,
    };
    match services::update_item(&state, id, input).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound),
    }
}

#[instrument(skip(state, _user))]
pub async fn delete_item(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if services::delete_item(&state, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- helpers ---

fn location_header(id: Uuid) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        format!("/api/v1/items/{id}")
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("location header: {e}")))?,
    );
    Ok(headers)
}

/// Comma-separated uuid list from a form field. Empty segments are skipped;
/// anything unparseable is a validation failure.
pub(crate) fn parse_category_ids(raw: &str) -> Result<Vec<Uuid>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s)
                .map_err(|_| ApiError::Validation(format!("invalid category id: {s}")))
        })
        .collect()
}

fn decode_image(
    b64: Option<&str>,
    name: Option<&str>,
) -> Result<Option<UploadedImage>, ApiError> {
    let Some(b64) = b64 else {
        return Ok(None);
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|_| ApiError::Validation("invalid base64 image".into()))?;
    // Empty bodies mean "no image", same as an empty multipart file field.
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(UploadedImage {
        body: Bytes::from(bytes),
        file_name: name.unwrap_or("upload.bin").to_string(),
    }))
}

/// Form fields: `name`, `quantity`, `category_ids` (comma-separated),
/// optional `image` (file) and `image_path` (override string).
async fn collect_multipart(mut mp: Multipart) -> Result<ItemInput, ApiError> {
    let mut name = None;
    let mut quantity = None;
    let mut category_ids = Vec::new();
    let mut image = None;
    let mut image_path = None;

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("malformed multipart body".into()))?
    {
        let Some(field_name) = field.name().map(|s| s.to_string()) else {
            continue;
        };
        match field_name.as_str() {
            "name" => name = Some(read_text(field).await?),
            "quantity" => {
                let raw = read_text(field).await?;
                let parsed = raw.trim().parse::<i32>().map_err(|_| {
                    ApiError::Validation("quantity must be an integer".into())
                })?;
                quantity = Some(parsed);
            }
            "category_ids" => {
                let raw = read_text(field).await?;
                category_ids = parse_category_ids(&raw)?;
            }
            "image_path" => image_path = Some(read_text(field).await?),
            "image" => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "upload.bin".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::Validation("malformed multipart body".into()))?;
                if !body.is_empty() {
                    image = Some(UploadedImage { body, file_name });
                }
            }
            _ => {}
        }
    }

    Ok(ItemInput {
        name: name.ok_or_else(|| ApiError::Validation("name is required".into()))?,
        quantity: quantity.ok_or_else(|| ApiError::Validation("quantity is required".into()))?,
        category_ids,
        image,
        image_path,
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|_| ApiError::Validation("malformed multipart body".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_category_ids_accepts_comma_lists() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let parsed = parse_category_ids(&format!("{a}, {b}")).unwrap();
        assert_eq!(parsed, vec![a, b]);

        assert!(parse_category_ids("").unwrap().is_empty());
        assert!(parse_category_ids(" , ,").unwrap().is_empty());
        assert!(matches!(
            parse_category_ids("not-a-uuid"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn decode_image_handles_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"png-bytes");
        let img = decode_image(Some(&encoded), Some("pic.png"))
            .unwrap()
            .unwrap();
        assert_eq!(&img.body[..], b"png-bytes");
        assert_eq!(img.file_name, "pic.png");

        let img = decode_image(Some(&encoded), None).unwrap().unwrap();
        assert_eq!(img.file_name, "upload.bin");

        assert!(decode_image(None, None).unwrap().is_none());
        // An empty base64 string is "no image", not a zero-byte upload.
        assert!(decode_image(Some(""), Some("pic.png")).unwrap().is_none());
        assert!(matches!(
            decode_image(Some("!!not-base64!!"), None),
            Err(ApiError::Validation(_))
        ));
    }
}
