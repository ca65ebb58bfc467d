use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Item as returned to clients, with its association set resolved to ids.
#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub image_path: Option<String>,
    pub category_ids: Vec<Uuid>,
}

/// JSON creation body; the image rides along base64-encoded.
#[derive(Debug, Deserialize)]
pub struct CreateItemJson {
    pub name: String,
    pub quantity: i32,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    pub image_b64: Option<String>,
    pub image_name: Option<String>,
}

/// JSON update body. `image_path` is an explicit override that only applies
/// when no new image is uploaded; an empty `category_ids` list leaves the
/// existing associations untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateItemJson {
    pub name: String,
    pub quantity: i32,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    pub image_b64: Option<String>,
    pub image_name: Option<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}
