use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::ItemResponse;
use super::repo::{self, Item};
use crate::error::ApiError;
use crate::state::AppState;

/// An uploaded image blob plus the client's filename, which only ever serves
/// as a naming hint for storage.
pub struct UploadedImage {
    pub body: Bytes,
    pub file_name: String,
}

/// Common input for item creation and update, regardless of whether it came
/// in as multipart or JSON.
pub struct ItemInput {
    pub name: String,
    pub quantity: i32,
    pub category_ids: Vec<Uuid>,
    pub image: Option<UploadedImage>,
    /// Explicit image path override; only honored on update and only when no
    /// new image is uploaded.
    pub image_path: Option<String>,
}

impl ItemInput {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("name is required".into()));
        }
        if self.quantity < 0 {
            return Err(ApiError::Validation("quantity must be non-negative".into()));
        }
        Ok(())
    }
}

/// Precedence for the stored image path on update: a freshly uploaded image
/// wins, then a non-empty explicit override, otherwise keep what is there.
fn effective_image_path(uploaded: Option<String>, explicit: Option<&str>) -> Option<String> {
    uploaded.or_else(|| {
        explicit
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
    })
}

fn to_response(item: Item, category_ids: Vec<Uuid>) -> ItemResponse {
    ItemResponse {
        id: item.id,
        name: item.name,
        quantity: item.quantity,
        image_path: item.image_path,
        category_ids,
    }
}

fn to_responses(
    items: Vec<Item>,
    mut categories: std::collections::HashMap<Uuid, Vec<Uuid>>,
) -> Vec<ItemResponse> {
    items
        .into_iter()
        .map(|item| {
            let ids = categories.remove(&item.id).unwrap_or_default();
            to_response(item, ids)
        })
        .collect()
}

async fn assemble(db: &sqlx::PgPool, items: Vec<Item>) -> Result<Vec<ItemResponse>, ApiError> {
    let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    let categories = repo::category_ids_for(db, &ids).await?;
    Ok(to_responses(items, categories))
}

pub async fn list_items(state: &AppState) -> Result<Vec<ItemResponse>, ApiError> {
    let items = repo::list_all(&state.db).await?;
    assemble(&state.db, items).await
}

pub async fn get_item(state: &AppState, id: Uuid) -> Result<Option<ItemResponse>, ApiError> {
    let Some(item) = repo::get(&state.db, id).await? else {
        return Ok(None);
    };
    let categories = repo::category_ids_for(&state.db, &[item.id]).await?;
    Ok(Some(to_responses(vec![item], categories).remove(0)))
}

pub async fn items_by_category(
    state: &AppState,
    category_id: Uuid,
) -> Result<Vec<ItemResponse>, ApiError> {
    let items = repo::list_by_category(&state.db, category_id).await?;
    assemble(&state.db, items).await
}

pub async fn search_items(state: &AppState, term: &str) -> Result<Vec<ItemResponse>, ApiError> {
    let items = repo::search(&state.db, term).await?;
    assemble(&state.db, items).await
}

pub async fn create_item(state: &AppState, input: ItemInput) -> Result<ItemResponse, ApiError> {
    input.validate()?;

    // Store the blob before opening the transaction; an orphaned file on a
    // failed insert is preferable to a dangling image_path.
    let image_path = match input.image {
        Some(img) => Some(
            state
                .storage
                .store(img.body, &img.file_name)
                .await
                .context("store item image")?,
        ),
        None => None,
    };

    let mut tx = state.db.begin().await.context("begin tx")?;
    let item = repo::insert_tx(&mut tx, input.name.trim(), input.quantity, image_path.as_deref())
        .await?;

    // Requested categories that do not exist are silently dropped.
    let mut linked = Vec::new();
    if !input.category_ids.is_empty() {
        linked = repo::resolve_existing_categories_tx(&mut tx, &input.category_ids).await?;
        repo::replace_categories_tx(&mut tx, item.id, &linked).await?;
    }
    tx.commit().await.context("commit tx")?;

    info!(item_id = %item.id, name = %item.name, "item created");
    Ok(to_response(item, linked))
}

pub async fn update_item(
    state: &AppState,
    id: Uuid,
    input: ItemInput,
) -> Result<Option<ItemResponse>, ApiError> {
    input.validate()?;

    let uploaded = match input.image {
        Some(img) => Some(
            state
                .storage
                .store(img.body, &img.file_name)
                .await
                .context("store item image")?,
        ),
        None => None,
    };
    let image_path = effective_image_path(uploaded, input.image_path.as_deref());

    let mut tx = state.db.begin().await.context("begin tx")?;
    let Some(previous_image) = repo::stored_image_path_tx(&mut tx, id).await? else {
        // Vanished between the caller's existence check and here; that is
        // just "not found".
        return Ok(None);
    };
    let Some(item) =
        repo::update_row_tx(&mut tx, id, input.name.trim(), input.quantity, image_path.as_deref())
            .await?
    else {
        return Ok(None);
    };

    // An empty id list leaves the existing associations untouched; a
    // non-empty list replaces them with the subset that exists.
    let linked = if input.category_ids.is_empty() {
        repo::linked_category_ids_tx(&mut tx, item.id).await?
    } else {
        let resolved = repo::resolve_existing_categories_tx(&mut tx, &input.category_ids).await?;
        repo::replace_categories_tx(&mut tx, item.id, &resolved).await?;
        resolved
    };
    tx.commit().await.context("commit tx")?;

    // The old blob is unreachable once a new path is committed.
    if let (Some(_), Some(old)) = (&image_path, &previous_image) {
        if item.image_path.as_deref() != Some(old.as_str()) {
            discard_blob(state, old).await;
        }
    }

    info!(item_id = %item.id, "item updated");
    Ok(Some(to_response(item, linked)))
}

pub async fn delete_item(state: &AppState, id: Uuid) -> Result<bool, ApiError> {
    let Some(item) = repo::delete(&state.db, id).await? else {
        return Ok(false);
    };
    if let Some(path) = &item.image_path {
        discard_blob(state, path).await;
    }
    info!(item_id = %id, "item deleted");
    Ok(true)
}

/// Blob cleanup is best effort: the row change already committed, so a
/// failure here only leaves an orphaned file behind.
async fn discard_blob(state: &AppState, path: &str) {
    if let Err(e) = state.storage.delete(path).await {
        warn!(error = %e, path = %path, "failed to remove stale image");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn input(name: &str, quantity: i32) -> ItemInput {
        ItemInput {
            name: name.into(),
            quantity,
            category_ids: vec![],
            image: None,
            image_path: None,
        }
    }

    #[test]
    fn validation_rejects_blank_name_and_negative_quantity() {
        assert!(input("Widget", 0).validate().is_ok());
        assert!(matches!(
            input("   ", 1).validate(),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            input("Widget", -1).validate(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn image_precedence_upload_then_override_then_keep() {
        // New upload always wins.
        assert_eq!(
            effective_image_path(Some("/uploads/new.png".into()), Some("/uploads/old.png")),
            Some("/uploads/new.png".into())
        );
        // No upload: a non-empty explicit override applies.
        assert_eq!(
            effective_image_path(None, Some("/uploads/old.png")),
            Some("/uploads/old.png".into())
        );
        // Neither: None, which keeps the stored value via COALESCE.
        assert_eq!(effective_image_path(None, None), None);
        assert_eq!(effective_image_path(None, Some("")), None);
        assert_eq!(effective_image_path(None, Some("   ")), None);
    }

    #[test]
    fn responses_pair_items_with_their_category_ids() {
        let a = Item {
            id: Uuid::new_v4(),
            name: "Laptop".into(),
            quantity: 3,
            image_path: None,
        };
        let b = Item {
            id: Uuid::new_v4(),
            name: "Mouse".into(),
            quantity: 10,
            image_path: Some("/uploads/x_mouse.png".into()),
        };
        let cat = Uuid::new_v4();
        let mut map = HashMap::new();
        map.insert(a.id, vec![cat]);

        let out = to_responses(vec![a.clone(), b.clone()], map);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, a.id);
        assert_eq!(out[0].category_ids, vec![cat]);
        assert_eq!(out[1].id, b.id);
        assert!(out[1].category_ids.is_empty());
        assert_eq!(out[1].image_path.as_deref(), Some("/uploads/x_mouse.png"));
    }

    mod db {
        use super::*;
        use crate::categories;
        use crate::state::AppState;
        use crate::storage::StorageClient;
        use axum::async_trait;
        use sqlx::PgPool;
        use std::sync::Arc;
        use tokio::sync::Mutex;

        fn item_input(name: &str, quantity: i32, category_ids: Vec<Uuid>) -> ItemInput {
            ItemInput {
                name: name.into(),
                quantity,
                category_ids,
                image: None,
                image_path: None,
            }
        }

        fn with_image(mut input: ItemInput, file_name: &str) -> ItemInput {
            input.image = Some(UploadedImage {
                body: Bytes::from_static(b"image-bytes"),
                file_name: file_name.into(),
            });
            input
        }

        async fn category(db: &PgPool, name: &str) -> Uuid {
            categories::repo::insert(db, name, "").await.unwrap().id
        }

        fn sorted(mut ids: Vec<Uuid>) -> Vec<Uuid> {
            ids.sort();
            ids
        }

        #[sqlx::test]
        async fn empty_category_list_leaves_associations_untouched(pool: PgPool) {
            let state = AppState::fake_with_db(pool);
            let a = category(&state.db, "electronics").await;
            let b = category(&state.db, "office").await;

            let created = create_item(&state, item_input("Widget", 10, vec![a, b]))
                .await
                .unwrap();
            assert_eq!(sorted(created.category_ids), sorted(vec![a, b]));

            let updated = update_item(&state, created.id, item_input("Widget", 4, vec![]))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.quantity, 4);
            assert_eq!(sorted(updated.category_ids), sorted(vec![a, b]));

            let fetched = get_item(&state, created.id).await.unwrap().unwrap();
            assert_eq!(sorted(fetched.category_ids), sorted(vec![a, b]));
        }

        #[sqlx::test]
        async fn non_empty_category_list_fully_replaces_associations(pool: PgPool) {
            let state = AppState::fake_with_db(pool);
            let a = category(&state.db, "electronics").await;
            let b = category(&state.db, "office").await;
            let c = category(&state.db, "clearance").await;

            let created = create_item(&state, item_input("Widget", 10, vec![a, b]))
                .await
                .unwrap();

            // Unknown ids are silently dropped, so only the real category
            // survives the replacement.
            let updated = update_item(
                &state,
                created.id,
                item_input("Widget", 10, vec![c, Uuid::new_v4()]),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(updated.category_ids, vec![c]);

            let fetched = get_item(&state, created.id).await.unwrap().unwrap();
            assert_eq!(fetched.category_ids, vec![c]);
        }

        #[sqlx::test]
        async fn delete_item_twice_reports_already_gone(pool: PgPool) {
            let state = AppState::fake_with_db(pool);
            let created = create_item(&state, item_input("Widget", 1, vec![]))
                .await
                .unwrap();

            assert!(delete_item(&state, created.id).await.unwrap());
            assert!(get_item(&state, created.id).await.unwrap().is_none());
            assert!(!delete_item(&state, created.id).await.unwrap());
        }

        #[derive(Default)]
        struct RecordingStorage {
            deleted: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl StorageClient for RecordingStorage {
            async fn store(&self, _body: Bytes, suggested_name: &str) -> anyhow::Result<String> {
                Ok(format!("/uploads/{}_{}", Uuid::new_v4(), suggested_name))
            }
            async fn delete(&self, public_path: &str) -> anyhow::Result<()> {
                self.deleted.lock().await.push(public_path.to_string());
                Ok(())
            }
        }

        fn recording_state(pool: PgPool) -> (AppState, Arc<RecordingStorage>) {
            let base = AppState::fake_with_db(pool);
            let recorder = Arc::new(RecordingStorage::default());
            let state = AppState::from_parts(
                base.db.clone(),
                base.config.clone(),
                recorder.clone(),
                base.sessions.clone(),
            );
            (state, recorder)
        }

        #[sqlx::test]
        async fn replacing_an_image_discards_the_old_blob(pool: PgPool) {
            let (state, recorder) = recording_state(pool);

            let created = create_item(&state, with_image(item_input("Widget", 1, vec![]), "old.png"))
                .await
                .unwrap();
            let old_path = created.image_path.clone().unwrap();

            update_item(
                &state,
                created.id,
                with_image(item_input("Widget", 1, vec![]), "new.png"),
            )
            .await
            .unwrap()
            .unwrap();

            assert_eq!(*recorder.deleted.lock().await, vec![old_path]);

            // An update without a new image keeps the path and deletes nothing.
            update_item(&state, created.id, item_input("Widget", 2, vec![]))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(recorder.deleted.lock().await.len(), 1);
        }

        #[sqlx::test]
        async fn deleting_an_item_discards_its_image(pool: PgPool) {
            let (state, recorder) = recording_state(pool);

            let created = create_item(&state, with_image(item_input("Widget", 1, vec![]), "pic.png"))
                .await
                .unwrap();
            let path = created.image_path.clone().unwrap();

            assert!(delete_item(&state, created.id).await.unwrap());
            assert_eq!(*recorder.deleted.lock().await, vec![path]);
        }
    }
}
