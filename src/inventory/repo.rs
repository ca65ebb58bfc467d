use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub image_path: Option<String>,
}

pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Item>> {
    let rows = sqlx::query_as::<_, Item>(
        r#"
        SELECT id, name, quantity, image_path
        FROM items
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Item>> {
    let row = sqlx::query_as::<_, Item>(
        r#"
        SELECT id, name, quantity, image_path
        FROM items
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn list_by_category(db: &PgPool, category_id: Uuid) -> anyhow::Result<Vec<Item>> {
    let rows = sqlx::query_as::<_, Item>(
        r#"
        SELECT i.id, i.name, i.quantity, i.image_path
        FROM items i
        JOIN item_categories ic ON ic.item_id = i.id
        WHERE ic.category_id = $1
        "#,
    )
    .bind(category_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Substring match on the item name, case-insensitive.
pub async fn search(db: &PgPool, term: &str) -> anyhow::Result<Vec<Item>> {
    let rows = sqlx::query_as::<_, Item>(
        r#"
        SELECT id, name, quantity, image_path
        FROM items
        WHERE name ILIKE '%' || $1 || '%'
        "#,
    )
    .bind(term)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Category ids for a set of items, keyed by item id. Items without
/// associations simply have no entry.
pub async fn category_ids_for(
    db: &PgPool,
    item_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, Vec<Uuid>>> {
    if item_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
        r#"
        SELECT item_id, category_id
        FROM item_categories
        WHERE item_id = ANY($1)
        "#,
    )
    .bind(item_ids)
    .fetch_all(db)
    .await?;

    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (item_id, category_id) in rows {
        map.entry(item_id).or_default().push(category_id);
    }
    Ok(map)
}

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    quantity: i32,
    image_path: Option<&str>,
) -> anyhow::Result<Item> {
    let item = sqlx::query_as::<_, Item>(
        r#"
        INSERT INTO items (name, quantity, image_path)
        VALUES ($1, $2, $3)
        RETURNING id, name, quantity, image_path
        "#,
    )
    .bind(name)
    .bind(quantity)
    .bind(image_path)
    .fetch_one(&mut **tx)
    .await?;
    Ok(item)
}

/// Update name and quantity unconditionally; the image path only changes when
/// `image_path` is `Some`. Returns `None` when the row no longer exists.
pub async fn update_row_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    name: &str,
    quantity: i32,
    image_path: Option<&str>,
) -> anyhow::Result<Option<Item>> {
    let item = sqlx::query_as::<_, Item>(
        r#"
        UPDATE items
        SET name = $2, quantity = $3, image_path = COALESCE($4, image_path)
        WHERE id = $1
        RETURNING id, name, quantity, image_path
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(quantity)
    .bind(image_path)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(item)
}

/// The stored image path, or `None` when the row does not exist.
pub async fn stored_image_path_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> anyhow::Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as(r#"SELECT image_path FROM items WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row.map(|(path,)| path))
}

/// Association rows go with the item via the FK cascade. Returns the removed
/// row so the caller can clean up its image blob.
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Item>> {
    let row = sqlx::query_as::<_, Item>(
        r#"
        DELETE FROM items
        WHERE id = $1
        RETURNING id, name, quantity, image_path
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Filter the requested category ids down to the ones that actually exist;
/// unknown ids are silently dropped.
pub async fn resolve_existing_categories_tx(
    tx: &mut Transaction<'_, Postgres>,
    ids: &[Uuid],
) -> anyhow::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(r#"SELECT id FROM categories WHERE id = ANY($1)"#)
        .bind(ids)
        .fetch_all(&mut **tx)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Fully replace the item's association set.
pub async fn replace_categories_tx(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    category_ids: &[Uuid],
) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM item_categories WHERE item_id = $1"#)
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    for category_id in category_ids {
        sqlx::query(r#"INSERT INTO item_categories (item_id, category_id) VALUES ($1, $2)"#)
            .bind(item_id)
            .bind(category_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

pub async fn linked_category_ids_tx(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
) -> anyhow::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as(r#"SELECT category_id FROM item_categories WHERE item_id = $1"#)
            .bind(item_id)
            .fetch_all(&mut **tx)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
