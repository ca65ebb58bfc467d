use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Category row together with how many items currently reference it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: OffsetDateTime,
    pub item_count: i64,
}

const SELECT_WITH_COUNT: &str = r#"
    SELECT c.id, c.name, c.description, c.created_at,
           COUNT(ic.item_id) AS item_count
    FROM categories c
    LEFT JOIN item_categories ic ON ic.category_id = c.id
"#;

pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Category>> {
    let rows = sqlx::query_as::<_, Category>(&format!(
        "{SELECT_WITH_COUNT} GROUP BY c.id ORDER BY c.created_at"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Category>> {
    let row = sqlx::query_as::<_, Category>(&format!(
        "{SELECT_WITH_COUNT} WHERE c.id = $1 GROUP BY c.id"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn insert(db: &PgPool, name: &str, description: &str) -> anyhow::Result<Category> {
    let row = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, description)
        VALUES ($1, $2)
        RETURNING id, name, description, created_at, 0::BIGINT AS item_count
        "#,
    )
    .bind(name)
    .bind(description)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Returns `None` when the category no longer exists.
pub async fn update(
    db: &PgPool,
    id: Uuid,
    name: &str,
    description: &str,
) -> anyhow::Result<Option<()>> {
    let result = sqlx::query(r#"UPDATE categories SET name = $2, description = $3 WHERE id = $1"#)
        .bind(id)
        .bind(name)
        .bind(description)
        .execute(db)
        .await?;
    Ok((result.rows_affected() > 0).then_some(()))
}

/// Deleting a category removes its association rows via the FK cascade but
/// never touches the items themselves.
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(r#"DELETE FROM categories WHERE id = $1"#)
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
