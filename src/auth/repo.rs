use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub is_active: bool,
}

impl User {
    /// Find a user by username.
    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, is_active
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Fast-path uniqueness pre-check; the unique constraint remains the
    /// source of truth (see `create`).
    pub async fn username_taken(db: &PgPool, username: &str) -> anyhow::Result<bool> {
        let taken: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)"#)
                .bind(username)
                .fetch_one(db)
                .await?;
        Ok(taken.0)
    }

    pub async fn email_taken(db: &PgPool, email: &str) -> anyhow::Result<bool> {
        let taken: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)"#)
                .bind(email)
                .fetch_one(db)
                .await?;
        Ok(taken.0)
    }

    /// Create a new user with hashed password. Returns the raw `sqlx::Error`
    /// so the caller can map unique-constraint violations to duplicate
    /// username/email failures.
    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at, is_active
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }
}
