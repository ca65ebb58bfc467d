use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest},
        extractors::{session_token, CurrentUser, SESSION_COOKIE},
        password::{hash_password, verify_password},
        repo::User,
        sessions::SessionUser,
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// The unique constraints are the source of truth for duplicate detection;
/// the pre-checks in `register` only exist to fail fast.
fn map_user_insert_error(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db) = &e {
        match db.constraint() {
            Some("users_username_key") => return ApiError::DuplicateUsername,
            Some("users_email_key") => return ApiError::DuplicateEmail,
            _ => {}
        }
    }
    e.into()
}

fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.username.is_empty() {
        return Err(ApiError::Validation("username is required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::Validation("password too short".into()));
    }

    if User::username_taken(&state.db, &payload.username).await? {
        warn!(username = %payload.username, "username already taken");
        return Err(ApiError::DuplicateUsername);
    }
    if User::email_taken(&state.db, &payload.email).await? {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.username, &payload.email, &hash)
        .await
        .map_err(map_user_insert_error)?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(PublicUser {
            id: user.id,
            username: user.username,
            email: user.email,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<LoginResponse>), ApiError> {
    // Unknown username and wrong password are indistinguishable to the caller.
    let user = match User::find_by_username(&state.db, &payload.username).await? {
        Some(u) => u,
        None => {
            warn!(username = %payload.username, "login unknown username");
            return Err(ApiError::InvalidCredentials);
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(username = %payload.username, user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .sessions
        .create(SessionUser {
            user_id: user.id,
            username: user.username.clone(),
        })
        .await;

    let mut headers = HeaderMap::new();
    let max_age = state.config.session.idle_minutes * 60;
    headers.insert(
        header::SET_COOKIE,
        session_cookie(&token, max_age)
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("set-cookie header: {e}")))?,
    );

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok((
        headers,
        Json(LoginResponse {
            token,
            user: PublicUser {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        }),
    ))
}

/// Destroys session state for the presented token, if any. Logging out with
/// no session, or twice, succeeds all the same.
#[instrument(skip(state, headers))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> (StatusCode, HeaderMap) {
    if let Some(token) = session_token(&headers) {
        state.sessions.destroy(&token).await;
    }

    let mut out = HeaderMap::new();
    if let Ok(clear) = session_cookie("", 0).parse() {
        out.insert(header::SET_COOKIE, clear);
    }
    (StatusCode::NO_CONTENT, out)
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<SessionUser> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("user.name+tag@example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.d"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn session_cookie_shape() {
        let c = session_cookie("tok123", 1800);
        assert!(c.starts_with("sid=tok123;"));
        assert!(c.contains("HttpOnly"));
        assert!(c.contains("Max-Age=1800"));
    }
}
