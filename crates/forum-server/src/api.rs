//! REST handlers for users and posts.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use forum_core::AuthenticatedUser;
use forum_store::posts::{NewPost, PostRepo, PostRow};
use forum_store::users::{NewUser, UserRepo};
use forum_store::StoreError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostsQuery {
    pub category: Option<String>,
    pub id: Option<String>,
}

/// Run a store call off the async workers. Password hashing in particular
/// is far too slow to do inline.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        debug!(error = %rejection.body_text(), "rejected request body");
        ApiError::BadRequest("Invalid data format".into())
    })
}

/// `POST /register`
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = parse_body(body)?;

    if req.nickname.trim().is_empty()
        || req.email.trim().is_empty()
        || req.password.expose_secret().is_empty()
    {
        return Err(ApiError::BadRequest("Missing required fields".into()));
    }
    if req.age.trim().is_empty() {
        return Err(ApiError::BadRequest("Age is required".into()));
    }

    let user = NewUser {
        nickname: req.nickname.trim().to_string(),
        age: req.age.trim().to_string(),
        gender: req.gender,
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email.trim().to_string(),
        password: req.password,
    };

    let repo = UserRepo::new(state.db.clone());
    let created = blocking(move || repo.create(&user)).await?;
    info!(user_id = created.id, nickname = %created.nickname, "registration complete");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

/// `POST /login`. `username` may be a nickname or an email.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthenticatedUser>, ApiError> {
    let LoginRequest { username: login, password } = parse_body(body)?;

    let repo = UserRepo::new(state.db.clone());
    let user = blocking(move || repo.authenticate(&login, &password)).await?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(user))
}

/// `GET /posts?category=`
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<Vec<PostRow>>, ApiError> {
    let repo = PostRepo::new(state.db.clone());
    let posts = blocking(move || repo.list(query.category.as_deref())).await?;
    Ok(Json(posts))
}

/// `POST /posts`
pub async fn create_post(
    State(state): State<AppState>,
    body: Result<Json<NewPost>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let post = parse_body(body)?;
    if post.title.trim().is_empty() || post.content.trim().is_empty() || post.category.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing required fields".into()));
    }

    let repo = PostRepo::new(state.db.clone());
    let created = blocking(move || repo.create(&post)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `DELETE /posts?id=`
pub async fn delete_post(
    State(state): State<AppState>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let raw = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing post ID".into()))?;
    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid post ID: {raw}")))?;

    let repo = PostRepo::new(state.db.clone());
    blocking(move || repo.delete(id)).await?;
    Ok(Json(json!({ "message": "Post deleted successfully" })))
}
