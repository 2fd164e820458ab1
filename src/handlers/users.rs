use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::user::{CreateUserRequest, User};
use crate::validation::{sanitize_string, ValidPath, ValidatedJson};
use crate::AppState;

pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let username = sanitize_string(&body.username);
    if username.len() < 3 {
        return Err(AppError::Validation("Username must be 3-50 characters".into()));
    }

    let user = state.repo.create_user(&username).await?;
    tracing::info!(user_id = %user.id, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> AppResult<Json<User>> {
    let user = state.repo.require_user(user_id).await?;
    Ok(Json(user))
}
