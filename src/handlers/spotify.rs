use axum::{
    extract::State,
    response::Redirect,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::user::{SpotifyStatus, StoredSpotifyTokens, User};
use crate::services::spotify::Playlist;
use crate::validation::{ValidPath, ValidQuery};
use crate::AppState;

/// Refresh a user token when it expires within this window.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn auth_url(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<AuthUrlQuery>,
) -> AppResult<Json<Value>> {
    let user_id = query
        .user_id
        .ok_or_else(|| AppError::Validation("userId is required".into()))?;
    state.repo.require_user(user_id).await?;

    let oauth_state = state.state_signer.sign(user_id, Utc::now());
    let url = state.music.authorize_url(&oauth_state)?;

    Ok(Json(json!({ "authUrl": url })))
}

pub async fn callback(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<CallbackQuery>,
) -> Redirect {
    let frontend = state.config.frontend_url.trim_end_matches('/');
    let failure = |reason: &str| {
        Redirect::to(&format!("{}/?spotify=error&message={}", frontend, reason))
    };

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        if let Some(error) = query.error {
            tracing::warn!(error = %error, "Spotify authorization denied");
        }
        return failure("no_code");
    };

    let Some(user_id) = query
        .state
        .as_deref()
        .and_then(|s| state.state_signer.verify(s, Utc::now()))
    else {
        tracing::warn!("Spotify callback with invalid state");
        return failure("invalid_state");
    };

    match connect_account(&state, user_id, &code).await {
        Ok(()) => {
            tracing::info!(user_id = %user_id, "Spotify account connected");
            Redirect::to(&format!("{}/?spotify=connected", frontend))
        }
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Spotify callback failed");
            failure("callback_failed")
        }
    }
}

async fn connect_account(state: &AppState, user_id: Uuid, code: &str) -> AppResult<()> {
    let grant = state.music.exchange_code(code).await?;
    let profile = state.music.user_profile(&grant.access_token).await?;

    let tokens = StoredSpotifyTokens {
        spotify_id: Some(profile.id),
        access_token: state.cipher.seal(&grant.access_token)?,
        refresh_token: grant
            .refresh_token
            .as_deref()
            .map(|t| state.cipher.seal(t))
            .transpose()?,
        expires_at: Utc::now() + Duration::seconds(grant.expires_in),
    };

    state.repo.update_spotify_tokens(user_id, &tokens).await
}

pub async fn status(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> AppResult<Json<SpotifyStatus>> {
    let user = state.repo.get_user(user_id).await?;
    Ok(Json(SpotifyStatus {
        connected: user.as_ref().is_some_and(User::is_spotify_connected),
        spotify_id: user.and_then(|u| u.spotify_id),
    }))
}

pub async fn playlists(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> AppResult<Json<Vec<Playlist>>> {
    let user = state
        .repo
        .get_user(user_id)
        .await?
        .ok_or(AppError::NotConnected)?;
    let token = user_access_token(&state, &user)
        .await?
        .ok_or(AppError::NotConnected)?;

    let playlists = state.music.user_playlists(&token).await?;
    Ok(Json(playlists))
}

/// Decrypted access token for a connected user, refreshed and re-stored when
/// it is about to expire. `None` when the user is not connected or the stored
/// credentials are no longer usable.
pub async fn user_access_token(state: &AppState, user: &User) -> AppResult<Option<String>> {
    let Some(sealed) = user.spotify_access_token.as_deref() else {
        return Ok(None);
    };

    let access_token = match state.cipher.open(sealed) {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Stored Spotify token unreadable");
            return Ok(None);
        }
    };

    let expires_soon = user
        .spotify_token_expires_at
        .is_some_and(|at| at <= Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS));
    if !expires_soon {
        return Ok(Some(access_token));
    }

    let Some(refresh_token) = user
        .spotify_refresh_token
        .as_deref()
        .and_then(|sealed| state.cipher.open(sealed).ok())
    else {
        tracing::warn!(user_id = %user.id, "Spotify token expired and no refresh token stored");
        return Ok(None);
    };

    let grant = match state.music.refresh_access_token(&refresh_token).await {
        Ok(grant) => grant,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Spotify token refresh failed");
            return Ok(None);
        }
    };

    let tokens = StoredSpotifyTokens {
        spotify_id: None,
        access_token: state.cipher.seal(&grant.access_token)?,
        refresh_token: grant
            .refresh_token
            .as_deref()
            .map(|t| state.cipher.seal(t))
            .transpose()?,
        expires_at: Utc::now() + Duration::seconds(grant.expires_in),
    };
    state.repo.update_spotify_tokens(user.id, &tokens).await?;
    tracing::debug!(user_id = %user.id, "Refreshed Spotify user token");

    Ok(Some(grant.access_token))
}
