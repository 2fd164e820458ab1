use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub spotify_id: Option<String>,
    /// AES-GCM sealed, see `security::TokenCipher`.
    #[serde(skip_serializing)]
    pub spotify_access_token: Option<String>,
    #[serde(skip_serializing)]
    pub spotify_refresh_token: Option<String>,
    #[serde(skip_serializing)]
    pub spotify_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_spotify_connected(&self) -> bool {
        self.spotify_access_token.is_some()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 3, max = 50, message = "Username must be 3-50 characters"),
        custom = "validate_username"
    )]
    pub username: String,
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("username_charset");
        err.message =
            Some("Username can only contain letters, numbers, and underscores".into());
        Err(err)
    }
}

/// Sealed Spotify credentials ready to be written to the users table.
#[derive(Debug, Clone)]
pub struct StoredSpotifyTokens {
    pub spotify_id: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifyStatus {
    pub connected: bool,
    pub spotify_id: Option<String>,
}
