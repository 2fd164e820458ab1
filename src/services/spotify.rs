//! Thin wrapper over the Spotify Web API endpoints this service uses.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::models::music_analysis::AudioFeatures;
use crate::services::mood_target::MoodTarget;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

const SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "playlist-read-private",
    "playlist-read-collaborative",
    "user-library-read",
    "user-top-read",
];

const FALLBACK_SEED_GENRES: &str = "pop,rock,indie";

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Spotify credentials are not configured")]
    NotConfigured,

    #[error("Spotify request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Spotify API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    Url(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<Artist>,
    pub album: Album,
    pub preview_url: Option<String>,
}

impl Track {
    pub fn primary_artist(&self) -> &str {
        self.artists
            .first()
            .map(|a| a.name.as_str())
            .unwrap_or("Unknown artist")
    }

    pub fn album_image(&self) -> Option<&str> {
        self.album.images.first().map(|i| i.url.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistTracks {
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
    #[serde(default)]
    pub tracks: PlaylistTracks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyProfile {
    pub id: String,
    pub display_name: Option<String>,
}

/// Response of the accounts token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait MusicProvider: Send + Sync {
    fn authorize_url(&self, state: &str) -> Result<String, SpotifyError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, SpotifyError>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, SpotifyError>;

    async fn user_profile(&self, access_token: &str) -> Result<SpotifyProfile, SpotifyError>;

    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>, SpotifyError>;

    /// Search on behalf of a user; falls back to the app token when the
    /// user token is rejected.
    async fn search_tracks_as_user(
        &self,
        query: &str,
        user_token: &str,
        limit: u32,
    ) -> Result<Vec<Track>, SpotifyError>;

    async fn track(&self, track_id: &str) -> Result<Option<Track>, SpotifyError>;

    /// `None` when Spotify has no features for the track or the call fails.
    async fn audio_features(&self, track_id: &str) -> Option<AudioFeatures>;

    /// Similarity search; falls back to a mood keyword search on failure.
    async fn recommendations(
        &self,
        seed_tracks: &[String],
        target: MoodTarget,
        limit: u32,
    ) -> Result<Vec<Track>, SpotifyError>;

    async fn user_playlists(&self, access_token: &str) -> Result<Vec<Playlist>, SpotifyError>;
}

struct AppToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    app_token: Mutex<Option<AppToken>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Paging<Track>,
}

#[derive(Deserialize)]
struct Paging<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    tracks: Vec<Track>,
}

impl SpotifyClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let client_id = client_id.into();
        if client_id.is_empty() {
            tracing::warn!("Missing Spotify credentials; music endpoints will be unavailable");
        }
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            client_id,
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            app_token: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.spotify_client_id.clone(),
            config.spotify_client_secret.clone(),
            config.spotify_redirect_uri.clone(),
        )
    }

    fn ensure_configured(&self) -> Result<(), SpotifyError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(SpotifyError::NotConfigured);
        }
        Ok(())
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, SpotifyError> {
        self.ensure_configured()?;
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;
        parse_json(response).await
    }

    /// Client-credentials token, reused until shortly before it expires.
    async fn app_access_token(&self) -> Result<String, SpotifyError> {
        let mut cached = self.app_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let grant = self
            .request_token(&[("grant_type", "client_credentials")])
            .await?;
        let lifetime = Duration::from_secs(grant.expires_in.max(0) as u64)
            .saturating_sub(Duration::from_secs(60));
        *cached = Some(AppToken {
            value: grant.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!(expires_in = grant.expires_in, "Refreshed Spotify app token");
        Ok(grant.access_token)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<T, SpotifyError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn search_with_token(
        &self,
        query: &str,
        token: &str,
        limit: u32,
    ) -> Result<Vec<Track>, SpotifyError> {
        let response: SearchResponse = self
            .get_json(
                &format!("{}/search", API_BASE),
                &[
                    ("q", query.to_string()),
                    ("type", "track".to_string()),
                    ("limit", limit.to_string()),
                ],
                token,
            )
            .await?;
        Ok(response.tracks.items)
    }
}

async fn parse_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, SpotifyError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(SpotifyError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

/// Query pairs for the recommendations endpoint.
fn recommendation_params(seed_tracks: &[String], target: MoodTarget, limit: u32) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("limit", limit.to_string()),
        ("target_energy", target.energy.to_string()),
        ("target_valence", target.valence.to_string()),
    ];
    let seeds: Vec<&str> = seed_tracks.iter().take(5).map(String::as_str).collect();
    if seeds.is_empty() {
        params.push(("seed_genres", FALLBACK_SEED_GENRES.to_string()));
    } else {
        params.push(("seed_tracks", seeds.join(",")));
    }
    params
}

#[async_trait]
impl MusicProvider for SpotifyClient {
    fn authorize_url(&self, state: &str) -> Result<String, SpotifyError> {
        self.ensure_configured()?;
        let scopes = SCOPES.join(" ");
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("scope", scopes.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map(String::from)
        .map_err(|e| SpotifyError::Url(e.to_string()))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, SpotifyError> {
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, SpotifyError> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn user_profile(&self, access_token: &str) -> Result<SpotifyProfile, SpotifyError> {
        self.get_json(&format!("{}/me", API_BASE), &[], access_token)
            .await
    }

    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>, SpotifyError> {
        let token = self.app_access_token().await?;
        self.search_with_token(query, &token, limit).await
    }

    async fn search_tracks_as_user(
        &self,
        query: &str,
        user_token: &str,
        limit: u32,
    ) -> Result<Vec<Track>, SpotifyError> {
        match self.search_with_token(query, user_token, limit).await {
            Ok(tracks) => Ok(tracks),
            Err(e) => {
                tracing::warn!(error = %e, "User-token search failed, falling back to app token");
                self.search_tracks(query, limit).await
            }
        }
    }

    async fn track(&self, track_id: &str) -> Result<Option<Track>, SpotifyError> {
        let token = self.app_access_token().await?;
        let result = self
            .get_json::<Track>(&format!("{}/tracks/{}", API_BASE, track_id), &[], &token)
            .await;
        match result {
            Ok(track) => Ok(Some(track)),
            Err(SpotifyError::Api { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16()
                    || status == StatusCode::BAD_REQUEST.as_u16() =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn audio_features(&self, track_id: &str) -> Option<AudioFeatures> {
        let result = match self.app_access_token().await {
            Ok(token) => {
                self.get_json::<AudioFeatures>(
                    &format!("{}/audio-features/{}", API_BASE, track_id),
                    &[],
                    &token,
                )
                .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(features) => Some(features.normalized()),
            Err(e) => {
                tracing::warn!(track_id = track_id, error = %e, "Failed to fetch audio features");
                None
            }
        }
    }

    async fn recommendations(
        &self,
        seed_tracks: &[String],
        target: MoodTarget,
        limit: u32,
    ) -> Result<Vec<Track>, SpotifyError> {
        let token = self.app_access_token().await?;
        let params = recommendation_params(seed_tracks, target, limit);
        let result = self
            .get_json::<RecommendationsResponse>(
                &format!("{}/recommendations", API_BASE),
                &params,
                &token,
            )
            .await;

        match result {
            Ok(response) => Ok(response.tracks),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get recommendations, falling back to search");
                self.search_tracks(target.fallback_query(), limit).await
            }
        }
    }

    async fn user_playlists(&self, access_token: &str) -> Result<Vec<Playlist>, SpotifyError> {
        let page: Paging<Playlist> = self
            .get_json(
                &format!("{}/me/playlists", API_BASE),
                &[("limit", "20".to_string())],
                access_token,
            )
            .await?;
        Ok(page.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SpotifyClient {
        SpotifyClient::new("abc123", "shh", "http://localhost:5000/callback")
    }

    #[test]
    fn test_authorize_url_carries_state_and_scopes() {
        let url = client().authorize_url("user.123.sig").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: std::collections::HashMap<String, String> =
            parsed.query_pairs().into_owned().collect();

        assert_eq!(parsed.host_str(), Some("accounts.spotify.com"));
        assert_eq!(params["client_id"], "abc123");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["state"], "user.123.sig");
        assert_eq!(params["redirect_uri"], "http://localhost:5000/callback");
        assert!(params["scope"].contains("user-top-read"));
    }

    #[test]
    fn test_authorize_url_requires_credentials() {
        let unconfigured = SpotifyClient::new("", "", "http://localhost:5000/callback");
        assert!(matches!(
            unconfigured.authorize_url("s"),
            Err(SpotifyError::NotConfigured)
        ));
    }

    #[test]
    fn test_recommendation_params_prefer_seed_tracks() {
        let seeds: Vec<String> = (0..7).map(|i| format!("track{}", i)).collect();
        let params = recommendation_params(&seeds, MoodTarget::for_mood("happy"), 10);
        let seed_param = params.iter().find(|(k, _)| *k == "seed_tracks").unwrap();
        assert_eq!(seed_param.1.split(',').count(), 5);
        assert!(params.iter().all(|(k, _)| *k != "seed_genres"));
        assert!(params.contains(&("target_energy", "0.7".to_string())));
    }

    #[test]
    fn test_recommendation_params_without_history_use_genres() {
        let params = recommendation_params(&[], MoodTarget::for_mood("sad"), 5);
        assert!(params.contains(&("seed_genres", "pop,rock,indie".to_string())));
    }

    #[test]
    fn test_track_helpers() {
        let track: Track = serde_json::from_value(serde_json::json!({
            "id": "1",
            "name": "Holocene",
            "artists": [{ "name": "Bon Iver" }, { "name": "Other" }],
            "album": { "name": "Bon Iver", "images": [{ "url": "https://i.scdn.co/image/a" }] },
            "preview_url": null
        }))
        .unwrap();
        assert_eq!(track.primary_artist(), "Bon Iver");
        assert_eq!(track.album_image(), Some("https://i.scdn.co/image/a"));
    }
}
