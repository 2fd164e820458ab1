use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::rate_limit;
use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Users
        .route("/api/users", post(handlers::users::create_user))
        .route("/api/users/:user_id", get(handlers::users::get_user))
        // Mood tracking
        .route(
            "/api/mood-entries",
            post(handlers::mood_entries::create_mood_entry),
        )
        .route(
            "/api/mood-entries/:user_id",
            get(handlers::mood_entries::list_mood_entries),
        )
        .route(
            "/api/mood-trends/:user_id",
            get(handlers::mood_entries::mood_trends),
        )
        .route(
            "/api/user-stats/:user_id",
            get(handlers::mood_entries::user_stats),
        )
        // Music
        .route("/api/music/search", get(handlers::music::search_tracks))
        .route("/api/music/analyze", post(handlers::music::analyze_track))
        .route(
            "/api/music/analyses/:user_id",
            get(handlers::music::list_analyses),
        )
        // Recommendations & insights
        .route(
            "/api/recommendations/:user_id",
            get(handlers::recommendations::get_recommendations),
        )
        .route(
            "/api/recommendations/:user_id/history",
            get(handlers::recommendations::recommendation_history),
        )
        .route(
            "/api/personality-insights/:user_id",
            get(handlers::insights::personality_insights),
        )
        // Spotify account
        .route("/api/spotify/auth-url", get(handlers::spotify::auth_url))
        .route(
            "/api/spotify/status/:user_id",
            get(handlers::spotify::status),
        )
        .route(
            "/api/spotify/playlists/:user_id",
            get(handlers::spotify::playlists),
        )
        // System
        .route("/api/system/db-metrics", get(handlers::system::db_metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/callback", get(handlers::spotify::callback));

    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in std::iter::once(&state.config.frontend_url).chain(&state.config.cors_extra_origins) {
        match origin.parse::<HeaderValue>() {
            Ok(value) => origins.push(value),
            Err(_) => tracing::warn!(origin = %origin, "Ignoring invalid CORS origin"),
        }
    }
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::music_analysis::{AudioFeatures, MAX_MOOD_LABEL_CHARS};
    use crate::services::ai::tests::ScriptedModel;
    use crate::services::llm::LanguageModel;
    use crate::services::mood_target::MoodTarget;
    use crate::services::spotify::{
        MusicProvider, Playlist, SpotifyError, SpotifyProfile, TokenGrant, Track,
    };
    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode},
        response::Response,
    };
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;
    use uuid::Uuid;

    const HOLOCENE: &str = "4fbvXwMTXPWaFyaMWUm9CR";
    const SKINNY_LOVE: &str = "3B3eOgLJSqPEA0RfboIQVM";

    /// Music provider backed by a fixed catalog. Account calls always fail.
    #[derive(Default)]
    struct StubMusic {
        catalog: Vec<Track>,
        recommendation_calls: Mutex<Vec<(Vec<String>, MoodTarget)>>,
    }

    impl StubMusic {
        fn with_catalog() -> Self {
            Self {
                catalog: vec![track(HOLOCENE, "Holocene"), track(SKINNY_LOVE, "Skinny Love")],
                ..Self::default()
            }
        }
    }

    fn track(id: &str, name: &str) -> Track {
        serde_json::from_value(json!({
            "id": id,
            "name": name,
            "artists": [{ "name": "Bon Iver" }],
            "album": { "name": "Bon Iver", "images": [{ "url": "https://i.scdn.co/image/a" }] },
            "preview_url": null
        }))
        .unwrap()
    }

    fn offline() -> SpotifyError {
        SpotifyError::Api {
            status: 503,
            message: "offline".into(),
        }
    }

    #[async_trait]
    impl MusicProvider for StubMusic {
        fn authorize_url(&self, state: &str) -> Result<String, SpotifyError> {
            Ok(format!("https://accounts.spotify.com/authorize?state={}", state))
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, SpotifyError> {
            Err(offline())
        }

        async fn refresh_access_token(&self, _token: &str) -> Result<TokenGrant, SpotifyError> {
            Err(offline())
        }

        async fn user_profile(&self, _token: &str) -> Result<SpotifyProfile, SpotifyError> {
            Err(offline())
        }

        async fn search_tracks(&self, _query: &str, limit: u32) -> Result<Vec<Track>, SpotifyError> {
            Ok(self.catalog.iter().take(limit as usize).cloned().collect())
        }

        async fn search_tracks_as_user(
            &self,
            query: &str,
            _token: &str,
            limit: u32,
        ) -> Result<Vec<Track>, SpotifyError> {
            self.search_tracks(query, limit).await
        }

        async fn track(&self, id: &str) -> Result<Option<Track>, SpotifyError> {
            Ok(self.catalog.iter().find(|t| t.id == id).cloned())
        }

        async fn audio_features(&self, id: &str) -> Option<AudioFeatures> {
            self.catalog.iter().any(|t| t.id == id).then(|| AudioFeatures {
                energy: 0.3,
                valence: 0.4,
                danceability: 0.5,
                acousticness: 0.8,
                tempo: 98.0,
                speechiness: 0.03,
                instrumentalness: 0.1,
                liveness: 0.1,
            })
        }

        async fn recommendations(
            &self,
            seeds: &[String],
            target: MoodTarget,
            limit: u32,
        ) -> Result<Vec<Track>, SpotifyError> {
            self.recommendation_calls
                .lock()
                .unwrap()
                .push((seeds.to_vec(), target));
            Ok(self.catalog.iter().take(limit as usize).cloned().collect())
        }

        async fn user_playlists(&self, _token: &str) -> Result<Vec<Playlist>, SpotifyError> {
            Err(offline())
        }
    }

    fn state_with(
        db: PgPool,
        music: Arc<dyn MusicProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> AppState {
        AppState::new(db, Arc::new(Config::for_tests()), music, llm)
    }

    /// State over a pool that never connects; for requests rejected before
    /// any query runs.
    fn test_state(config: Config) -> AppState {
        let db = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();
        AppState::new(
            db,
            Arc::new(config),
            Arc::new(StubMusic::default()),
            Arc::new(ScriptedModel(None)),
        )
    }

    fn test_app(state: AppState) -> Router {
        build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    async fn send(app: Router, request: Request<Body>) -> Response {
        app.oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    async fn create_user(state: &AppState, username: &str) -> Uuid {
        let response = send(
            test_app(state.clone()),
            post_json("/api/users", json!({ "username": username })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap()
    }

    async fn log_mood(state: &AppState, user_id: Uuid, score: i32, emotions: &[&str]) -> Value {
        let response = send(
            test_app(state.clone()),
            post_json(
                "/api/mood-entries",
                json!({ "userId": user_id, "moodScore": score, "emotions": emotions }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    async fn analyze(state: &AppState, user_id: Uuid, track_id: &str) -> Response {
        send(
            test_app(state.clone()),
            post_json(
                "/api/music/analyze",
                json!({ "userId": user_id, "trackId": track_id }),
            ),
        )
        .await
    }

    #[tokio::test]
    async fn test_health() {
        let response = send(test_app(test_state(Config::for_tests())), get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "moodscale-api");
    }

    #[tokio::test]
    async fn test_out_of_range_mood_score_rejected() {
        let app = test_app(test_state(Config::for_tests()));
        let request = post_json(
            "/api/mood-entries",
            json!({ "userId": Uuid::new_v4(), "moodScore": 11 }),
        );

        let response = send(app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Mood score must be between 1 and 10");
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_shape() {
        let app = test_app(test_state(Config::for_tests()));
        let request = Request::builder()
            .method("POST")
            .uri("/api/mood-entries")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"moodScore\":"))
            .unwrap();

        let response = send(app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_bad_path_and_query_use_error_shape() {
        let state = test_state(Config::for_tests());
        let uris = [
            "/api/mood-entries/not-a-uuid".to_string(),
            format!("/api/mood-entries/{}?limit=lots", Uuid::new_v4()),
            format!("/api/music/search?q=calm&limit=-1&userId={}", Uuid::new_v4()),
        ];

        for uri in uris {
            let response = send(test_app(state.clone()), get(&uri)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            assert!(content_type.starts_with("application/json"), "{}", uri);
            assert!(body_json(response).await["error"].is_string(), "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_analyze_rejects_path_like_track_id() {
        let app = test_app(test_state(Config::for_tests()));
        let request = post_json(
            "/api/music/analyze",
            json!({ "userId": Uuid::new_v4(), "trackId": "../me" }),
        );

        let response = send(app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Track ID can only contain letters and numbers"
        );
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let response = send(
            test_app(test_state(Config::for_tests())),
            get("/api/music/search?q=%20%20"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Query parameter is required");
    }

    #[tokio::test]
    async fn test_auth_url_requires_user() {
        let response = send(
            test_app(test_state(Config::for_tests())),
            get("/api/spotify/auth-url"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "userId is required");
    }

    #[tokio::test]
    async fn test_callback_without_code_redirects() {
        let response = send(
            test_app(test_state(Config::for_tests())),
            get("/callback?state=whatever"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "http://localhost:5173/?spotify=error&message=no_code"
        );
    }

    #[tokio::test]
    async fn test_callback_rejects_forged_state() {
        let state = test_state(Config::for_tests());
        let signed = state.state_signer.sign(Uuid::new_v4(), Utc::now());
        let forged = format!("{}.{}", Uuid::new_v4(), &signed[37..]);

        for bad in ["moodscale-auth".to_string(), forged] {
            let response = send(
                test_app(state.clone()),
                get(&format!("/callback?code=abc&state={}", bad)),
            )
            .await;
            assert_eq!(
                location(&response),
                "http://localhost:5173/?spotify=error&message=invalid_state"
            );
        }
    }

    #[tokio::test]
    async fn test_callback_reports_exchange_failure() {
        let state = test_state(Config::for_tests());
        let signed = state.state_signer.sign(Uuid::new_v4(), Utc::now());

        let response = send(
            test_app(state),
            get(&format!("/callback?code=abc&state={}", signed)),
        )
        .await;
        assert_eq!(
            location(&response),
            "http://localhost:5173/?spotify=error&message=callback_failed"
        );
    }

    #[tokio::test]
    async fn test_api_requests_are_rate_limited_per_ip() {
        let mut config = Config::for_tests();
        config.api_rate_limit_per_minute = 2;
        let state = test_state(config);

        for _ in 0..2 {
            let response = send(test_app(state.clone()), get("/api/spotify/auth-url")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        let response = send(test_app(state.clone()), get("/api/spotify/auth-url")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // Public routes are not counted.
        let response = send(test_app(state), get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_duplicate_username_is_conflict(pool: PgPool) {
        let state = state_with(pool, Arc::new(StubMusic::default()), Arc::new(ScriptedModel(None)));
        create_user(&state, "sunny_side").await;

        let response = send(
            test_app(state),
            post_json("/api/users", json!({ "username": "sunny_side" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"], "Username already taken");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_mood_entry_feeds_user_stats(pool: PgPool) {
        let state = state_with(pool, Arc::new(StubMusic::default()), Arc::new(ScriptedModel(None)));
        let user_id = create_user(&state, "daily_logger").await;

        let entry = log_mood(&state, user_id, 7, &[" <calm> ", "hopeful"]).await;
        assert_eq!(entry["emotions"], json!(["calm", "hopeful"]));

        let response = send(
            test_app(state.clone()),
            get(&format!("/api/user-stats/{}", user_id)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let stats = body_json(response).await;
        assert_eq!(stats["streak"], "1 days");
        assert_eq!(stats["currentMood"], "calm");
        assert_eq!(stats["averageMood"], "7.0");
        assert_eq!(stats["moodScore"], "7.0");
        assert_eq!(stats["songsAnalyzed"], 0);
        assert_eq!(stats["improvement"], "N/A");

        let response = send(
            test_app(state),
            get(&format!("/api/mood-trends/{}?days=0", user_id)),
        )
        .await;
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_mood_entry_for_unknown_user_is_not_found(pool: PgPool) {
        let state = state_with(pool, Arc::new(StubMusic::default()), Arc::new(ScriptedModel(None)));

        let response = send(
            test_app(state),
            post_json(
                "/api/mood-entries",
                json!({ "userId": Uuid::new_v4(), "moodScore": 5 }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_analyze_track_persists_bounded_label(pool: PgPool) {
        let answer = json!({
            "predictedMood": "Wistful".repeat(30),
            "confidence": 0.9,
            "emotions": ["longing"],
        });
        let state = state_with(
            pool,
            Arc::new(StubMusic::with_catalog()),
            Arc::new(ScriptedModel(Some(answer.to_string()))),
        );
        let user_id = create_user(&state, "crate_digger").await;

        let response = analyze(&state, user_id, HOLOCENE).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let label = body["analysis"]["predictedMood"].as_str().unwrap();
        assert_eq!(label.chars().count(), MAX_MOOD_LABEL_CHARS);
        assert!(label.starts_with("wistful"));
        assert_eq!(body["analysis"]["trackName"], "Holocene");
        assert_eq!(body["moodAnalysis"]["confidence"], 0.9);

        let response = analyze(&state, user_id, "0000000000000000000000").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            test_app(state),
            get(&format!("/api/music/analyses/{}", user_id)),
        )
        .await;
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_recommendations_are_seeded_and_linked(pool: PgPool) {
        let music = Arc::new(StubMusic::with_catalog());
        let state = state_with(pool, music.clone(), Arc::new(ScriptedModel(None)));
        let user_id = create_user(&state, "playlist_fan").await;

        assert_eq!(analyze(&state, user_id, HOLOCENE).await.status(), StatusCode::OK);
        let entry = log_mood(&state, user_id, 3, &["sad"]).await;

        let response = send(
            test_app(state.clone()),
            get(&format!("/api/recommendations/{}?limit=5", user_id)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let recs = body_json(response).await;
        let recs = recs.as_array().unwrap();
        assert_eq!(recs.len(), 2);
        for rec in recs {
            assert_eq!(rec["moodEntryId"], entry["id"]);
            let score = rec["matchScore"].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&score));
            assert_eq!(rec["rationale"]["mood"], "sad");
            assert_eq!(rec["track"]["id"], rec["trackId"]);
        }

        let calls = music.recommendation_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![HOLOCENE.to_string()]);
        assert_eq!(calls[0].1, MoodTarget::for_mood("sad"));

        let response = send(
            test_app(state),
            get(&format!("/api/recommendations/{}/history", user_id)),
        )
        .await;
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_personality_insight_is_cached(pool: PgPool) {
        let state = state_with(
            pool,
            Arc::new(StubMusic::with_catalog()),
            Arc::new(ScriptedModel(None)),
        );
        let user_id = create_user(&state, "deep_listener").await;
        let uri = format!("/api/personality-insights/{}", user_id);

        let placeholder = body_json(send(test_app(state.clone()), get(&uri)).await).await;
        assert!(placeholder["musicDNA"]
            .as_str()
            .unwrap()
            .starts_with("Start tracking"));
        assert!(state
            .repo
            .latest_personality_insight(user_id)
            .await
            .unwrap()
            .is_none());

        log_mood(&state, user_id, 6, &["calm"]).await;
        assert_eq!(analyze(&state, user_id, SKINNY_LOVE).await.status(), StatusCode::OK);

        let first = body_json(send(test_app(state.clone()), get(&uri)).await).await;
        let second = body_json(send(test_app(state), get(&uri)).await).await;
        assert!(first["id"].is_string());
        assert_eq!(first["id"], second["id"]);
        assert_eq!(first["generatedAt"], second["generatedAt"]);
    }
}
