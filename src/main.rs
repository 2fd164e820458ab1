use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

mod app;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod monitoring;
mod rate_limit;
mod security;
mod services;
mod stats;
mod validation;

use config::Config;
use db::Repository;
use monitoring::DatabaseMonitor;
use rate_limit::RateLimitState;
use security::{OAuthStateSigner, TokenCipher};
use services::llm::{LanguageModel, OpenAiClient};
use services::spotify::{MusicProvider, SpotifyClient};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub repo: Repository,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimitState,
    pub music: Arc<dyn MusicProvider>,
    pub llm: Arc<dyn LanguageModel>,
    pub cipher: TokenCipher,
    pub state_signer: OAuthStateSigner,
    pub monitor: DatabaseMonitor,
}

impl AppState {
    pub fn new(
        db: PgPool,
        config: Arc<Config>,
        music: Arc<dyn MusicProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            repo: Repository::new(db.clone()),
            db,
            cipher: TokenCipher::from_config(config.token_encryption_key.as_deref()),
            state_signer: OAuthStateSigner::from_config(config.oauth_state_secret.as_deref()),
            config,
            rate_limiter: RateLimitState::new(),
            music,
            llm,
            monitor: DatabaseMonitor::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodscale_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    // Database
    let db = db::create_pool(&config.database_url, config.db_max_connections).await;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    let music: Arc<dyn MusicProvider> = Arc::new(SpotifyClient::from_config(&config));
    let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::from_config(&config));
    tracing::info!(model = llm.model(), "Language model configured");

    let state = AppState::new(db, config.clone(), music, llm);

    // Background workers
    rate_limit::spawn_cleanup_worker(state.rate_limiter.clone());
    state.monitor.spawn(
        state.repo.clone(),
        Duration::from_secs(config.db_monitor_interval_secs.max(1)),
    );
    monitoring::spawn_maintenance_worker(
        state.repo.clone(),
        config.recommendation_retention_days,
    );

    let app = app::build_router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    // Client IP is needed for the per-IP rate limit
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server error");
}
