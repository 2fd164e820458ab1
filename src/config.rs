use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Additional CORS origins, comma separated in `CORS_EXTRA_ORIGINS`.
    pub cors_extra_origins: Vec<String>,

    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_redirect_uri: String,

    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,

    /// 32-byte AES key, hex encoded. Random per process when unset.
    pub token_encryption_key: Option<String>,
    pub oauth_state_secret: Option<String>,

    pub api_rate_limit_per_minute: u32,
    pub db_monitor_interval_secs: u64,
    pub recommendation_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".into())
                .parse()
                .expect("DB_MAX_CONNECTIONS must be a number"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            cors_extra_origins: env::var("CORS_EXTRA_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            spotify_client_id: env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
            spotify_client_secret: env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
            spotify_redirect_uri: env::var("SPOTIFY_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:5000/callback".into()),

            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),

            token_encryption_key: env::var("TOKEN_ENCRYPTION_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            oauth_state_secret: env::var("OAUTH_STATE_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),

            api_rate_limit_per_minute: env::var("API_RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "100".into())
                .parse()
                .unwrap_or(100),
            db_monitor_interval_secs: env::var("DB_MONITOR_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .unwrap_or(60),
            recommendation_retention_days: env::var("RECOMMENDATION_RETENTION_DAYS")
                .unwrap_or_else(|_| "90".into())
                .parse()
                .unwrap_or(90),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://moodscale@localhost/moodscale_test".into(),
            db_max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:5173".into(),
            cors_extra_origins: vec![],
            spotify_client_id: "test-client".into(),
            spotify_client_secret: "test-secret".into(),
            spotify_redirect_uri: "http://localhost:5000/callback".into(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o".into(),
            openai_base_url: "http://localhost:0".into(),
            token_encryption_key: None,
            oauth_state_secret: Some("test-state-secret".into()),
            api_rate_limit_per_minute: 100,
            db_monitor_interval_secs: 60,
            recommendation_retention_days: 90,
        }
    }
}
