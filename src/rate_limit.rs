use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::AppState;

/// A fixed-window quota: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

pub const MOOD_ENTRY_LIMIT: RateLimit = RateLimit::per_minute(10);
pub const MUSIC_ANALYSIS_LIMIT: RateLimit = RateLimit::per_minute(20);

/// In-memory rate limit state (for single-instance deployments)
/// For multi-instance, use Redis or similar
#[derive(Clone, Default)]
pub struct RateLimitState {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one operation against `key`. Returns Ok(remaining) or
    /// Err(retry_after) when the window is exhausted.
    pub async fn check(&self, key: &str, limit: RateLimit) -> Result<u32, Duration> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
            window: limit.window,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= limit.window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.window = limit.window;

        if entry.count >= limit.max_requests {
            let retry_after = limit
                .window
                .saturating_sub(now.duration_since(entry.window_start));
            return Err(retry_after);
        }

        entry.count += 1;
        Ok(limit.max_requests - entry.count)
    }

    /// Per-user quota for a named operation, mapped onto `AppError`.
    pub async fn enforce(&self, operation: &str, identifier: &str, limit: RateLimit) -> Result<(), AppError> {
        let key = format!("{}:{}", operation, identifier);
        match self.check(&key, limit).await {
            Ok(_) => Ok(()),
            Err(retry_after) => {
                tracing::warn!(
                    operation = operation,
                    identifier = identifier,
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limit exceeded"
                );
                Err(AppError::RateLimited)
            }
        }
    }

    /// Drop records whose window has expired. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.window_start) < entry.window);
        before - entries.len()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Per-IP request quota for the JSON API.
pub async fn rate_limit_api(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = addr.ip().to_string();
    let limit = RateLimit::per_minute(state.config.api_rate_limit_per_minute);

    match state.rate_limiter.check(&format!("ip:{}", ip), limit).await {
        Ok(remaining) => {
            tracing::debug!(ip = %ip, remaining = remaining, "Rate limit check passed");
            Ok(next.run(req).await)
        }
        Err(retry_after) => {
            tracing::warn!(
                ip = %ip,
                path = %req.uri().path(),
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(AppError::RateLimited)
        }
    }
}

pub fn spawn_cleanup_worker(limiter: RateLimitState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = limiter.cleanup().await;
            if evicted > 0 {
                tracing::debug!(evicted = evicted, "Rate limit cleanup");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limit_allows_under_limit() {
        let limiter = RateLimitState::new();

        for i in 0..MOOD_ENTRY_LIMIT.max_requests {
            let result = limiter.check("test_key", MOOD_ENTRY_LIMIT).await;
            assert!(result.is_ok(), "Request {} should be allowed", i + 1);
        }
    }

    #[tokio::test]
    async fn test_eleventh_mood_entry_is_blocked() {
        let limiter = RateLimitState::new();
        let user = uuid::Uuid::new_v4().to_string();

        for _ in 0..10 {
            assert!(limiter.enforce("mood_entry", &user, MOOD_ENTRY_LIMIT).await.is_ok());
        }

        let result = limiter.enforce("mood_entry", &user, MOOD_ENTRY_LIMIT).await;
        assert!(matches!(result, Err(AppError::RateLimited)));
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let limiter = RateLimitState::new();
        let limit = RateLimit {
            max_requests: 2,
            window: Duration::from_millis(50),
        };

        assert!(limiter.check("k", limit).await.is_ok());
        assert!(limiter.check("k", limit).await.is_ok());
        assert!(limiter.check("k", limit).await.is_err());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(limiter.check("k", limit).await, Ok(1));
    }

    #[tokio::test]
    async fn test_different_keys_have_separate_limits() {
        let limiter = RateLimitState::new();

        for _ in 0..MOOD_ENTRY_LIMIT.max_requests {
            let _ = limiter.check("key1", MOOD_ENTRY_LIMIT).await;
        }

        let result = limiter.check("key2", MOOD_ENTRY_LIMIT).await;
        assert!(result.is_ok(), "Different key should have separate limit");
    }

    #[tokio::test]
    async fn test_cleanup_evicts_expired_records() {
        let limiter = RateLimitState::new();
        let short = RateLimit {
            max_requests: 5,
            window: Duration::from_millis(20),
        };

        let _ = limiter.check("short", short).await;
        let _ = limiter.check("long", MOOD_ENTRY_LIMIT).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(limiter.cleanup().await, 1);
        assert_eq!(limiter.len().await, 1);
    }
}
