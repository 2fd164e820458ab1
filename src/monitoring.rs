//! Periodic database health sampling and housekeeping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::db::repository::{DatabaseStats, Repository};

const HISTORY_LIMIT: usize = 100;
const SLOW_RESPONSE_MS: u64 = 5_000;
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSample {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub stats: Option<DatabaseStats>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetrics {
    pub latest: Option<DatabaseSample>,
    pub average_response_time_ms: f64,
    pub health_percentage: f64,
    pub samples: usize,
}

/// Rolling window of the most recent database samples.
#[derive(Clone, Default)]
pub struct DatabaseMonitor {
    history: Arc<RwLock<VecDeque<DatabaseSample>>>,
}

impl DatabaseMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query row counts, time the round trip and record the sample.
    pub async fn collect(&self, repo: &Repository) -> DatabaseSample {
        let started = Instant::now();
        let result = repo.database_stats().await;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let sample = match result {
            Ok(stats) => DatabaseSample {
                healthy: true,
                response_time_ms,
                stats: Some(stats),
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => DatabaseSample {
                healthy: false,
                response_time_ms,
                stats: None,
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            },
        };

        if !sample.healthy {
            tracing::error!(
                error = sample.error.as_deref().unwrap_or_default(),
                response_time_ms = response_time_ms,
                "Database health check failed"
            );
        } else if response_time_ms > SLOW_RESPONSE_MS {
            tracing::warn!(response_time_ms = response_time_ms, "Slow database response");
        } else {
            tracing::debug!(response_time_ms = response_time_ms, "Database health check passed");
        }

        self.record(sample.clone()).await;
        sample
    }

    pub async fn record(&self, sample: DatabaseSample) {
        let mut history = self.history.write().await;
        history.push_back(sample);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    pub async fn latest(&self) -> Option<DatabaseSample> {
        self.history.read().await.back().cloned()
    }

    /// Mean response time over the last `n` samples, 0 with no history.
    pub async fn average_response_time(&self, n: usize) -> f64 {
        let history = self.history.read().await;
        let recent: Vec<u64> = history
            .iter()
            .rev()
            .take(n)
            .map(|s| s.response_time_ms)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().sum::<u64>() as f64 / recent.len() as f64
    }

    /// Share of healthy samples among the last `n`, as a percentage.
    pub async fn health_percentage(&self, n: usize) -> f64 {
        let history = self.history.read().await;
        let recent: Vec<bool> = history.iter().rev().take(n).map(|s| s.healthy).collect();
        if recent.is_empty() {
            return 0.0;
        }
        let healthy = recent.iter().filter(|h| **h).count();
        healthy as f64 / recent.len() as f64 * 100.0
    }

    pub async fn metrics(&self, n: usize) -> DatabaseMetrics {
        DatabaseMetrics {
            latest: self.latest().await,
            average_response_time_ms: self.average_response_time(n).await,
            health_percentage: self.health_percentage(n).await,
            samples: self.history.read().await.len(),
        }
    }

    pub fn spawn(&self, repo: Repository, every: Duration) {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                monitor.collect(&repo).await;
            }
        });
    }
}

/// Prune old recommendations once a day.
pub fn spawn_maintenance_worker(repo: Repository, retention_days: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            interval.tick().await;
            match repo.prune_recommendations(retention_days).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(
                            purged = count,
                            retention_days = retention_days,
                            "Maintenance: pruned old recommendations"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Maintenance worker error");
                }
            }
        }
    });
}
