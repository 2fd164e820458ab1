use axum::{extract::State, Json};

use crate::monitoring::DatabaseMetrics;
use crate::AppState;

/// Samples used for the aggregate figures.
const METRICS_WINDOW: usize = 10;

pub async fn db_metrics(State(state): State<AppState>) -> Json<DatabaseMetrics> {
    Json(state.monitor.metrics(METRICS_WINDOW).await)
}
