use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::repository::{page_size, MAX_MOOD_ENTRIES};
use crate::error::{AppError, AppResult};
use crate::models::mood_entry::{
    CreateMoodEntryRequest, MoodEntry, MoodEntryQuery, MoodTrendsQuery, NewMoodEntry, UserStats,
};
use crate::rate_limit::MOOD_ENTRY_LIMIT;
use crate::stats;
use crate::validation::{
    sanitize_list, sanitize_optional, ValidPath, ValidQuery, ValidatedJson,
};
use crate::AppState;

const DEFAULT_TREND_DAYS: i64 = 7;
const MAX_TREND_DAYS: i64 = 365;

/// Zero or negative windows fall back to the default week.
fn trend_days(requested: Option<i64>) -> i64 {
    page_size(requested, DEFAULT_TREND_DAYS, MAX_TREND_DAYS)
}

pub async fn list_mood_entries(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
    ValidQuery(query): ValidQuery<MoodEntryQuery>,
) -> AppResult<Json<Vec<MoodEntry>>> {
    let limit = page_size(query.limit, 50, MAX_MOOD_ENTRIES);
    let entries = state.repo.list_mood_entries(user_id, limit).await?;
    Ok(Json(entries))
}

pub async fn create_mood_entry(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateMoodEntryRequest>,
) -> AppResult<(StatusCode, Json<MoodEntry>)> {
    state
        .rate_limiter
        .enforce("mood_entry", &body.user_id.to_string(), MOOD_ENTRY_LIMIT)
        .await?;

    if !state.repo.user_exists(body.user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    let entry = NewMoodEntry {
        user_id: body.user_id,
        mood_score: body.mood_score,
        emotions: body
            .emotions
            .as_deref()
            .map(sanitize_list)
            .unwrap_or_default(),
        notes: sanitize_optional(body.notes.as_deref()),
    };

    let created = state.repo.create_mood_entry(&entry).await?;
    tracing::info!(
        user_id = %created.user_id,
        mood_score = created.mood_score,
        "Mood entry recorded"
    );

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn mood_trends(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
    ValidQuery(query): ValidQuery<MoodTrendsQuery>,
) -> AppResult<Json<Vec<MoodEntry>>> {
    let since = Utc::now() - Duration::days(trend_days(query.days));
    let entries = state.repo.mood_entries_since(user_id, since).await?;
    Ok(Json(entries))
}

pub async fn user_stats(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> AppResult<Json<UserStats>> {
    let now = Utc::now();

    let recent = state.repo.list_mood_entries(user_id, MAX_MOOD_ENTRIES).await?;
    let week = state
        .repo
        .mood_entries_since(user_id, now - Duration::days(DEFAULT_TREND_DAYS))
        .await?;
    let songs_analyzed = state.repo.count_music_analyses(user_id).await?;

    let current_mood = recent
        .first()
        .and_then(MoodEntry::primary_emotion)
        .unwrap_or("neutral")
        .to_string();
    let average = stats::average_mood(&week);
    let streak = stats::streak(&recent, now.date_naive());

    Ok(Json(UserStats {
        current_mood,
        streak: format!("{} days", streak),
        songs_analyzed,
        mood_score: format!("{:.1}", average),
        average_mood: format!("{:.1}", average),
        best_day: stats::best_day(&week),
        improvement: stats::format_improvement(stats::improvement(&week)),
    }))
}
