use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::insight::{NewPersonalityInsight, PersonalityInsight};
use crate::models::mood_entry::{MoodEntry, NewMoodEntry};
use crate::models::music_analysis::{MusicAnalysis, NewMusicAnalysis};
use crate::models::recommendation::{NewRecommendation, Recommendation};
use crate::models::user::{StoredSpotifyTokens, User};

pub const MAX_MOOD_ENTRIES: i64 = 100;
pub const MAX_MUSIC_ANALYSES: i64 = 100;
pub const MAX_RECOMMENDATIONS: i64 = 50;

/// Postgres SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Row counts reported by the database monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub users: i64,
    pub mood_entries: i64,
    pub music_analyses: i64,
    pub recommendations: i64,
}

/// Caller-supplied page size capped at `max`. Absent, zero or negative
/// values fall back to `default`.
pub fn page_size(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.filter(|n| *n > 0).unwrap_or(default).min(max)
}

#[derive(Clone)]
pub struct Repository {
    db: PgPool,
}

impl Repository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // Users

    pub async fn create_user(&self, username: &str) -> AppResult<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AppError::Conflict("Username already taken".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn require_user(&self, user_id: Uuid) -> AppResult<User> {
        self.get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    /// Store sealed Spotify credentials. A missing refresh token or Spotify id
    /// keeps the previously stored value.
    pub async fn update_spotify_tokens(
        &self,
        user_id: Uuid,
        tokens: &StoredSpotifyTokens,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET spotify_id = COALESCE($2, spotify_id),
                spotify_access_token = $3,
                spotify_refresh_token = COALESCE($4, spotify_refresh_token),
                spotify_token_expires_at = $5
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&tokens.spotify_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }

    // Mood entries

    pub async fn create_mood_entry(&self, entry: &NewMoodEntry) -> AppResult<MoodEntry> {
        let created = sqlx::query_as::<_, MoodEntry>(
            r#"
            INSERT INTO mood_entries (id, user_id, mood_score, emotions, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.mood_score)
        .bind(Json(&entry.emotions))
        .bind(&entry.notes)
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    /// Newest first.
    pub async fn list_mood_entries(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<MoodEntry>> {
        let entries = sqlx::query_as::<_, MoodEntry>(
            r#"
            SELECT * FROM mood_entries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(1, MAX_MOOD_ENTRIES))
        .fetch_all(&self.db)
        .await?;
        Ok(entries)
    }

    /// Oldest first.
    pub async fn mood_entries_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<MoodEntry>> {
        let entries = sqlx::query_as::<_, MoodEntry>(
            r#"
            SELECT * FROM mood_entries
            WHERE user_id = $1 AND created_at >= $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.db)
        .await?;
        Ok(entries)
    }

    // Music analyses

    pub async fn create_music_analysis(
        &self,
        analysis: &NewMusicAnalysis,
    ) -> AppResult<MusicAnalysis> {
        let created = sqlx::query_as::<_, MusicAnalysis>(
            r#"
            INSERT INTO music_analysis
                (id, user_id, track_id, track_name, artist_name, album_image,
                 audio_features, predicted_mood, mood_confidence)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(analysis.user_id)
        .bind(&analysis.track_id)
        .bind(&analysis.track_name)
        .bind(&analysis.artist_name)
        .bind(&analysis.album_image)
        .bind(Json(analysis.audio_features))
        .bind(&analysis.predicted_mood)
        .bind(analysis.mood_confidence)
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    /// Newest first.
    pub async fn list_music_analyses(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<MusicAnalysis>> {
        let analyses = sqlx::query_as::<_, MusicAnalysis>(
            r#"
            SELECT * FROM music_analysis
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(1, MAX_MUSIC_ANALYSES))
        .fetch_all(&self.db)
        .await?;
        Ok(analyses)
    }

    pub async fn count_music_analyses(&self, user_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM music_analysis WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    // Recommendations

    pub async fn create_recommendation(
        &self,
        rec: &NewRecommendation,
    ) -> AppResult<Recommendation> {
        let created = sqlx::query_as::<_, Recommendation>(
            r#"
            INSERT INTO recommendations
                (id, user_id, mood_entry_id, track_id, track_name, artist_name,
                 album_image, reason, match_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(rec.user_id)
        .bind(rec.mood_entry_id)
        .bind(&rec.track_id)
        .bind(&rec.track_name)
        .bind(&rec.artist_name)
        .bind(&rec.album_image)
        .bind(&rec.reason)
        .bind(rec.match_score)
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    /// Newest first.
    pub async fn list_recommendations(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<Recommendation>> {
        let recs = sqlx::query_as::<_, Recommendation>(
            r#"
            SELECT * FROM recommendations
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(1, MAX_RECOMMENDATIONS))
        .fetch_all(&self.db)
        .await?;
        Ok(recs)
    }

    /// Delete recommendations created more than `retention_days` ago.
    pub async fn prune_recommendations(&self, retention_days: i64) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM recommendations
            WHERE created_at < NOW() - make_interval(days => $1)
            "#,
        )
        .bind(retention_days as i32)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    // Personality insights

    pub async fn create_personality_insight(
        &self,
        insight: &NewPersonalityInsight,
    ) -> AppResult<PersonalityInsight> {
        let created = sqlx::query_as::<_, PersonalityInsight>(
            r#"
            INSERT INTO personality_insights
                (id, user_id, music_dna, energy_level, positivity_level, ai_suggestion, traits)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(insight.user_id)
        .bind(&insight.music_dna)
        .bind(insight.energy_level)
        .bind(insight.positivity_level)
        .bind(&insight.ai_suggestion)
        .bind(Json(&insight.traits))
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    pub async fn latest_personality_insight(
        &self,
        user_id: Uuid,
    ) -> AppResult<Option<PersonalityInsight>> {
        let insight = sqlx::query_as::<_, PersonalityInsight>(
            r#"
            SELECT * FROM personality_insights
            WHERE user_id = $1
            ORDER BY generated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(insight)
    }

    // Monitoring

    pub async fn database_stats(&self) -> AppResult<DatabaseStats> {
        let (users, mood_entries, music_analyses, recommendations) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM mood_entries),
                    (SELECT COUNT(*) FROM music_analysis),
                    (SELECT COUNT(*) FROM recommendations)
                "#,
            )
            .fetch_one(&self.db)
            .await?;

        Ok(DatabaseStats {
            users,
            mood_entries,
            music_analyses,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_defaults_and_caps() {
        assert_eq!(page_size(None, 50, MAX_MOOD_ENTRIES), 50);
        assert_eq!(page_size(Some(500), 50, MAX_MOOD_ENTRIES), 100);
        assert_eq!(page_size(Some(0), 50, MAX_MOOD_ENTRIES), 50);
        assert_eq!(page_size(Some(-4), 10, MAX_RECOMMENDATIONS), 10);
        assert_eq!(page_size(Some(25), 10, MAX_RECOMMENDATIONS), 25);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = DatabaseStats {
            users: 2,
            mood_entries: 10,
            music_analyses: 4,
            recommendations: 7,
        };
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["moodEntries"], 10);
        assert_eq!(value["musicAnalyses"], 4);
    }

    fn recommendation_for(user_id: Uuid, track_id: &str) -> NewRecommendation {
        NewRecommendation {
            user_id,
            mood_entry_id: None,
            track_id: track_id.into(),
            track_name: "Holocene".into(),
            artist_name: "Bon Iver".into(),
            album_image: None,
            reason: "Quiet and warm".into(),
            match_score: 0.7,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_duplicate_username_conflicts(pool: PgPool) {
        let repo = Repository::new(pool);
        repo.create_user("night_owl").await.unwrap();

        let result = repo.create_user("night_owl").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_prune_removes_only_expired_recommendations(pool: PgPool) {
        let repo = Repository::new(pool.clone());
        let user = repo.create_user("pruner").await.unwrap();

        let old = repo
            .create_recommendation(&recommendation_for(user.id, "old"))
            .await
            .unwrap();
        repo.create_recommendation(&recommendation_for(user.id, "fresh"))
            .await
            .unwrap();
        sqlx::query(
            "UPDATE recommendations SET created_at = NOW() - INTERVAL '100 days' WHERE id = $1",
        )
        .bind(old.id)
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(repo.prune_recommendations(90).await.unwrap(), 1);
        let remaining = repo.list_recommendations(user.id, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].track_id, "fresh");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_latest_insight_and_stats(pool: PgPool) {
        let repo = Repository::new(pool);
        let user = repo.create_user("insightful").await.unwrap();
        assert!(repo.latest_personality_insight(user.id).await.unwrap().is_none());

        let created = repo
            .create_personality_insight(&NewPersonalityInsight {
                user_id: user.id,
                music_dna: "Warm and nocturnal".into(),
                energy_level: 0.3,
                positivity_level: 0.6,
                ai_suggestion: "Try morning playlists".into(),
                traits: vec!["reflective".into()],
            })
            .await
            .unwrap();
        let latest = repo.latest_personality_insight(user.id).await.unwrap().unwrap();
        assert_eq!(latest.id, created.id);
        assert_eq!(latest.traits.0, vec!["reflective".to_string()]);

        let stats = repo.database_stats().await.unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.recommendations, 0);
    }
}
