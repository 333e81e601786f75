//! Saved video queries
//!
//! All functions use the generic Executor pattern, so they run on `&PgPool`
//! or inside a transaction via `&mut *tx`.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, Postgres};

use crate::models::{Transcript, Video};

const VIDEO_COLUMNS: &str = "account_id, id, title, channel_name, duration_label, transcript, \
     formatted_transcript, language, is_auto_generated, saved_at";

#[derive(sqlx::FromRow)]
pub struct VideoRow {
    account_id: i64,
    id: String,
    title: String,
    channel_name: String,
    duration_label: String,
    transcript: Option<String>,
    formatted_transcript: Json<Vec<String>>,
    language: Option<String>,
    is_auto_generated: bool,
    saved_at: DateTime<Utc>,
}

impl From<VideoRow> for Video {
    fn from(row: VideoRow) -> Self {
        Video {
            id: row.id,
            account_id: row.account_id,
            title: row.title,
            channel_name: row.channel_name,
            duration_label: row.duration_label,
            transcript: row.transcript,
            formatted_transcript: row.formatted_transcript.0,
            language: row.language,
            is_auto_generated: row.is_auto_generated,
            saved_at: row.saved_at,
        }
    }
}

/// Insert or refresh a saved video. An existing transcript is kept.
pub async fn upsert_video<'e, E>(executor: E, video: &Video) -> Result<VideoRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"INSERT INTO videos (account_id, id, title, channel_name, duration_label, saved_at)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (account_id, id) DO UPDATE
           SET title = EXCLUDED.title,
               channel_name = EXCLUDED.channel_name,
               duration_label = EXCLUDED.duration_label
           RETURNING {VIDEO_COLUMNS}"#
    );
    sqlx::query_as(&query)
        .bind(video.account_id)
        .bind(&video.id)
        .bind(&video.title)
        .bind(&video.channel_name)
        .bind(&video.duration_label)
        .bind(video.saved_at)
        .fetch_one(executor)
        .await
}

pub async fn get_video<'e, E>(
    executor: E,
    account_id: i64,
    video_id: &str,
) -> Result<Option<VideoRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE account_id = $1 AND id = $2");
    sqlx::query_as(&query)
        .bind(account_id)
        .bind(video_id)
        .fetch_optional(executor)
        .await
}

pub async fn list_videos<'e, E>(executor: E, account_id: i64) -> Result<Vec<VideoRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "SELECT {VIDEO_COLUMNS} FROM videos WHERE account_id = $1 ORDER BY saved_at DESC"
    );
    sqlx::query_as(&query).bind(account_id).fetch_all(executor).await
}

/// Returns true if a row was deleted
pub async fn delete_video<'e, E>(
    executor: E,
    account_id: i64,
    video_id: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM videos WHERE account_id = $1 AND id = $2")
        .bind(account_id)
        .bind(video_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Persist an acquired transcript. Re-running with the same transcript is a no-op in effect.
pub async fn save_transcript<'e, E>(
    executor: E,
    account_id: i64,
    video_id: &str,
    transcript: &Transcript,
) -> Result<Option<VideoRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"UPDATE videos
           SET transcript = $3,
               formatted_transcript = $4,
               language = $5,
               is_auto_generated = $6
           WHERE account_id = $1 AND id = $2
           RETURNING {VIDEO_COLUMNS}"#
    );
    sqlx::query_as(&query)
        .bind(account_id)
        .bind(video_id)
        .bind(&transcript.text)
        .bind(Json(&transcript.formatted))
        .bind(&transcript.language)
        .bind(transcript.is_auto_generated)
        .fetch_optional(executor)
        .await
}
