//! Generated content queries with DB-level pagination

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use crate::error::CoreError;
use crate::models::{ContentType, GeneratedContent, NewContent};

const CONTENT_COLUMNS: &str =
    "id, account_id, title, body, content_type, source_video_id, created_at";

#[derive(sqlx::FromRow)]
pub struct ContentRow {
    id: i64,
    account_id: i64,
    title: String,
    body: String,
    content_type: String,
    source_video_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContentRow> for GeneratedContent {
    type Error = CoreError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let content_type = ContentType::from_str(&row.content_type).ok_or_else(|| {
            CoreError::Internal(format!(
                "content {} has unknown type {}",
                row.id, row.content_type
            ))
        })?;
        Ok(GeneratedContent {
            id: row.id,
            account_id: row.account_id,
            title: row.title,
            body: row.body,
            content_type,
            source_video_id: row.source_video_id,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_content<'e, E>(
    executor: E,
    account_id: i64,
    content: &NewContent,
    created_at: DateTime<Utc>,
) -> Result<ContentRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"INSERT INTO generated_content (account_id, title, body, content_type, source_video_id, created_at)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING {CONTENT_COLUMNS}"#
    );
    sqlx::query_as(&query)
        .bind(account_id)
        .bind(&content.title)
        .bind(&content.body)
        .bind(content.content_type.as_str())
        .bind(&content.source_video_id)
        .bind(created_at)
        .fetch_one(executor)
        .await
}

pub async fn count_content<'e, E>(executor: E, account_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM generated_content WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(executor)
            .await?;
    Ok(count)
}

/// Newest first
pub async fn list_content<'e, E>(
    executor: E,
    account_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<ContentRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"SELECT {CONTENT_COLUMNS}
           FROM generated_content
           WHERE account_id = $1
           ORDER BY created_at DESC, id DESC
           LIMIT $2 OFFSET $3"#
    );
    sqlx::query_as(&query)
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
}
