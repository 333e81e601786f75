//! Fulfillment request queries
//!
//! Status changes are always read-modify-write under `get_request_for_update`
//! in one transaction, so two operators cannot interleave a transition.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, Postgres, QueryBuilder};

use crate::models::{ContentSnapshot, FileRef, FulfillmentRequest, RequestStatus};

const REQUEST_COLUMNS: &str = "id, account_id, title, description, source_video_id, carousel_type, \
     content_snapshot, uploaded_files, status, admin_notes, assigned_operator, resend_count, \
     was_modified, original_content, completed_files, created_at, updated_at";

/// Listing filter. `account_id: None` lists every account (operator view).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub account_id: Option<i64>,
    pub status: Option<RequestStatus>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(sqlx::FromRow)]
pub struct RequestRow {
    id: i64,
    account_id: i64,
    title: String,
    description: String,
    source_video_id: Option<String>,
    carousel_type: String,
    content_snapshot: String,
    uploaded_files: Json<Vec<FileRef>>,
    status: RequestStatus,
    admin_notes: Option<String>,
    assigned_operator: Option<i64>,
    resend_count: i32,
    was_modified: bool,
    original_content: Option<Json<ContentSnapshot>>,
    completed_files: Json<Vec<FileRef>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RequestRow> for FulfillmentRequest {
    fn from(row: RequestRow) -> Self {
        FulfillmentRequest {
            id: row.id,
            account_id: row.account_id,
            title: row.title,
            description: row.description,
            source_video_id: row.source_video_id,
            carousel_type: row.carousel_type,
            content_snapshot: row.content_snapshot,
            uploaded_files: row.uploaded_files.0,
            status: row.status,
            admin_notes: row.admin_notes,
            assigned_operator: row.assigned_operator,
            resend_count: row.resend_count,
            was_modified: row.was_modified,
            original_content: row.original_content.map(|c| c.0),
            completed_files: row.completed_files.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Insert a freshly built request. The `id` on `request` is ignored.
pub async fn insert_request<'e, E>(
    executor: E,
    request: &FulfillmentRequest,
) -> Result<RequestRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"INSERT INTO fulfillment_requests
               (account_id, title, description, source_video_id, carousel_type,
                content_snapshot, uploaded_files, status, resend_count, was_modified,
                completed_files, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
           RETURNING {REQUEST_COLUMNS}"#
    );
    sqlx::query_as(&query)
        .bind(request.account_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.source_video_id)
        .bind(&request.carousel_type)
        .bind(&request.content_snapshot)
        .bind(Json(&request.uploaded_files))
        .bind(request.status)
        .bind(request.resend_count)
        .bind(request.was_modified)
        .bind(Json(&request.completed_files))
        .bind(request.created_at)
        .bind(request.updated_at)
        .fetch_one(executor)
        .await
}

pub async fn get_request<'e, E>(executor: E, id: i64) -> Result<Option<RequestRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {REQUEST_COLUMNS} FROM fulfillment_requests WHERE id = $1");
    sqlx::query_as(&query).bind(id).fetch_optional(executor).await
}

pub async fn get_request_for_update<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<RequestRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query =
        format!("SELECT {REQUEST_COLUMNS} FROM fulfillment_requests WHERE id = $1 FOR UPDATE");
    sqlx::query_as(&query).bind(id).fetch_optional(executor).await
}

pub async fn list_requests<'e, E>(
    executor: E,
    filter: &RequestFilter,
) -> Result<Vec<RequestRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {REQUEST_COLUMNS} FROM fulfillment_requests WHERE TRUE"
    ));
    if let Some(account_id) = filter.account_id {
        builder.push(" AND account_id = ").push_bind(account_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status);
    }
    builder
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);

    builder
        .build_query_as::<RequestRow>()
        .fetch_all(executor)
        .await
}

/// Write back every mutable field of a request.
pub async fn update_request<'e, E>(
    executor: E,
    request: &FulfillmentRequest,
) -> Result<RequestRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"UPDATE fulfillment_requests
           SET title = $2, description = $3, source_video_id = $4, carousel_type = $5,
               content_snapshot = $6, uploaded_files = $7, status = $8, admin_notes = $9,
               assigned_operator = $10, resend_count = $11, was_modified = $12,
               original_content = $13, completed_files = $14, updated_at = $15
           WHERE id = $1
           RETURNING {REQUEST_COLUMNS}"#
    );
    sqlx::query_as(&query)
        .bind(request.id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.source_video_id)
        .bind(&request.carousel_type)
        .bind(&request.content_snapshot)
        .bind(Json(&request.uploaded_files))
        .bind(request.status)
        .bind(&request.admin_notes)
        .bind(request.assigned_operator)
        .bind(request.resend_count)
        .bind(request.was_modified)
        .bind(request.original_content.as_ref().map(Json))
        .bind(Json(&request.completed_files))
        .bind(request.updated_at)
        .fetch_one(executor)
        .await
}
