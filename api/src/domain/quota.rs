//! Credit ledger queries
//!
//! `try_consume` is the only place `used_count` grows. It is a single guarded
//! UPDATE, so concurrent callers serialize on the row lock and at most
//! `plan_limit` of them succeed.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use crate::constants::EXPIRED_PLAN_ID;
use crate::models::{PlanStatus, QuotaRecord};

const QUOTA_COLUMNS: &str =
    "account_id, plan_id, plan_name, plan_limit, used_count, expires_at, status";

#[derive(sqlx::FromRow)]
pub struct QuotaRow {
    account_id: i64,
    plan_id: String,
    plan_name: String,
    plan_limit: i32,
    used_count: i32,
    expires_at: Option<DateTime<Utc>>,
    status: String,
}

impl From<QuotaRow> for QuotaRecord {
    fn from(row: QuotaRow) -> Self {
        QuotaRecord {
            account_id: row.account_id,
            plan_id: row.plan_id,
            plan_name: row.plan_name,
            limit: row.plan_limit,
            count: row.used_count,
            expires_at: row.expires_at,
            status: PlanStatus::from_str(&row.status),
        }
    }
}

/// Create the default no-plan row if the account has none yet.
pub async fn ensure_quota<'e, E>(executor: E, account_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let default = QuotaRecord::no_plan(account_id);
    sqlx::query(
        r#"INSERT INTO quotas (account_id, plan_id, plan_name, plan_limit, used_count, status)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (account_id) DO NOTHING"#,
    )
    .bind(default.account_id)
    .bind(&default.plan_id)
    .bind(&default.plan_name)
    .bind(default.limit)
    .bind(default.count)
    .bind(default.status.as_str())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_quota<'e, E>(executor: E, account_id: i64) -> Result<Option<QuotaRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {QUOTA_COLUMNS} FROM quotas WHERE account_id = $1");
    sqlx::query_as(&query)
        .bind(account_id)
        .fetch_optional(executor)
        .await
}

/// Row-locking read for read-modify-write inside a transaction
pub async fn get_quota_for_update<'e, E>(
    executor: E,
    account_id: i64,
) -> Result<Option<QuotaRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {QUOTA_COLUMNS} FROM quotas WHERE account_id = $1 FOR UPDATE");
    sqlx::query_as(&query)
        .bind(account_id)
        .fetch_optional(executor)
        .await
}

/// Atomic increment-if-available. `None` means the guard rejected the charge;
/// the caller re-reads the row to tell expiry from exhaustion.
pub async fn try_consume<'e, E>(
    executor: E,
    account_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<QuotaRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"UPDATE quotas
           SET used_count = used_count + 1, updated_at = NOW()
           WHERE account_id = $1
             AND status = 'active'
             AND plan_id <> $2
             AND (expires_at IS NULL OR expires_at > $3)
             AND used_count < plan_limit
           RETURNING {QUOTA_COLUMNS}"#
    );
    sqlx::query_as(&query)
        .bind(account_id)
        .bind(EXPIRED_PLAN_ID)
        .bind(now)
        .fetch_optional(executor)
        .await
}

/// Overwrite every stored field of the record.
pub async fn write_quota<'e, E>(executor: E, record: &QuotaRecord) -> Result<QuotaRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"UPDATE quotas
           SET plan_id = $2, plan_name = $3, plan_limit = $4, used_count = $5,
               expires_at = $6, status = $7, updated_at = NOW()
           WHERE account_id = $1
           RETURNING {QUOTA_COLUMNS}"#
    );
    sqlx::query_as(&query)
        .bind(record.account_id)
        .bind(&record.plan_id)
        .bind(&record.plan_name)
        .bind(record.limit)
        .bind(record.count)
        .bind(record.expires_at)
        .bind(record.status.as_str())
        .fetch_one(executor)
        .await
}

pub async fn reset_count<'e, E>(executor: E, account_id: i64) -> Result<QuotaRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"UPDATE quotas SET used_count = 0, updated_at = NOW()
           WHERE account_id = $1
           RETURNING {QUOTA_COLUMNS}"#
    );
    sqlx::query_as(&query)
        .bind(account_id)
        .fetch_one(executor)
        .await
}
