//! Fire-and-forget notification hook
//!
//! Delivery runs on its own task; a failing notifier is logged and never
//! affects the operation that triggered it.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::models::RequestStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    RequestSubmitted { request_id: i64 },
    RequestResubmitted { request_id: i64, resend_count: i32 },
    RequestStatusChanged { request_id: i64, status: RequestStatus },
    RequestCompleted { request_id: i64, files: usize },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, account_id: i64, event: NotificationEvent) -> Result<(), String>;
}

/// Default notifier: writes the event to the log.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, account_id: i64, event: NotificationEvent) -> Result<(), String> {
        tracing::info!(account_id, ?event, "notification");
        Ok(())
    }
}

pub fn dispatch(notifier: &Arc<dyn Notifier>, account_id: i64, event: NotificationEvent) {
    let notifier = notifier.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(account_id, event.clone()).await {
            tracing::warn!(account_id, ?event, error = %e, "notification failed");
        }
    });
}
