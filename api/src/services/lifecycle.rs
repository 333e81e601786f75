//! Fulfillment request lifecycle
//!
//! Every mutation is applied through `Store::modify_request`, which locks the
//! row, runs the model's transition check, and writes back only on success.

use chrono::Utc;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{
    ContentSnapshot, FileRef, FulfillmentRequest, QuotaRecord, RequestPayload, RequestStatus,
    ViewVersion,
};
use crate::services::notify::{self, NotificationEvent, Notifier};
use crate::store::{RequestFilter, Store, request_not_found};

/// Who is asking. Operators see every request; users only their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub account_id: i64,
    pub is_operator: bool,
}

#[derive(Clone)]
pub struct RequestLifecycle {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl RequestLifecycle {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Create a request. The credit is taken in the same unit as the insert,
    /// so a refused charge leaves nothing behind.
    pub async fn submit(
        &self,
        account_id: i64,
        payload: RequestPayload,
    ) -> Result<(FulfillmentRequest, QuotaRecord), CoreError> {
        payload.validate()?;
        let (request, quota) = self
            .store
            .insert_request_charged(account_id, payload, Utc::now())
            .await?;

        tracing::info!(
            account_id,
            request_id = request.id,
            remaining = quota.remaining(),
            "request submitted"
        );
        notify::dispatch(
            &self.notifier,
            account_id,
            NotificationEvent::RequestSubmitted {
                request_id: request.id,
            },
        );
        Ok((request, quota))
    }

    /// Owner edit of a pending or rejected request. Does not charge.
    pub async fn resubmit(
        &self,
        account_id: i64,
        request_id: i64,
        payload: RequestPayload,
    ) -> Result<FulfillmentRequest, CoreError> {
        payload.validate()?;
        let now = Utc::now();
        let request = self
            .store
            .modify_request(
                request_id,
                Box::new(move |request| {
                    if request.account_id != account_id {
                        return Err(CoreError::Forbidden(format!(
                            "request {request_id} belongs to another account"
                        )));
                    }
                    request.resubmit(payload, now)
                }),
            )
            .await?;

        tracing::info!(
            account_id,
            request_id,
            resend_count = request.resend_count,
            "request resubmitted"
        );
        notify::dispatch(
            &self.notifier,
            account_id,
            NotificationEvent::RequestResubmitted {
                request_id,
                resend_count: request.resend_count,
            },
        );
        Ok(request)
    }

    /// Operator status change, checked against the transition table.
    pub async fn set_status(
        &self,
        operator_id: i64,
        request_id: i64,
        status: RequestStatus,
        notes: Option<String>,
    ) -> Result<FulfillmentRequest, CoreError> {
        let now = Utc::now();
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let request = self
            .store
            .modify_request(
                request_id,
                Box::new(move |request| request.transition(status, notes, operator_id, now)),
            )
            .await
            .inspect_err(|e| {
                if let CoreError::InvalidTransition { from, to } = e {
                    tracing::warn!(request_id, operator_id, %from, %to, "rejected status change");
                }
            })?;

        tracing::info!(request_id, operator_id, status = %request.status, "request status set");
        notify::dispatch(
            &self.notifier,
            request.account_id,
            NotificationEvent::RequestStatusChanged {
                request_id,
                status: request.status,
            },
        );
        Ok(request)
    }

    /// Attach delivered files and finish the request.
    pub async fn complete(
        &self,
        operator_id: i64,
        request_id: i64,
        files: Vec<FileRef>,
    ) -> Result<FulfillmentRequest, CoreError> {
        let now = Utc::now();
        let request = self
            .store
            .modify_request(
                request_id,
                Box::new(move |request| request.complete(files, operator_id, now)),
            )
            .await?;

        tracing::info!(
            request_id,
            operator_id,
            files = request.completed_files.len(),
            "request completed"
        );
        notify::dispatch(
            &self.notifier,
            request.account_id,
            NotificationEvent::RequestCompleted {
                request_id,
                files: request.completed_files.len(),
            },
        );
        Ok(request)
    }

    pub async fn get(&self, viewer: Viewer, request_id: i64) -> Result<FulfillmentRequest, CoreError> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| request_not_found(request_id))?;
        if !viewer.is_operator && request.account_id != viewer.account_id {
            return Err(CoreError::Forbidden(format!(
                "request {request_id} belongs to another account"
            )));
        }
        Ok(request)
    }

    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<FulfillmentRequest>, CoreError> {
        self.store.list_requests(filter).await
    }

    /// One coherent snapshot, never a mix of current and original fields.
    pub async fn view(
        &self,
        viewer: Viewer,
        request_id: i64,
        version: ViewVersion,
    ) -> Result<ContentSnapshot, CoreError> {
        self.get(viewer, request_id).await?.view(version)
    }
}
