//! Fulfillment request model and its status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};

use super::file::FileRef;
use crate::error::CoreError;

/// Request status.
///
/// ```text
/// pending ──> in_progress ──> completed
///    │  ^          │
///    v  │          v
///  rejected <──────┘
/// ```
/// `rejected -> pending` happens on resubmission; `completed` is final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "in_progress" => Some(RequestStatus::InProgress),
            "completed" => Some(RequestStatus::Completed),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (*self, next),
            (Pending, InProgress)
                | (Pending, Rejected)
                | (InProgress, Completed)
                | (InProgress, Rejected)
                | (Rejected, Pending)
        )
    }

    /// No transition leaves a terminal status, not even a notes-only update.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed)
    }

    /// The operator half of the table. `rejected -> pending` is left to the
    /// owner's resubmission, which also snapshots the prior content.
    pub fn operator_can_move_to(&self, next: RequestStatus) -> bool {
        self.can_transition_to(next)
            && !matches!((*self, next), (RequestStatus::Rejected, RequestStatus::Pending))
    }

    /// Statuses an operator may complete from; pending passes through in_progress.
    pub fn accepts_completion(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::InProgress)
    }

    /// Statuses from which the owner may edit and resubmit.
    pub fn accepts_resubmission(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Rejected)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Stored as TEXT
impl Type<Postgres> for RequestStatus {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for RequestStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Postgres>>::decode(value)?;
        RequestStatus::from_str(&s).ok_or_else(|| format!("unknown request status: {s}").into())
    }
}

impl Encode<'_, Postgres> for RequestStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <String as Encode<Postgres>>::encode_by_ref(&self.as_str().to_owned(), buf)
    }
}

/// The user-editable part of a request, captured as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub content_snapshot: String,
    pub files: Vec<FileRef>,
    pub title: String,
    pub description: String,
}

/// What the user sends on submit and on resubmit.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_video_id: Option<String>,
    pub carousel_type: String,
    pub content_snapshot: String,
    #[serde(default)]
    pub uploaded_files: Vec<FileRef>,
}

impl RequestPayload {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::BadRequest("A title is required.".into()));
        }
        if self.content_snapshot.trim().is_empty() {
            return Err(CoreError::BadRequest(
                "The request has no content to fulfill.".into(),
            ));
        }
        if self.carousel_type.trim().is_empty() {
            return Err(CoreError::BadRequest("A carousel type is required.".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewVersion {
    Current,
    Original,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FulfillmentRequest {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub description: String,
    pub source_video_id: Option<String>,
    pub carousel_type: String,
    pub content_snapshot: String,
    pub uploaded_files: Vec<FileRef>,
    pub status: RequestStatus,
    pub admin_notes: Option<String>,
    pub assigned_operator: Option<i64>,
    pub resend_count: i32,
    pub was_modified: bool,
    pub original_content: Option<ContentSnapshot>,
    pub completed_files: Vec<FileRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FulfillmentRequest {
    /// Fresh request as created on submission.
    pub fn new(id: i64, account_id: i64, payload: RequestPayload, now: DateTime<Utc>) -> Self {
        Self {
            id,
            account_id,
            title: payload.title,
            description: payload.description,
            source_video_id: payload.source_video_id,
            carousel_type: payload.carousel_type,
            content_snapshot: payload.content_snapshot,
            uploaded_files: payload.uploaded_files,
            status: RequestStatus::Pending,
            admin_notes: None,
            assigned_operator: None,
            resend_count: 0,
            was_modified: false,
            original_content: None,
            completed_files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn current_content(&self) -> ContentSnapshot {
        ContentSnapshot {
            content_snapshot: self.content_snapshot.clone(),
            files: self.uploaded_files.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }

    /// One coherent snapshot; fields are never mixed across versions.
    pub fn view(&self, version: ViewVersion) -> Result<ContentSnapshot, CoreError> {
        match version {
            ViewVersion::Current => Ok(self.current_content()),
            ViewVersion::Original => match (&self.original_content, self.was_modified) {
                (Some(original), true) => Ok(original.clone()),
                _ => Err(CoreError::NotFound(
                    "An original version of this request".into(),
                )),
            },
        }
    }

    /// Owner edit. The first resubmission preserves the prior content.
    pub fn resubmit(&mut self, payload: RequestPayload, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.accepts_resubmission() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: RequestStatus::Pending,
            });
        }
        payload.validate()?;

        if self.original_content.is_none() {
            self.original_content = Some(self.current_content());
        }
        self.title = payload.title;
        self.description = payload.description;
        self.source_video_id = payload.source_video_id;
        self.carousel_type = payload.carousel_type;
        self.content_snapshot = payload.content_snapshot;
        self.uploaded_files = payload.uploaded_files;
        self.was_modified = true;
        self.resend_count += 1;
        self.status = RequestStatus::Pending;
        self.updated_at = now;
        Ok(())
    }

    /// Operator status change. Re-setting a non-final status only updates notes.
    pub fn transition(
        &mut self,
        next: RequestStatus,
        notes: Option<String>,
        operator_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let notes_only = next == self.status && !self.status.is_terminal();
        if !notes_only && !self.status.operator_can_move_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if let Some(notes) = notes {
            self.admin_notes = Some(notes);
        }
        self.assigned_operator = Some(operator_id);
        self.updated_at = now;
        Ok(())
    }

    /// Attach delivered assets and finish. Pending requests pass through in_progress.
    pub fn complete(
        &mut self,
        files: Vec<FileRef>,
        operator_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if !self.status.accepts_completion() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: RequestStatus::Completed,
            });
        }
        if files.is_empty() {
            return Err(CoreError::BadRequest(
                "Completing a request needs at least one delivered file.".into(),
            ));
        }
        if self.status == RequestStatus::Pending {
            self.transition(RequestStatus::InProgress, None, operator_id, now)?;
        }
        self.transition(RequestStatus::Completed, None, operator_id, now)?;
        self.completed_files = files;
        Ok(())
    }
}
