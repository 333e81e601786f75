//! Credit ledger record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::EXPIRED_PLAN_ID;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Inactive,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => PlanStatus::Active,
            _ => PlanStatus::Inactive,
        }
    }
}

/// The single authoritative credit row of an account.
///
/// `remaining` is never stored; see [`QuotaRecord::remaining`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub account_id: i64,
    pub plan_id: String,
    pub plan_name: String,
    pub limit: i32,
    pub count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: PlanStatus,
}

impl QuotaRecord {
    /// Record for an account that never had a plan.
    pub fn no_plan(account_id: i64) -> Self {
        Self {
            account_id,
            plan_id: EXPIRED_PLAN_ID.to_string(),
            plan_name: "No plan".to_string(),
            limit: 0,
            count: 0,
            expires_at: None,
            status: PlanStatus::Inactive,
        }
    }

    pub fn remaining(&self) -> i32 {
        (self.limit - self.count).max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PlanStatus::Inactive
            || self.plan_id == EXPIRED_PLAN_ID
            || self.expires_at.is_some_and(|at| at <= now)
    }

    /// Same record with `status` reflecting a passed expiry date.
    pub fn effective(mut self, now: DateTime<Utc>) -> Self {
        if self.is_expired(now) {
            self.status = PlanStatus::Inactive;
        }
        self
    }

    /// Whether one more credit may be taken. Does not mutate.
    pub fn ensure_consumable(&self, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.is_expired(now) {
            return Err(CoreError::PlanExpired);
        }
        if self.count >= self.limit {
            return Err(CoreError::QuotaExceeded {
                limit: self.limit,
                count: self.count,
            });
        }
        Ok(())
    }

    /// Operator plan change. `count` only moves when `reset_count` is set.
    pub fn apply_plan(&mut self, update: &PlanUpdate) {
        self.plan_id = update.plan_id.clone();
        self.plan_name = update
            .plan_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| update.plan_id.clone());
        self.limit = update.limit.max(0);
        self.expires_at = update.expires_at;
        self.status = if update.plan_id == EXPIRED_PLAN_ID {
            PlanStatus::Inactive
        } else {
            PlanStatus::Active
        };
        if update.reset_count {
            self.count = 0;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanUpdate {
    pub plan_id: String,
    #[serde(default)]
    pub plan_name: Option<String>,
    pub limit: i32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reset_count: bool,
}

/// API view of a record with the derived `remaining` field.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSummary {
    #[serde(flatten)]
    pub record: QuotaRecord,
    pub remaining: i32,
}

impl From<QuotaRecord> for QuotaSummary {
    fn from(record: QuotaRecord) -> Self {
        let remaining = record.remaining();
        Self { record, remaining }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn active(limit: i32, count: i32) -> QuotaRecord {
        QuotaRecord {
            account_id: 1,
            plan_id: "pro".into(),
            plan_name: "Pro".into(),
            limit,
            count,
            expires_at: None,
            status: PlanStatus::Active,
        }
    }

    #[test]
    fn remaining_never_negative() {
        assert_eq!(active(3, 1).remaining(), 2);
        assert_eq!(active(3, 5).remaining(), 0);
        assert_eq!(QuotaRecord::no_plan(9).remaining(), 0);
    }

    #[test]
    fn consumable_checks_expiry_before_count() {
        let now = Utc::now();
        assert!(active(3, 2).ensure_consumable(now).is_ok());
        assert!(matches!(
            active(3, 3).ensure_consumable(now),
            Err(CoreError::QuotaExceeded { limit: 3, count: 3 })
        ));
        assert!(matches!(
            QuotaRecord::no_plan(1).ensure_consumable(now),
            Err(CoreError::PlanExpired)
        ));

        let mut lapsed = active(3, 0);
        lapsed.expires_at = Some(now - Duration::minutes(1));
        assert!(matches!(
            lapsed.ensure_consumable(now),
            Err(CoreError::PlanExpired)
        ));
        assert_eq!(lapsed.effective(now).status, PlanStatus::Inactive);
    }

    #[test]
    fn plan_change_keeps_count_unless_reset() {
        let mut record = active(3, 2);
        record.apply_plan(&PlanUpdate {
            plan_id: "team".into(),
            plan_name: None,
            limit: 10,
            expires_at: None,
            reset_count: false,
        });
        assert_eq!(record.count, 2);
        assert_eq!(record.plan_name, "team");
        assert_eq!(record.status, PlanStatus::Active);

        record.apply_plan(&PlanUpdate {
            plan_id: EXPIRED_PLAN_ID.into(),
            plan_name: Some("Lapsed".into()),
            limit: 0,
            expires_at: None,
            reset_count: true,
        });
        assert_eq!(record.count, 0);
        assert_eq!(record.status, PlanStatus::Inactive);
    }
}
