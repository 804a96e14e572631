use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Member;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Club {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: Uuid,
    pub status: ClubStatus,
    pub subscription_plan: SubscriptionPlan,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub next_payment_due: Option<DateTime<Utc>>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub grace_period_days: i64,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub approval_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClubStatus {
    PendingApproval,
    Trial,
    Active,
    PaymentWarning,
    Suspended,
    Blocked,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SubscriptionPlan {
    Monthly,
    Quarterly,
    Annual,
}

impl SubscriptionPlan {
    fn months(&self) -> u32 {
        match self {
            SubscriptionPlan::Monthly => 1,
            SubscriptionPlan::Quarterly => 3,
            SubscriptionPlan::Annual => 12,
        }
    }

    /// Next due date one billing interval after `from`. Calendar-aware:
    /// Jan 31 + 1 month lands on the last day of February, not 30 days out.
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from.checked_add_months(Months::new(self.months())).unwrap_or(from)
    }
}

/// Append-only audit row. Every club status mutation writes exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubStatusHistory {
    pub id: Uuid,
    pub club_id: Uuid,
    pub from_status: ClubStatus,
    pub to_status: ClubStatus,
    pub changed_by: String,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClubRequest {
    pub name: String,
    pub owner_user_id: Uuid,
    pub subscription_plan: SubscriptionPlan,
    pub grace_period_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveClubRequest {
    pub grant_trial: bool,
    pub trial_days: i64,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub notes: Option<String>,
}

/// A status change plus the billing fields that move with it, applied
/// atomically with its history row. `expected` makes the change
/// compare-and-set: the transition fails if the club has moved on.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub expected: Option<ClubStatus>,
    pub to: ClubStatus,
    pub changed_by: String,
    pub reason: Option<String>,
    pub billing: BillingUpdate,
}

/// Billing/approval fields to set alongside a transition. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct BillingUpdate {
    pub subscription_plan: Option<SubscriptionPlan>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub next_payment_due: Option<DateTime<Utc>>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub approval_notes: Option<String>,
}

/// A pending club joined with its owner for contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingClub {
    pub club: Club,
    pub owner: Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApprovalMetrics {
    pub pending: i64,
    pub trial: i64,
    pub active: i64,
    pub payment_warning: i64,
    pub suspended: i64,
    pub blocked: i64,
    pub inactive: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn advance_is_calendar_aware() {
        let jan31 = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let feb29 = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        assert_eq!(SubscriptionPlan::Monthly.advance(jan31), feb29);

        let oct31 = Utc.with_ymd_and_hms(2023, 10, 31, 0, 0, 0).unwrap();
        let jan31_next = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(SubscriptionPlan::Quarterly.advance(oct31), jan31_next);

        let leap_day = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        let feb28_2025 = Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap();
        assert_eq!(SubscriptionPlan::Annual.advance(leap_day), feb28_2025);
    }
}
