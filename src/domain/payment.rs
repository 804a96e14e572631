use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription-scoped gateway record. Confirming one of these is the only
/// path that moves a club out of PendingApproval/Suspended into Active with
/// a fresh due date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub club_id: Uuid,
    pub kind: PaymentKind,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub metadata: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PaymentKind {
    Subscription,
    MemberAddition,
    Renewal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Expired,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub club_id: Uuid,
    pub kind: PaymentKind,
    pub amount_cents: i64,
    pub metadata: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
}
