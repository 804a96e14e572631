use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read model of the identity/org service: who a user is, which club they
/// belong to, and their point balance. The balance is only ever mutated
/// through the treasury's points capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub club_id: Option<Uuid>,
    pub email: String,
    pub full_name: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMemberRequest {
    pub email: String,
    pub full_name: String,
    pub club_id: Option<Uuid>,
}

/// Result of a clamped debit: how much actually came off the balance and
/// how much could not (already spent elsewhere).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DebitOutcome {
    pub debited: i64,
    pub shortfall: i64,
}
