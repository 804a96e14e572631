use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub club_id: Uuid,
    pub kind: TransactionKind,
    /// Positive amount in cents.
    pub amount_cents: i64,
    pub category: String,
    pub status: TransactionStatus,
    /// Points minted for the beneficiary when an income entry completes.
    pub points: i64,
    pub payer_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub proof_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TransactionKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TransactionStatus {
    /// Cash expected later; settled by the treasurer.
    Pending,
    /// Member submitted proof of payment; needs human approval.
    WaitingApproval,
    Completed,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub club_id: Uuid,
    pub kind: TransactionKind,
    pub amount_cents: i64,
    pub category: String,
    pub status: TransactionStatus,
    pub points: i64,
    pub payer_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub proof_url: Option<String>,
}

/// Outcome of a bulk create. Each member's entry is independent; a failure
/// for one never blocks the rest.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BulkCreateReport {
    pub created: Vec<Transaction>,
    pub failures: Vec<BulkCreateFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCreateFailure {
    pub member_id: Uuid,
    pub error: String,
}

/// Ledger truth: filtered sums over completed rows, recomputed per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubBalance {
    pub club_id: Uuid,
    pub income_cents: i64,
    pub expense_cents: i64,
    pub balance_cents: i64,
}

/// Durable record of a refund debit that had to be clamped because the
/// member had already spent the points elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointDiscrepancy {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub member_id: Uuid,
    pub expected_debit: i64,
    pub actual_debit: i64,
    pub recorded_at: DateTime<Utc>,
}
