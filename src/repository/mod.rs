use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::Result;

pub mod club_repository;
pub mod member_repository;
pub mod payment_repository;
pub mod transaction_repository;

pub use club_repository::SqliteClubRepository;
pub use member_repository::SqliteMemberRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use transaction_repository::SqliteTransactionRepository;

#[async_trait]
pub trait ClubRepository: Send + Sync {
    async fn create(&self, request: CreateClubRequest) -> Result<Club>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Club>>;
    /// Clubs awaiting approval, oldest application first.
    async fn list_pending(&self) -> Result<Vec<Club>>;
    /// Clubs the billing clock evaluates: Active/Trial/PaymentWarning with
    /// a due date on record.
    async fn list_billable(&self) -> Result<Vec<Club>>;
    async fn count_by_status(&self) -> Result<ApprovalMetrics>;
    /// Applies a status change and its audit row in one database
    /// transaction. Fails with `InvalidState` when `expected` no longer
    /// matches the stored status.
    async fn apply_transition(&self, id: Uuid, transition: StatusTransition) -> Result<Club>;
    async fn history_for(&self, club_id: Uuid) -> Result<Vec<ClubStatusHistory>>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create(&self, request: CreateTransactionRequest) -> Result<Transaction>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>>;
    async fn list_by_club(&self, club_id: Uuid) -> Result<Vec<Transaction>>;
    /// Conditional status move: succeeds only while the row is still in
    /// `from`. Returns `None` when another caller won the race (or the row
    /// is gone) so exactly one settle/refund can take effect.
    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Transaction>>;
    /// Hard delete, guarded to Pending/WaitingApproval rows.
    async fn delete_if_open(&self, id: Uuid) -> Result<bool>;
    async fn balance(&self, club_id: Uuid) -> Result<ClubBalance>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, request: CreatePaymentRequest) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn list_by_club(&self, club_id: Uuid) -> Result<Vec<Payment>>;
    /// Conditional status move, same contract as the ledger's.
    async fn transition(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        confirmed_at: Option<DateTime<Utc>>,
        confirmed_by: Option<Uuid>,
    ) -> Result<Option<Payment>>;
    /// Marks pending payments past their deadline as Expired.
    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn create(&self, request: CreateMemberRequest) -> Result<Member>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>>;
    async fn list_by_club(&self, club_id: Uuid) -> Result<Vec<Member>>;
}

/// The single gate onto member point balances. Only the treasury engine
/// (and the administrative reset) hold a handle to this.
#[async_trait]
pub trait PointsStore: Send + Sync {
    async fn credit(&self, member_id: Uuid, amount: i64) -> Result<Member>;
    /// Debits up to `amount`, clamping at a zero balance.
    async fn debit_clamped(&self, member_id: Uuid, amount: i64) -> Result<DebitOutcome>;
    /// Administrative override: balance back to zero.
    async fn reset(&self, member_id: Uuid) -> Result<Member>;
    async fn record_discrepancy(
        &self,
        transaction_id: Uuid,
        member_id: Uuid,
        expected_debit: i64,
        actual_debit: i64,
    ) -> Result<PointDiscrepancy>;
    async fn list_discrepancies(&self, member_id: Uuid) -> Result<Vec<PointDiscrepancy>>;
}
