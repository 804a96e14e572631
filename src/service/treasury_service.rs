use std::sync::Arc;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::{
    domain::*,
    error::{AppError, Result},
    repository::{ClubRepository, MemberRepository, PointsStore, TransactionRepository},
};

/// The club treasury: ledger entries, settlement, proof approval, refunds,
/// and the point grants that ride on income entries. All point mutations
/// flow through the `PointsStore` capability held here.
pub struct TreasuryService {
    repo: Arc<dyn TransactionRepository>,
    clubs: Arc<dyn ClubRepository>,
    members: Arc<dyn MemberRepository>,
    points: Arc<dyn PointsStore>,
}

impl TreasuryService {
    pub fn new(
        repo: Arc<dyn TransactionRepository>,
        clubs: Arc<dyn ClubRepository>,
        members: Arc<dyn MemberRepository>,
        points: Arc<dyn PointsStore>,
    ) -> Self {
        Self { repo, clubs, members, points }
    }

    pub async fn create(&self, request: CreateTransactionRequest) -> Result<Transaction> {
        Self::validate(&request)?;

        self.clubs.find_by_id(request.club_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Club {} not found", request.club_id)))?;

        // The beneficiary must exist before a row referencing them lands,
        // so a bad id fails the entry cleanly instead of at settlement.
        if let Some(member_id) = request.member_id {
            self.members.find_by_id(member_id).await?
                .ok_or_else(|| AppError::NotFound(format!("Member {} not found", member_id)))?;
        }

        let transaction = self.repo.create(request).await?;

        // A row born Completed was paid on the spot, so its grant applies
        // immediately; Pending/WaitingApproval rows carry the grant until
        // settlement confirms the cash.
        if transaction.status == TransactionStatus::Completed {
            self.apply_point_grant(&transaction).await?;
        }

        Ok(transaction)
    }

    /// Expands one template into an independent ledger row per beneficiary.
    /// Deliberately not all-or-nothing: a failure for member i is reported
    /// and never blocks member i+1.
    pub async fn create_bulk(
        &self,
        template: CreateTransactionRequest,
        member_ids: &[Uuid],
    ) -> Result<BulkCreateReport> {
        let mut report = BulkCreateReport::default();

        for member_id in member_ids {
            let mut request = template.clone();
            request.member_id = Some(*member_id);

            match self.create(request).await {
                Ok(transaction) => report.created.push(transaction),
                Err(e) => {
                    tracing::error!(
                        "Bulk create failed for member {}: {}",
                        member_id,
                        e
                    );
                    report.failures.push(BulkCreateFailure {
                        member_id: *member_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Marks a pending entry as paid. The compare-and-set in the store
    /// guarantees that of two racing settles exactly one completes the row
    /// and credits points; the loser observes `InvalidState`.
    pub async fn settle(&self, id: Uuid, payment_date: DateTime<Utc>) -> Result<Transaction> {
        let existing = self.repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

        if existing.status != TransactionStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Transaction {} cannot be settled from {:?}",
                id, existing.status
            )));
        }

        let updated = self.repo
            .transition(
                id,
                TransactionStatus::Pending,
                TransactionStatus::Completed,
                Some(payment_date),
            )
            .await?
            .ok_or_else(|| AppError::InvalidState(format!(
                "Transaction {} was settled concurrently",
                id
            )))?;

        self.apply_point_grant(&updated).await?;

        Ok(updated)
    }

    /// Accepts a member-submitted proof of payment. Behaves like settle,
    /// but only from WaitingApproval.
    pub async fn approve(&self, id: Uuid) -> Result<Transaction> {
        let existing = self.repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

        if existing.status != TransactionStatus::WaitingApproval {
            return Err(AppError::InvalidState(format!(
                "Transaction {} cannot be approved from {:?}",
                id, existing.status
            )));
        }

        let updated = self.repo
            .transition(
                id,
                TransactionStatus::WaitingApproval,
                TransactionStatus::Completed,
                Some(Utc::now()),
            )
            .await?
            .ok_or_else(|| AppError::InvalidState(format!(
                "Transaction {} was approved concurrently",
                id
            )))?;

        self.apply_point_grant(&updated).await?;

        Ok(updated)
    }

    /// Turns down a member-submitted proof. No points, no balance effect.
    pub async fn reject(&self, id: Uuid) -> Result<Transaction> {
        let existing = self.repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

        if existing.status != TransactionStatus::WaitingApproval {
            return Err(AppError::InvalidState(format!(
                "Transaction {} cannot be rejected from {:?}",
                id, existing.status
            )));
        }

        self.repo
            .transition(
                id,
                TransactionStatus::WaitingApproval,
                TransactionStatus::Canceled,
                None,
            )
            .await?
            .ok_or_else(|| AppError::InvalidState(format!(
                "Transaction {} was rejected concurrently",
                id
            )))
    }

    /// Reverses a completed entry. Points credited for it are debited back
    /// symmetrically, clamped at a zero balance; any shortfall (the member
    /// already spent them) is recorded as a discrepancy.
    pub async fn refund(&self, id: Uuid) -> Result<Transaction> {
        let existing = self.repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

        if existing.status != TransactionStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "Transaction {} cannot be refunded from {:?}",
                id, existing.status
            )));
        }

        let updated = self.repo
            .transition(
                id,
                TransactionStatus::Completed,
                TransactionStatus::Canceled,
                None,
            )
            .await?
            .ok_or_else(|| AppError::InvalidState(format!(
                "Transaction {} was refunded concurrently",
                id
            )))?;

        if updated.kind == TransactionKind::Income && updated.points > 0 {
            if let Some(member_id) = updated.member_id {
                let outcome = self.points.debit_clamped(member_id, updated.points).await?;
                if outcome.shortfall > 0 {
                    tracing::warn!(
                        "Refund of transaction {} debited {} of {} points from member {}; recording {}-point discrepancy",
                        id,
                        outcome.debited,
                        updated.points,
                        member_id,
                        outcome.shortfall
                    );
                    self.points
                        .record_discrepancy(id, member_id, updated.points, outcome.debited)
                        .await?;
                }
            }
        }

        Ok(updated)
    }

    /// Hard delete. Completed rows are audit trail and can never be
    /// removed, only refunded.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let existing = self.repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

        match existing.status {
            TransactionStatus::Pending | TransactionStatus::WaitingApproval => {}
            _ => {
                return Err(AppError::InvalidState(format!(
                    "Transaction {} cannot be removed from {:?}",
                    id, existing.status
                )));
            }
        }

        if !self.repo.delete_if_open(id).await? {
            return Err(AppError::InvalidState(format!(
                "Transaction {} changed state before removal",
                id
            )));
        }

        Ok(())
    }

    /// Ledger truth, recomputed from completed rows on every call.
    pub async fn balance(&self, club_id: Uuid) -> Result<ClubBalance> {
        self.repo.balance(club_id).await
    }

    pub async fn list_for_club(&self, club_id: Uuid) -> Result<Vec<Transaction>> {
        self.repo.list_by_club(club_id).await
    }

    fn validate(request: &CreateTransactionRequest) -> Result<()> {
        if request.amount_cents <= 0 {
            return Err(AppError::Validation(
                "Transaction amount must be positive".to_string(),
            ));
        }

        if request.points < 0 {
            return Err(AppError::Validation(
                "Points cannot be negative".to_string(),
            ));
        }

        if request.points > 0 && request.kind != TransactionKind::Income {
            return Err(AppError::Validation(
                "Points can only be granted on income entries".to_string(),
            ));
        }

        match request.status {
            TransactionStatus::Pending
            | TransactionStatus::WaitingApproval
            | TransactionStatus::Completed => Ok(()),
            TransactionStatus::Canceled => Err(AppError::Validation(
                "Transactions cannot be created as Canceled".to_string(),
            )),
        }
    }

    async fn apply_point_grant(&self, transaction: &Transaction) -> Result<()> {
        if transaction.kind != TransactionKind::Income || transaction.points == 0 {
            return Ok(());
        }

        if let Some(member_id) = transaction.member_id {
            self.points.credit(member_id, transaction.points).await?;
            tracing::info!(
                "Credited {} points to member {} for transaction {}",
                transaction.points,
                member_id,
                transaction.id
            );
        }

        Ok(())
    }
}
