use std::sync::Arc;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::{
    domain::*,
    error::{AppError, Result},
    integrations::{IntegrationEvent, IntegrationManager},
    repository::{ClubRepository, PaymentRepository},
};

/// The opaque confirm/refund capability around gateway payment records.
/// Confirming a subscription payment is the single path that puts a club
/// onto a fresh billing cycle.
pub struct PaymentService {
    repo: Arc<dyn PaymentRepository>,
    clubs: Arc<dyn ClubRepository>,
    integration_manager: Arc<IntegrationManager>,
}

impl PaymentService {
    pub fn new(
        repo: Arc<dyn PaymentRepository>,
        clubs: Arc<dyn ClubRepository>,
        integration_manager: Arc<IntegrationManager>,
    ) -> Self {
        Self { repo, clubs, integration_manager }
    }

    pub async fn create(&self, request: CreatePaymentRequest) -> Result<Payment> {
        self.clubs.find_by_id(request.club_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Club {} not found", request.club_id)))?;

        self.repo.create(request).await
    }

    /// Confirms a pending payment (admin action or gateway webhook). For
    /// Subscription/Renewal payments the club moves to Active with
    /// `next_payment_due` one plan interval out; MemberAddition payments
    /// leave billing dates alone. Blocked clubs stay blocked; escape from
    /// Blocked is an explicit reactivation, never a side effect.
    pub async fn confirm(&self, id: Uuid, confirmed_by: Uuid) -> Result<Payment> {
        let existing = self.repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", id)))?;

        if existing.status != PaymentStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Payment {} cannot be confirmed from {:?}",
                id, existing.status
            )));
        }

        let now = Utc::now();
        let payment = self.repo
            .transition(
                id,
                PaymentStatus::Pending,
                PaymentStatus::Confirmed,
                Some(now),
                Some(confirmed_by),
            )
            .await?
            .ok_or_else(|| AppError::InvalidState(format!(
                "Payment {} was confirmed concurrently",
                id
            )))?;

        let club = self.clubs.find_by_id(payment.club_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Club {} not found", payment.club_id)))?;

        let club = match payment.kind {
            PaymentKind::MemberAddition => club,
            PaymentKind::Subscription | PaymentKind::Renewal => {
                if club.status == ClubStatus::Blocked {
                    tracing::warn!(
                        "Payment {} confirmed for blocked club {}; not activating",
                        id,
                        club.id
                    );
                    club
                } else {
                    self.activate_club(club, confirmed_by, now).await?
                }
            }
        };

        tracing::info!("Payment {} confirmed by {} for club {}", id, confirmed_by, club.id);

        self.integration_manager
            .handle_event(IntegrationEvent::PaymentConfirmed {
                club,
                payment: payment.clone(),
            })
            .await;

        Ok(payment)
    }

    pub async fn refund(&self, id: Uuid, refunded_by: Uuid) -> Result<Payment> {
        let existing = self.repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", id)))?;

        if existing.status != PaymentStatus::Confirmed {
            return Err(AppError::InvalidState(format!(
                "Payment {} cannot be refunded from {:?}",
                id, existing.status
            )));
        }

        let updated = self.repo
            .transition(id, PaymentStatus::Confirmed, PaymentStatus::Refunded, None, None)
            .await?
            .ok_or_else(|| AppError::InvalidState(format!(
                "Payment {} was refunded concurrently",
                id
            )))?;

        tracing::info!("Payment {} refunded by {}", id, refunded_by);

        Ok(updated)
    }

    /// Expires pending payments whose deadline has passed. Run from the
    /// billing-clock tick.
    pub async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let expired = self.repo.expire_pending(now).await?;
        if !expired.is_empty() {
            tracing::info!("Expired {} pending payments", expired.len());
        }
        Ok(expired)
    }

    pub async fn list_for_club(&self, club_id: Uuid) -> Result<Vec<Payment>> {
        self.repo.list_by_club(club_id).await
    }

    async fn activate_club(
        &self,
        club: Club,
        confirmed_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Club> {
        let plan = club.subscription_plan.clone();
        let reason = if club.status == ClubStatus::Active {
            "subscription renewed"
        } else {
            "payment confirmed"
        };

        self.clubs.apply_transition(club.id, StatusTransition {
            expected: Some(club.status.clone()),
            to: ClubStatus::Active,
            changed_by: confirmed_by.to_string(),
            reason: Some(reason.to_string()),
            billing: BillingUpdate {
                next_payment_due: Some(plan.advance(now)),
                last_payment_date: Some(now),
                ..Default::default()
            },
        }).await
    }
}
