use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use crate::{
    domain::*,
    error::{AppError, Result},
    integrations::{IntegrationEvent, IntegrationManager},
    repository::ClubRepository,
};

/// Actor recorded in history rows written by the scheduled sweep.
pub const BILLING_CLOCK_ACTOR: &str = "billing-clock";

/// The billing clock: one idempotent pass over all billable clubs,
/// advancing them through warning and suspension as dues lapse.
pub struct BillingService {
    repo: Arc<dyn ClubRepository>,
    integration_manager: Arc<IntegrationManager>,
}

/// What one sweep run did. Failures are per club; one club's storage error
/// never aborts the rest of the pass.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweepReport {
    pub evaluated: usize,
    pub warned: Vec<Uuid>,
    pub suspended: Vec<Uuid>,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepFailure {
    pub club_id: Uuid,
    pub error: String,
}

enum SweepAction {
    Warned,
    Suspended,
}

impl BillingService {
    pub fn new(
        repo: Arc<dyn ClubRepository>,
        integration_manager: Arc<IntegrationManager>,
    ) -> Self {
        Self { repo, integration_manager }
    }

    /// Evaluates every Active/Trial/PaymentWarning club against `now`.
    /// Idempotent: a club only transitions (and notifies) when its computed
    /// target differs from its stored status, so re-running with the same
    /// `now` adds no history rows and no events. Never suspends into
    /// Blocked and never touches an already-Suspended club.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let clubs = self.repo.list_billable().await?;
        let mut report = SweepReport {
            evaluated: clubs.len(),
            ..Default::default()
        };

        for club in clubs {
            match self.evaluate_club(&club, now).await {
                Ok(Some(SweepAction::Warned)) => report.warned.push(club.id),
                Ok(Some(SweepAction::Suspended)) => report.suspended.push(club.id),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Sweep failed for club {}: {}", club.id, e);
                    report.failures.push(SweepFailure {
                        club_id: club.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Billing sweep at {}: {} evaluated, {} warned, {} suspended, {} failed",
            now,
            report.evaluated,
            report.warned.len(),
            report.suspended.len(),
            report.failures.len()
        );

        Ok(report)
    }

    async fn evaluate_club(&self, club: &Club, now: DateTime<Utc>) -> Result<Option<SweepAction>> {
        let due = match club.next_payment_due {
            Some(due) => due,
            None => return Ok(None),
        };
        let cutoff = due + Duration::days(club.grace_period_days);

        if now > cutoff {
            // CAS on the status we read: if an admin moved the club while
            // the sweep was running, skip it rather than clobber.
            let updated = self.repo.apply_transition(club.id, StatusTransition {
                expected: Some(club.status.clone()),
                to: ClubStatus::Suspended,
                changed_by: BILLING_CLOCK_ACTOR.to_string(),
                reason: Some("payment overdue beyond grace period".to_string()),
                billing: BillingUpdate::default(),
            }).await?;

            self.integration_manager
                .handle_event(IntegrationEvent::ClubSuspended(updated))
                .await;

            Ok(Some(SweepAction::Suspended))
        } else if now > due && club.status != ClubStatus::PaymentWarning {
            let updated = self.repo.apply_transition(club.id, StatusTransition {
                expected: Some(club.status.clone()),
                to: ClubStatus::PaymentWarning,
                changed_by: BILLING_CLOCK_ACTOR.to_string(),
                reason: Some("payment overdue, inside grace period".to_string()),
                billing: BillingUpdate::default(),
            }).await?;

            self.integration_manager
                .handle_event(IntegrationEvent::ClubWarning(updated))
                .await;

            Ok(Some(SweepAction::Warned))
        } else {
            Ok(None)
        }
    }

    /// The only way out of PaymentWarning/Suspended/Blocked/Inactive:
    /// back to Active on a fresh billing cycle.
    pub async fn reactivate(
        &self,
        club_id: Uuid,
        plan: SubscriptionPlan,
        reactivated_by: &str,
    ) -> Result<Club> {
        let club = self.repo.find_by_id(club_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Club {} not found", club_id)))?;

        match club.status {
            ClubStatus::PaymentWarning
            | ClubStatus::Suspended
            | ClubStatus::Blocked
            | ClubStatus::Inactive => {}
            _ => {
                return Err(AppError::InvalidState(format!(
                    "Club {} cannot be reactivated from {:?}",
                    club_id, club.status
                )));
            }
        }

        let now = Utc::now();
        let updated = self.repo.apply_transition(club_id, StatusTransition {
            expected: Some(club.status.clone()),
            to: ClubStatus::Active,
            changed_by: reactivated_by.to_string(),
            reason: Some("subscription reactivated".to_string()),
            billing: BillingUpdate {
                subscription_plan: Some(plan.clone()),
                next_payment_due: Some(plan.advance(now)),
                last_payment_date: Some(now),
                ..Default::default()
            },
        }).await?;

        tracing::info!("Club {} reactivated on {:?} plan by {}", club_id, plan, reactivated_by);

        Ok(updated)
    }
}
