use std::sync::Arc;
use chrono::{Duration, Utc};
use uuid::Uuid;
use crate::{
    domain::*,
    error::{AppError, Result},
    integrations::{IntegrationEvent, IntegrationManager},
    repository::{ClubRepository, MemberRepository},
};

/// Takes clubs out of the approval queue: into a trial, straight onto a
/// paid plan, or blocked with a reason.
pub struct ApprovalService {
    repo: Arc<dyn ClubRepository>,
    members: Arc<dyn MemberRepository>,
    integration_manager: Arc<IntegrationManager>,
}

impl ApprovalService {
    pub fn new(
        repo: Arc<dyn ClubRepository>,
        members: Arc<dyn MemberRepository>,
        integration_manager: Arc<IntegrationManager>,
    ) -> Self {
        Self { repo, members, integration_manager }
    }

    /// Approves a club. Deliberately not idempotent: a second call
    /// re-approves and re-dates the club, so double-submission must be
    /// guarded at the edge.
    pub async fn approve(
        &self,
        club_id: Uuid,
        approver: Uuid,
        request: ApproveClubRequest,
    ) -> Result<Club> {
        let club = self.repo.find_by_id(club_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Club {} not found", club_id)))?;

        let now = Utc::now();
        let transition = if request.grant_trial && request.trial_days > 0 {
            let trial_ends = now + Duration::days(request.trial_days);
            StatusTransition {
                expected: None,
                to: ClubStatus::Trial,
                changed_by: approver.to_string(),
                reason: Some(format!("approved with {}-day trial", request.trial_days)),
                billing: BillingUpdate {
                    subscription_plan: request.subscription_plan.clone(),
                    trial_ends_at: Some(trial_ends),
                    next_payment_due: Some(trial_ends),
                    approved_at: Some(now),
                    approved_by: Some(approver),
                    approval_notes: request.notes.clone(),
                    ..Default::default()
                },
            }
        } else {
            let plan = request
                .subscription_plan
                .clone()
                .unwrap_or_else(|| club.subscription_plan.clone());
            StatusTransition {
                expected: None,
                to: ClubStatus::Active,
                changed_by: approver.to_string(),
                reason: Some("approved".to_string()),
                billing: BillingUpdate {
                    subscription_plan: Some(plan.clone()),
                    next_payment_due: Some(plan.advance(now)),
                    last_payment_date: Some(now),
                    approved_at: Some(now),
                    approved_by: Some(approver),
                    approval_notes: request.notes.clone(),
                    ..Default::default()
                },
            }
        };

        let updated = self.repo.apply_transition(club_id, transition).await?;

        tracing::info!(
            "Club {} approved by {} into {:?}",
            club_id,
            approver,
            updated.status
        );

        self.integration_manager
            .handle_event(IntegrationEvent::ClubApproved(updated.clone()))
            .await;

        Ok(updated)
    }

    pub async fn reject(&self, club_id: Uuid, rejected_by: Uuid, reason: &str) -> Result<Club> {
        if reason.trim().is_empty() {
            return Err(AppError::Validation(
                "Rejection reason is required".to_string(),
            ));
        }

        let updated = self.repo.apply_transition(club_id, StatusTransition {
            expected: None,
            to: ClubStatus::Blocked,
            changed_by: rejected_by.to_string(),
            reason: Some(reason.to_string()),
            billing: BillingUpdate {
                approval_notes: Some(reason.to_string()),
                ..Default::default()
            },
        }).await?;

        tracing::info!("Club {} rejected by {}: {}", club_id, rejected_by, reason);

        Ok(updated)
    }

    /// Grants a trial to any existing club, not only a pending one. Used
    /// for second-chance trials on suspended clubs; the prior status lands
    /// in the history row.
    pub async fn grant_trial(
        &self,
        club_id: Uuid,
        granted_by: Uuid,
        trial_days: i64,
    ) -> Result<Club> {
        if trial_days <= 0 {
            return Err(AppError::Validation(
                "Trial length must be at least one day".to_string(),
            ));
        }

        let now = Utc::now();
        let trial_ends = now + Duration::days(trial_days);

        let updated = self.repo.apply_transition(club_id, StatusTransition {
            expected: None,
            to: ClubStatus::Trial,
            changed_by: granted_by.to_string(),
            reason: Some(format!("{}-day trial granted", trial_days)),
            billing: BillingUpdate {
                trial_ends_at: Some(trial_ends),
                next_payment_due: Some(trial_ends),
                ..Default::default()
            },
        }).await?;

        tracing::info!("Club {} granted {}-day trial by {}", club_id, trial_days, granted_by);

        Ok(updated)
    }

    /// Generic escape hatch. Always audited.
    pub async fn change_status(
        &self,
        club_id: Uuid,
        new_status: ClubStatus,
        changed_by: &str,
        reason: Option<String>,
    ) -> Result<Club> {
        self.repo.apply_transition(club_id, StatusTransition {
            expected: None,
            to: new_status,
            changed_by: changed_by.to_string(),
            reason,
            billing: BillingUpdate::default(),
        }).await
    }

    /// Approval queue, oldest application first, each club joined with its
    /// owner for contact.
    pub async fn list_pending(&self) -> Result<Vec<PendingClub>> {
        let clubs = self.repo.list_pending().await?;

        let mut pending = Vec::with_capacity(clubs.len());
        for club in clubs {
            match self.members.find_by_id(club.owner_user_id).await? {
                Some(owner) => pending.push(PendingClub { club, owner }),
                None => {
                    tracing::warn!(
                        "Club {} has no owner record {}, skipping in pending list",
                        club.id,
                        club.owner_user_id
                    );
                }
            }
        }

        Ok(pending)
    }

    /// Per-status counts for the dashboard. Pure read.
    pub async fn metrics(&self) -> Result<ApprovalMetrics> {
        self.repo.count_by_status().await
    }
}
