use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use troupe::{
    domain::{
        ApprovalMetrics, BillingUpdate, Club, ClubStatus, ClubStatusHistory, CreateClubRequest,
        CreateMemberRequest, StatusTransition, SubscriptionPlan,
    },
    error::{AppError, Result as TroupeResult},
    integrations::{Integration, IntegrationEvent, IntegrationManager},
    repository::{ClubRepository, MemberRepository},
    service::{BillingService, ServiceContext, BILLING_CLOCK_ACTOR},
};

/// Captures events so tests can assert exactly what got notified.
#[derive(Default)]
struct RecordingIntegration {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingIntegration {
    fn recorded(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Integration for RecordingIntegration {
    fn name(&self) -> &str {
        "Recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> TroupeResult<()> {
        Ok(())
    }

    async fn handle_event(&self, event: &IntegrationEvent) -> TroupeResult<()> {
        let label = match event {
            IntegrationEvent::ClubApproved(_) => "approved",
            IntegrationEvent::ClubWarning(_) => "warning",
            IntegrationEvent::ClubSuspended(_) => "suspended",
            IntegrationEvent::PaymentConfirmed { .. } => "payment",
        };
        self.events.lock().unwrap().push(label);
        Ok(())
    }
}

async fn setup() -> anyhow::Result<(ServiceContext, Arc<RecordingIntegration>)> {
    let pool = SqlitePool::connect(":memory:").await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let recorder = Arc::new(RecordingIntegration::default());
    let manager = Arc::new(IntegrationManager::new());
    manager.register(recorder.clone()).await;

    Ok((ServiceContext::new(pool, manager), recorder))
}

/// Creates a club and forces it into `status` with a fixed due date, the
/// state the sweep scenarios start from.
async fn club_with_due(
    ctx: &ServiceContext,
    status: ClubStatus,
    due: DateTime<Utc>,
    grace_period_days: i64,
) -> anyhow::Result<Club> {
    let owner = ctx.member_repo.create(CreateMemberRequest {
        email: format!("owner-{}@example.com", Uuid::new_v4()),
        full_name: "Club Owner".to_string(),
        club_id: None,
    }).await?;

    let club = ctx.club_repo.create(CreateClubRequest {
        name: "Swept Club".to_string(),
        owner_user_id: owner.id,
        subscription_plan: SubscriptionPlan::Monthly,
        grace_period_days,
    }).await?;

    Ok(ctx.club_repo.apply_transition(club.id, StatusTransition {
        expected: None,
        to: status,
        changed_by: "test".to_string(),
        reason: None,
        billing: BillingUpdate {
            next_payment_due: Some(due),
            last_payment_date: Some(due),
            ..Default::default()
        },
    }).await?)
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn test_sweep_timeline_warning_then_suspension() -> anyhow::Result<()> {
    let (ctx, recorder) = setup().await?;
    let due = at(2024, 1, 10);
    let club = club_with_due(&ctx, ClubStatus::Active, due, 5).await?;

    // Two days past due, inside the grace window
    let report = ctx.billing_service.sweep(at(2024, 1, 12)).await?;
    assert_eq!(report.warned, vec![club.id]);
    assert!(report.suspended.is_empty());
    let warned = ctx.club_repo.find_by_id(club.id).await?.unwrap();
    assert_eq!(warned.status, ClubStatus::PaymentWarning);

    // Same instant again: nothing new happens
    let report = ctx.billing_service.sweep(at(2024, 1, 12)).await?;
    assert!(report.warned.is_empty());
    assert!(report.suspended.is_empty());

    // Past the grace cutoff of Jan 15
    let report = ctx.billing_service.sweep(at(2024, 1, 20)).await?;
    assert_eq!(report.suspended, vec![club.id]);
    let suspended = ctx.club_repo.find_by_id(club.id).await?.unwrap();
    assert_eq!(suspended.status, ClubStatus::Suspended);

    // Suspended clubs are out of the billable set entirely
    let report = ctx.billing_service.sweep(at(2024, 1, 20)).await?;
    assert_eq!(report.evaluated, 0);

    // Setup transition + warning + suspension: exactly three audit rows,
    // and one notification per real transition
    let history = ctx.club_repo.history_for(club.id).await?;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].to_status, ClubStatus::PaymentWarning);
    assert_eq!(history[1].changed_by, BILLING_CLOCK_ACTOR);
    assert_eq!(history[2].to_status, ClubStatus::Suspended);
    assert_eq!(
        history[2].reason.as_deref(),
        Some("payment overdue beyond grace period")
    );
    assert_eq!(recorder.recorded(), vec!["warning", "suspended"]);

    Ok(())
}

#[tokio::test]
async fn test_sweep_leaves_current_clubs_alone() -> anyhow::Result<()> {
    let (ctx, recorder) = setup().await?;
    let club = club_with_due(&ctx, ClubStatus::Active, at(2024, 3, 1), 5).await?;

    let report = ctx.billing_service.sweep(at(2024, 2, 1)).await?;
    assert_eq!(report.evaluated, 1);
    assert!(report.warned.is_empty());
    assert!(report.suspended.is_empty());

    let unchanged = ctx.club_repo.find_by_id(club.id).await?.unwrap();
    assert_eq!(unchanged.status, ClubStatus::Active);
    assert_eq!(ctx.club_repo.history_for(club.id).await?.len(), 1);
    assert!(recorder.recorded().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_sweep_boundaries_are_exclusive() -> anyhow::Result<()> {
    let (ctx, _) = setup().await?;
    let due = at(2024, 1, 10);

    // Exactly at the due date: not overdue yet
    let on_time = club_with_due(&ctx, ClubStatus::Active, due, 5).await?;
    ctx.billing_service.sweep(due).await?;
    let club = ctx.club_repo.find_by_id(on_time.id).await?.unwrap();
    assert_eq!(club.status, ClubStatus::Active);

    // Exactly at the cutoff (due + grace): warned, not yet suspended
    ctx.billing_service.sweep(at(2024, 1, 15)).await?;
    let club = ctx.club_repo.find_by_id(on_time.id).await?.unwrap();
    assert_eq!(club.status, ClubStatus::PaymentWarning);

    // One second past the cutoff is suspension territory
    ctx.billing_service
        .sweep(at(2024, 1, 15) + chrono::Duration::seconds(1))
        .await?;
    let club = ctx.club_repo.find_by_id(on_time.id).await?.unwrap();
    assert_eq!(club.status, ClubStatus::Suspended);

    Ok(())
}

#[tokio::test]
async fn test_trial_club_is_swept_like_any_other() -> anyhow::Result<()> {
    let (ctx, _) = setup().await?;
    let club = club_with_due(&ctx, ClubStatus::Trial, at(2024, 1, 10), 5).await?;

    ctx.billing_service.sweep(at(2024, 1, 12)).await?;
    let warned = ctx.club_repo.find_by_id(club.id).await?.unwrap();
    assert_eq!(warned.status, ClubStatus::PaymentWarning);

    Ok(())
}

#[tokio::test]
async fn test_sweep_never_touches_suspended_or_blocked() -> anyhow::Result<()> {
    let (ctx, recorder) = setup().await?;
    let suspended = club_with_due(&ctx, ClubStatus::Suspended, at(2024, 1, 1), 0).await?;
    let blocked = club_with_due(&ctx, ClubStatus::Blocked, at(2024, 1, 1), 0).await?;

    let report = ctx.billing_service.sweep(at(2024, 6, 1)).await?;
    assert_eq!(report.evaluated, 0);

    assert_eq!(
        ctx.club_repo.find_by_id(suspended.id).await?.unwrap().status,
        ClubStatus::Suspended
    );
    assert_eq!(
        ctx.club_repo.find_by_id(blocked.id).await?.unwrap().status,
        ClubStatus::Blocked
    );
    assert!(recorder.recorded().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_reactivate_restarts_the_billing_cycle() -> anyhow::Result<()> {
    let (ctx, _) = setup().await?;
    let club = club_with_due(&ctx, ClubStatus::Suspended, at(2024, 1, 10), 5).await?;

    let revived = ctx.billing_service
        .reactivate(club.id, SubscriptionPlan::Quarterly, "admin")
        .await?;

    assert_eq!(revived.status, ClubStatus::Active);
    assert_eq!(revived.subscription_plan, SubscriptionPlan::Quarterly);

    let paid = revived.last_payment_date.unwrap();
    let due = revived.next_payment_due.unwrap();
    let days = (due - paid).num_days();
    assert!((89..=92).contains(&days), "expected ~1 quarter, got {} days", days);

    let history = ctx.club_repo.history_for(club.id).await?;
    let last = history.last().unwrap();
    assert_eq!(last.from_status, ClubStatus::Suspended);
    assert_eq!(last.to_status, ClubStatus::Active);

    Ok(())
}

/// Delegates to the real repository but fails transitions for one club,
/// standing in for a per-row storage fault.
struct FlakyClubRepository {
    inner: Arc<dyn ClubRepository>,
    poisoned: Uuid,
}

#[async_trait]
impl ClubRepository for FlakyClubRepository {
    async fn create(&self, request: CreateClubRequest) -> TroupeResult<Club> {
        self.inner.create(request).await
    }

    async fn find_by_id(&self, id: Uuid) -> TroupeResult<Option<Club>> {
        self.inner.find_by_id(id).await
    }

    async fn list_pending(&self) -> TroupeResult<Vec<Club>> {
        self.inner.list_pending().await
    }

    async fn list_billable(&self) -> TroupeResult<Vec<Club>> {
        self.inner.list_billable().await
    }

    async fn count_by_status(&self) -> TroupeResult<ApprovalMetrics> {
        self.inner.count_by_status().await
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: StatusTransition,
    ) -> TroupeResult<Club> {
        if id == self.poisoned {
            return Err(AppError::Database("disk unhappy".to_string()));
        }
        self.inner.apply_transition(id, transition).await
    }

    async fn history_for(&self, club_id: Uuid) -> TroupeResult<Vec<ClubStatusHistory>> {
        self.inner.history_for(club_id).await
    }
}

#[tokio::test]
async fn test_sweep_collects_per_club_failures() -> anyhow::Result<()> {
    let (ctx, _) = setup().await?;
    let poisoned = club_with_due(&ctx, ClubStatus::Active, at(2024, 1, 1), 0).await?;
    let healthy = club_with_due(&ctx, ClubStatus::Active, at(2024, 1, 1), 0).await?;

    let flaky = Arc::new(FlakyClubRepository {
        inner: ctx.club_repo.clone(),
        poisoned: poisoned.id,
    });
    let billing = BillingService::new(flaky, Arc::new(IntegrationManager::new()));

    // One club's storage failure must not abort the rest of the pass
    let report = billing.sweep(at(2024, 2, 1)).await?;
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.suspended, vec![healthy.id]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].club_id, poisoned.id);

    assert_eq!(
        ctx.club_repo.find_by_id(healthy.id).await?.unwrap().status,
        ClubStatus::Suspended
    );
    assert_eq!(
        ctx.club_repo.find_by_id(poisoned.id).await?.unwrap().status,
        ClubStatus::Active
    );

    Ok(())
}

#[tokio::test]
async fn test_reactivate_requires_a_lapsed_club() -> anyhow::Result<()> {
    let (ctx, _) = setup().await?;
    let club = club_with_due(&ctx, ClubStatus::Active, at(2024, 6, 1), 5).await?;

    let err = ctx.billing_service
        .reactivate(club.id, SubscriptionPlan::Monthly, "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err = ctx.billing_service
        .reactivate(Uuid::new_v4(), SubscriptionPlan::Monthly, "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}
