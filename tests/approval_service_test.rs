use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use troupe::{
    domain::{
        ApproveClubRequest, Club, ClubStatus, CreateClubRequest, CreateMemberRequest,
        SubscriptionPlan,
    },
    error::AppError,
    integrations::IntegrationManager,
    repository::{ClubRepository, MemberRepository},
    service::ServiceContext,
};

async fn setup() -> anyhow::Result<ServiceContext> {
    let pool = SqlitePool::connect(":memory:").await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(ServiceContext::new(pool, Arc::new(IntegrationManager::new())))
}

async fn create_club(
    ctx: &ServiceContext,
    name: &str,
    plan: SubscriptionPlan,
) -> anyhow::Result<Club> {
    let owner = ctx.member_repo.create(CreateMemberRequest {
        email: format!("owner-{}@example.com", Uuid::new_v4()),
        full_name: "Club Owner".to_string(),
        club_id: None,
    }).await?;

    Ok(ctx.club_repo.create(CreateClubRequest {
        name: name.to_string(),
        owner_user_id: owner.id,
        subscription_plan: plan,
        grace_period_days: 5,
    }).await?)
}

#[tokio::test]
async fn test_approve_with_trial() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let club = create_club(&ctx, "Robotics Club", SubscriptionPlan::Monthly).await?;
    let approver = Uuid::new_v4();

    let approved = ctx.approval_service.approve(club.id, approver, ApproveClubRequest {
        grant_trial: true,
        trial_days: 7,
        subscription_plan: None,
        notes: Some("trial granted on application".to_string()),
    }).await?;

    assert_eq!(approved.status, ClubStatus::Trial);
    assert_eq!(approved.approved_by, Some(approver));
    assert!(approved.approved_at.is_some());
    assert!(approved.last_payment_date.is_none());

    // Trial ends seven days out and the first bill lands the same day
    let trial_ends = approved.trial_ends_at.expect("trial end must be set");
    assert_eq!(approved.next_payment_due, Some(trial_ends));
    let days = (trial_ends - approved.approved_at.unwrap()).num_days();
    assert_eq!(days, 7);

    let history = ctx.club_repo.history_for(club.id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, ClubStatus::PendingApproval);
    assert_eq!(history[0].to_status, ClubStatus::Trial);

    Ok(())
}

#[tokio::test]
async fn test_approve_straight_to_active() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let club = create_club(&ctx, "Chess Club", SubscriptionPlan::Monthly).await?;
    let approver = Uuid::new_v4();

    let approved = ctx.approval_service.approve(club.id, approver, ApproveClubRequest {
        grant_trial: false,
        trial_days: 0,
        subscription_plan: None,
        notes: None,
    }).await?;

    assert_eq!(approved.status, ClubStatus::Active);
    assert!(approved.last_payment_date.is_some());

    // Monthly plan: the next due date is one calendar month out
    let due = approved.next_payment_due.expect("due date must be set");
    let paid = approved.last_payment_date.unwrap();
    let days = (due - paid).num_days();
    assert!((28..=31).contains(&days), "expected ~1 month, got {} days", days);

    let history = ctx.club_repo.history_for(club.id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to_status, ClubStatus::Active);

    Ok(())
}

#[tokio::test]
async fn test_approve_annual_plan_is_calendar_aware() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let club = create_club(&ctx, "Debate Club", SubscriptionPlan::Annual).await?;

    let approved = ctx.approval_service.approve(club.id, Uuid::new_v4(), ApproveClubRequest {
        grant_trial: false,
        trial_days: 0,
        subscription_plan: Some(SubscriptionPlan::Annual),
        notes: None,
    }).await?;

    let due = approved.next_payment_due.unwrap();
    let paid = approved.last_payment_date.unwrap();
    let days = (due - paid).num_days();
    assert!((365..=366).contains(&days), "expected ~1 year, got {} days", days);

    Ok(())
}

#[tokio::test]
async fn test_approve_missing_club_is_not_found() -> anyhow::Result<()> {
    let ctx = setup().await?;

    let err = ctx.approval_service.approve(Uuid::new_v4(), Uuid::new_v4(), ApproveClubRequest {
        grant_trial: false,
        trial_days: 0,
        subscription_plan: None,
        notes: None,
    }).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_reject_requires_reason() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let club = create_club(&ctx, "Film Club", SubscriptionPlan::Monthly).await?;
    let admin = Uuid::new_v4();

    let err = ctx.approval_service.reject(club.id, admin, "  ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let rejected = ctx.approval_service
        .reject(club.id, admin, "incomplete application")
        .await?;
    assert_eq!(rejected.status, ClubStatus::Blocked);
    assert_eq!(rejected.approval_notes.as_deref(), Some("incomplete application"));

    let history = ctx.club_repo.history_for(club.id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to_status, ClubStatus::Blocked);
    assert_eq!(history[0].reason.as_deref(), Some("incomplete application"));

    Ok(())
}

#[tokio::test]
async fn test_grant_trial_to_suspended_club() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let club = create_club(&ctx, "Garden Club", SubscriptionPlan::Monthly).await?;
    let admin = Uuid::new_v4();

    ctx.approval_service.approve(club.id, admin, ApproveClubRequest {
        grant_trial: false,
        trial_days: 0,
        subscription_plan: None,
        notes: None,
    }).await?;
    ctx.approval_service
        .change_status(club.id, ClubStatus::Suspended, "admin", Some("manual suspension".to_string()))
        .await?;

    // Second-chance trial straight out of suspension
    let revived = ctx.approval_service.grant_trial(club.id, admin, 14).await?;
    assert_eq!(revived.status, ClubStatus::Trial);
    assert!(revived.trial_ends_at.is_some());

    let history = ctx.club_repo.history_for(club.id).await?;
    let last = history.last().unwrap();
    assert_eq!(last.from_status, ClubStatus::Suspended);
    assert_eq!(last.to_status, ClubStatus::Trial);

    let err = ctx.approval_service.grant_trial(club.id, admin, 0).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn test_list_pending_is_oldest_first_with_owner() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let first = create_club(&ctx, "First Applicant", SubscriptionPlan::Monthly).await?;
    let second = create_club(&ctx, "Second Applicant", SubscriptionPlan::Annual).await?;

    let pending = ctx.approval_service.list_pending().await?;
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].club.id, first.id);
    assert_eq!(pending[1].club.id, second.id);
    assert_eq!(pending[0].owner.id, first.owner_user_id);
    assert!(pending[0].owner.email.contains("@example.com"));

    Ok(())
}

#[tokio::test]
async fn test_metrics_counts_status_buckets() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let admin = Uuid::new_v4();

    let _pending = create_club(&ctx, "Pending Club", SubscriptionPlan::Monthly).await?;
    let active = create_club(&ctx, "Active Club", SubscriptionPlan::Monthly).await?;
    let trial = create_club(&ctx, "Trial Club", SubscriptionPlan::Monthly).await?;

    ctx.approval_service.approve(active.id, admin, ApproveClubRequest {
        grant_trial: false,
        trial_days: 0,
        subscription_plan: None,
        notes: None,
    }).await?;
    ctx.approval_service.approve(trial.id, admin, ApproveClubRequest {
        grant_trial: true,
        trial_days: 7,
        subscription_plan: None,
        notes: None,
    }).await?;

    let metrics = ctx.approval_service.metrics().await?;
    assert_eq!(metrics.pending, 1);
    assert_eq!(metrics.active, 1);
    assert_eq!(metrics.trial, 1);
    assert_eq!(metrics.blocked, 0);

    Ok(())
}

#[tokio::test]
async fn test_every_status_change_is_audited() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let club = create_club(&ctx, "Audited Club", SubscriptionPlan::Monthly).await?;
    let admin = Uuid::new_v4();

    ctx.approval_service.approve(club.id, admin, ApproveClubRequest {
        grant_trial: false,
        trial_days: 0,
        subscription_plan: None,
        notes: None,
    }).await?;
    ctx.approval_service
        .change_status(club.id, ClubStatus::Suspended, "admin", None)
        .await?;
    ctx.approval_service.grant_trial(club.id, admin, 7).await?;

    // One history row per mutation, each linking from the previous state
    let history = ctx.club_repo.history_for(club.id).await?;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].from_status, ClubStatus::PendingApproval);
    assert_eq!(history[0].to_status, ClubStatus::Active);
    assert_eq!(history[1].from_status, ClubStatus::Active);
    assert_eq!(history[1].to_status, ClubStatus::Suspended);
    assert_eq!(history[2].from_status, ClubStatus::Suspended);
    assert_eq!(history[2].to_status, ClubStatus::Trial);

    Ok(())
}

#[tokio::test]
async fn test_reapproval_redates_the_club() -> anyhow::Result<()> {
    let ctx = setup().await?;
    let club = create_club(&ctx, "Eager Club", SubscriptionPlan::Monthly).await?;
    let admin = Uuid::new_v4();

    let request = ApproveClubRequest {
        grant_trial: true,
        trial_days: 7,
        subscription_plan: None,
        notes: None,
    };
    let first = ctx.approval_service.approve(club.id, admin, request.clone()).await?;

    // Approval is not idempotent: a second call re-dates the trial
    let longer = ApproveClubRequest { trial_days: 30, ..request };
    let second = ctx.approval_service.approve(club.id, admin, longer).await?;

    assert_eq!(second.status, ClubStatus::Trial);
    assert!(second.trial_ends_at.unwrap() > first.trial_ends_at.unwrap());

    let history = ctx.club_repo.history_for(club.id).await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].from_status, ClubStatus::Trial);
    assert_eq!(history[1].to_status, ClubStatus::Trial);

    Ok(())
}
