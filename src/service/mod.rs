pub mod approval_service;
pub mod billing_service;
pub mod payment_service;
pub mod points_service;
pub mod treasury_service;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::integrations::IntegrationManager;
use crate::repository::*;

pub use approval_service::ApprovalService;
pub use billing_service::{BillingService, SweepFailure, SweepReport, BILLING_CLOCK_ACTOR};
pub use payment_service::PaymentService;
pub use points_service::PointsService;
pub use treasury_service::TreasuryService;

pub struct ServiceContext {
    pub club_repo: Arc<dyn ClubRepository>,
    pub transaction_repo: Arc<dyn TransactionRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub member_repo: Arc<dyn MemberRepository>,
    pub integration_manager: Arc<IntegrationManager>,
    pub approval_service: Arc<ApprovalService>,
    pub billing_service: Arc<BillingService>,
    pub treasury_service: Arc<TreasuryService>,
    pub payment_service: Arc<PaymentService>,
    pub points_service: Arc<PointsService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(db_pool: SqlitePool, integration_manager: Arc<IntegrationManager>) -> Self {
        let club_repo: Arc<dyn ClubRepository> =
            Arc::new(SqliteClubRepository::new(db_pool.clone()));
        let transaction_repo: Arc<dyn TransactionRepository> =
            Arc::new(SqliteTransactionRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> =
            Arc::new(SqlitePaymentRepository::new(db_pool.clone()));

        // One SQLite repository backs both the member read model and the
        // points capability; services only ever see the narrower traits.
        let member_sqlite = Arc::new(SqliteMemberRepository::new(db_pool.clone()));
        let member_repo: Arc<dyn MemberRepository> = member_sqlite.clone();
        let points_store: Arc<dyn PointsStore> = member_sqlite;

        let approval_service = Arc::new(ApprovalService::new(
            club_repo.clone(),
            member_repo.clone(),
            integration_manager.clone(),
        ));
        let billing_service = Arc::new(BillingService::new(
            club_repo.clone(),
            integration_manager.clone(),
        ));
        let treasury_service = Arc::new(TreasuryService::new(
            transaction_repo.clone(),
            club_repo.clone(),
            member_repo.clone(),
            points_store.clone(),
        ));
        let payment_service = Arc::new(PaymentService::new(
            payment_repo.clone(),
            club_repo.clone(),
            integration_manager.clone(),
        ));
        let points_service = Arc::new(PointsService::new(points_store));

        Self {
            club_repo,
            transaction_repo,
            payment_repo,
            member_repo,
            integration_manager,
            approval_service,
            billing_service,
            treasury_service,
            payment_service,
            points_service,
            db_pool,
        }
    }
}
