use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Parser;
use fake::{faker::name::en::Name, Fake};
use sqlx::sqlite::SqlitePoolOptions;

use troupe::{
    domain::{
        ApproveClubRequest, BillingUpdate, ClubStatus, CreateClubRequest, CreateMemberRequest,
        CreatePaymentRequest, CreateTransactionRequest, PaymentKind, StatusTransition,
        SubscriptionPlan, TransactionKind, TransactionStatus,
    },
    integrations::IntegrationManager,
    repository::{ClubRepository, MemberRepository},
    service::ServiceContext,
};

#[derive(Parser)]
#[command(about = "Seed the troupe database with demo data")]
struct Args {
    /// Database to seed
    #[arg(long, default_value = "sqlite:troupe.db")]
    database_url: String,

    /// Wipe existing data before seeding
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    // Run migrations first
    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    if args.fresh {
        println!("🧹 Clearing existing data...");
        // Children before parents to keep the foreign keys happy
        for table in [
            "point_discrepancies",
            "payments",
            "transactions",
            "club_status_history",
            "clubs",
            "members",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&db_pool)
                .await?;
        }
    }

    let context = ServiceContext::new(db_pool, Arc::new(IntegrationManager::new()));

    // Seed members
    println!("👥 Creating members...");

    let admin = context.member_repo.create(CreateMemberRequest {
        email: "admin@troupe.local".to_string(),
        full_name: "Platform Admin".to_string(),
        club_id: None,
    }).await?;

    let mut owners = Vec::new();
    for i in 1..=4 {
        let owner = context.member_repo.create(CreateMemberRequest {
            email: format!("owner{}@troupe.local", i),
            full_name: Name().fake(),
            club_id: None,
        }).await?;
        owners.push(owner);
    }

    println!("  ✅ Created admin and {} club owners", owners.len());

    // Seed clubs across the lifecycle
    println!("🏛️  Creating clubs...");

    // Robotics stays in the approval queue
    let robotics = context.club_repo.create(CreateClubRequest {
        name: "Robotics Club".to_string(),
        owner_user_id: owners[0].id,
        subscription_plan: SubscriptionPlan::Monthly,
        grace_period_days: 5,
    }).await?;

    // Chess goes straight onto a monthly plan
    let chess = context.club_repo.create(CreateClubRequest {
        name: "Chess Club".to_string(),
        owner_user_id: owners[1].id,
        subscription_plan: SubscriptionPlan::Monthly,
        grace_period_days: 5,
    }).await?;
    context.approval_service.approve(chess.id, admin.id, ApproveClubRequest {
        grant_trial: false,
        trial_days: 0,
        subscription_plan: None,
        notes: Some("Looks great, welcome aboard".to_string()),
    }).await?;

    // Astronomy gets a two-week trial
    let astronomy = context.club_repo.create(CreateClubRequest {
        name: "Astronomy Club".to_string(),
        owner_user_id: owners[2].id,
        subscription_plan: SubscriptionPlan::Quarterly,
        grace_period_days: 7,
    }).await?;
    context.approval_service.approve(astronomy.id, admin.id, ApproveClubRequest {
        grant_trial: true,
        trial_days: 14,
        subscription_plan: None,
        notes: None,
    }).await?;

    // Drama is active but overdue, so the next sweep will flag it
    let drama = context.club_repo.create(CreateClubRequest {
        name: "Drama Club".to_string(),
        owner_user_id: owners[3].id,
        subscription_plan: SubscriptionPlan::Monthly,
        grace_period_days: 3,
    }).await?;
    context.approval_service.approve(drama.id, admin.id, ApproveClubRequest {
        grant_trial: false,
        trial_days: 0,
        subscription_plan: None,
        notes: None,
    }).await?;
    context.club_repo.apply_transition(drama.id, StatusTransition {
        expected: Some(ClubStatus::Active),
        to: ClubStatus::Active,
        changed_by: "seed".to_string(),
        reason: Some("backdated due date for sweep demo".to_string()),
        billing: BillingUpdate {
            next_payment_due: Some(Utc::now() - Duration::days(2)),
            ..Default::default()
        },
    }).await?;

    println!("  ✅ Created 4 clubs (pending / active / trial / overdue)");

    // Seed chess club roster and ledger
    println!("💰 Creating treasury entries...");

    let mut chess_members = Vec::new();
    for i in 1..=3 {
        let member = context.member_repo.create(CreateMemberRequest {
            email: format!("chess{}@troupe.local", i),
            full_name: Name().fake(),
            club_id: Some(chess.id),
        }).await?;
        chess_members.push(member);
    }

    // Monthly dues for every member, each worth 100 points on settlement
    let member_ids: Vec<_> = chess_members.iter().map(|m| m.id).collect();
    let dues = context.treasury_service.create_bulk(
        CreateTransactionRequest {
            club_id: chess.id,
            kind: TransactionKind::Income,
            amount_cents: 5000,
            category: "monthly-dues".to_string(),
            status: TransactionStatus::Pending,
            points: 100,
            payer_id: None,
            member_id: None,
            due_date: Some(Utc::now() + Duration::days(7)),
            proof_url: None,
        },
        &member_ids,
    ).await?;

    // First member already paid in cash
    if let Some(first) = dues.created.first() {
        context.treasury_service.settle(first.id, Utc::now()).await?;
    }

    // Second member uploaded a transfer receipt instead
    context.treasury_service.create(CreateTransactionRequest {
        club_id: chess.id,
        kind: TransactionKind::Income,
        amount_cents: 5000,
        category: "monthly-dues".to_string(),
        status: TransactionStatus::WaitingApproval,
        points: 100,
        payer_id: Some(chess_members[1].id),
        member_id: Some(chess_members[1].id),
        due_date: None,
        proof_url: Some("https://uploads.troupe.local/proofs/chess-dues.jpg".to_string()),
    }).await?;

    // Tournament supplies, already paid
    context.treasury_service.create(CreateTransactionRequest {
        club_id: chess.id,
        kind: TransactionKind::Expense,
        amount_cents: 2500,
        category: "equipment".to_string(),
        status: TransactionStatus::Completed,
        points: 0,
        payer_id: None,
        member_id: None,
        due_date: None,
        proof_url: None,
    }).await?;

    let balance = context.treasury_service.balance(chess.id).await?;
    println!(
        "  ✅ Chess club ledger seeded (balance: {} cents)",
        balance.balance_cents
    );

    // Seed a pending gateway payment for the overdue club
    println!("💳 Creating payment records...");

    context.payment_service.create(CreatePaymentRequest {
        club_id: drama.id,
        kind: PaymentKind::Renewal,
        amount_cents: 9900,
        metadata: serde_json::json!({ "channel": "bank-transfer" }),
        expires_at: Some(Utc::now() + Duration::days(7)),
    }).await?;

    println!("  ✅ Created 1 pending renewal payment");

    println!("\n✨ Database seeding complete!");
    println!("\n📝 Seeded clubs:");
    println!("  Robotics Club:  pending approval ({})", robotics.id);
    println!("  Chess Club:     active with ledger ({})", chess.id);
    println!("  Astronomy Club: on trial ({})", astronomy.id);
    println!("  Drama Club:     overdue, will warn on next sweep ({})", drama.id);

    Ok(())
}
