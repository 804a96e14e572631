use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{
        ApprovalMetrics, Club, ClubStatus, ClubStatusHistory, CreateClubRequest,
        StatusTransition, SubscriptionPlan,
    },
    error::{AppError, Result},
    repository::ClubRepository,
};

// Database row struct that matches the SQLite schema
#[derive(FromRow)]
struct ClubRow {
    id: String,
    name: String,
    owner_user_id: String,
    status: String,
    subscription_plan: String,
    trial_ends_at: Option<NaiveDateTime>,
    next_payment_due: Option<NaiveDateTime>,
    last_payment_date: Option<NaiveDateTime>,
    grace_period_days: i64,
    approved_at: Option<NaiveDateTime>,
    approved_by: Option<String>,
    approval_notes: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct HistoryRow {
    id: String,
    club_id: String,
    from_status: String,
    to_status: String,
    changed_by: String,
    reason: Option<String>,
    changed_at: NaiveDateTime,
}

const CLUB_COLUMNS: &str = r#"id, name, owner_user_id, status, subscription_plan,
       trial_ends_at, next_payment_due, last_payment_date, grace_period_days,
       approved_at, approved_by, approval_notes, created_at, updated_at"#;

pub struct SqliteClubRepository {
    pool: SqlitePool,
}

impl SqliteClubRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_club(row: ClubRow) -> Result<Club> {
        Ok(Club {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            name: row.name,
            owner_user_id: Uuid::parse_str(&row.owner_user_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            status: Self::parse_club_status(&row.status)?,
            subscription_plan: Self::parse_plan(&row.subscription_plan)?,
            trial_ends_at: row.trial_ends_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            next_payment_due: row.next_payment_due.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            last_payment_date: row.last_payment_date.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            grace_period_days: row.grace_period_days,
            approved_at: row.approved_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            approved_by: row.approved_by
                .map(|s| Uuid::parse_str(&s).map_err(|e| AppError::Database(e.to_string())))
                .transpose()?,
            approval_notes: row.approval_notes,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn row_to_history(row: HistoryRow) -> Result<ClubStatusHistory> {
        Ok(ClubStatusHistory {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            club_id: Uuid::parse_str(&row.club_id).map_err(|e| AppError::Database(e.to_string()))?,
            from_status: Self::parse_club_status(&row.from_status)?,
            to_status: Self::parse_club_status(&row.to_status)?,
            changed_by: row.changed_by,
            reason: row.reason,
            changed_at: DateTime::from_naive_utc_and_offset(row.changed_at, Utc),
        })
    }

    fn parse_club_status(s: &str) -> Result<ClubStatus> {
        match s {
            "PendingApproval" => Ok(ClubStatus::PendingApproval),
            "Trial" => Ok(ClubStatus::Trial),
            "Active" => Ok(ClubStatus::Active),
            "PaymentWarning" => Ok(ClubStatus::PaymentWarning),
            "Suspended" => Ok(ClubStatus::Suspended),
            "Blocked" => Ok(ClubStatus::Blocked),
            "Inactive" => Ok(ClubStatus::Inactive),
            _ => Err(AppError::Database(format!("Invalid club status: {}", s))),
        }
    }

    fn club_status_to_str(status: &ClubStatus) -> &'static str {
        match status {
            ClubStatus::PendingApproval => "PendingApproval",
            ClubStatus::Trial => "Trial",
            ClubStatus::Active => "Active",
            ClubStatus::PaymentWarning => "PaymentWarning",
            ClubStatus::Suspended => "Suspended",
            ClubStatus::Blocked => "Blocked",
            ClubStatus::Inactive => "Inactive",
        }
    }

    fn parse_plan(s: &str) -> Result<SubscriptionPlan> {
        match s {
            "Monthly" => Ok(SubscriptionPlan::Monthly),
            "Quarterly" => Ok(SubscriptionPlan::Quarterly),
            "Annual" => Ok(SubscriptionPlan::Annual),
            _ => Err(AppError::Database(format!("Invalid subscription plan: {}", s))),
        }
    }

    fn plan_to_str(plan: &SubscriptionPlan) -> &'static str {
        match plan {
            SubscriptionPlan::Monthly => "Monthly",
            SubscriptionPlan::Quarterly => "Quarterly",
            SubscriptionPlan::Annual => "Annual",
        }
    }
}

#[async_trait]
impl ClubRepository for SqliteClubRepository {
    async fn create(&self, request: CreateClubRequest) -> Result<Club> {
        if request.grace_period_days < 0 {
            return Err(AppError::Validation(
                "Grace period cannot be negative".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let id_str = id.to_string();
        let owner_str = request.owner_user_id.to_string();
        let status_str = Self::club_status_to_str(&ClubStatus::PendingApproval);
        let plan_str = Self::plan_to_str(&request.subscription_plan);

        sqlx::query(
            r#"
            INSERT INTO clubs (
                id, name, owner_user_id, status, subscription_plan,
                grace_period_days, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(&request.name)
        .bind(&owner_str)
        .bind(status_str)
        .bind(plan_str)
        .bind(request.grace_period_days)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created club".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Club>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, ClubRow>(&format!(
            "SELECT {} FROM clubs WHERE id = ?",
            CLUB_COLUMNS
        ))
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_club(r)?)),
            None => Ok(None),
        }
    }

    async fn list_pending(&self) -> Result<Vec<Club>> {
        let pending_str = Self::club_status_to_str(&ClubStatus::PendingApproval);

        // Oldest first so the queue is fair to early applicants.
        let rows = sqlx::query_as::<_, ClubRow>(&format!(
            "SELECT {} FROM clubs WHERE status = ? ORDER BY created_at ASC",
            CLUB_COLUMNS
        ))
        .bind(pending_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_club).collect()
    }

    async fn list_billable(&self) -> Result<Vec<Club>> {
        let rows = sqlx::query_as::<_, ClubRow>(&format!(
            r#"
            SELECT {}
            FROM clubs
            WHERE status IN (?, ?, ?) AND next_payment_due IS NOT NULL
            ORDER BY next_payment_due ASC
            "#,
            CLUB_COLUMNS
        ))
        .bind(Self::club_status_to_str(&ClubStatus::Active))
        .bind(Self::club_status_to_str(&ClubStatus::Trial))
        .bind(Self::club_status_to_str(&ClubStatus::PaymentWarning))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_club).collect()
    }

    async fn count_by_status(&self) -> Result<ApprovalMetrics> {
        #[derive(FromRow)]
        struct CountRow {
            status: String,
            count: i64,
        }

        let rows = sqlx::query_as::<_, CountRow>(
            "SELECT status, COUNT(*) as count FROM clubs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut metrics = ApprovalMetrics::default();
        for row in rows {
            match Self::parse_club_status(&row.status)? {
                ClubStatus::PendingApproval => metrics.pending = row.count,
                ClubStatus::Trial => metrics.trial = row.count,
                ClubStatus::Active => metrics.active = row.count,
                ClubStatus::PaymentWarning => metrics.payment_warning = row.count,
                ClubStatus::Suspended => metrics.suspended = row.count,
                ClubStatus::Blocked => metrics.blocked = row.count,
                ClubStatus::Inactive => metrics.inactive = row.count,
            }
        }

        Ok(metrics)
    }

    async fn apply_transition(&self, id: Uuid, transition: StatusTransition) -> Result<Club> {
        let id_str = id.to_string();

        // The status update and its audit row must land together.
        let mut tx = self.pool.begin().await.map_err(|e| AppError::Database(e.to_string()))?;

        let row = sqlx::query_as::<_, ClubRow>(&format!(
            "SELECT {} FROM clubs WHERE id = ?",
            CLUB_COLUMNS
        ))
        .bind(&id_str)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let current = match row {
            Some(r) => Self::row_to_club(r)?,
            None => return Err(AppError::NotFound(format!("Club {} not found", id))),
        };

        if let Some(expected) = &transition.expected {
            if current.status != *expected {
                return Err(AppError::InvalidState(format!(
                    "Club {} is {}, expected {}",
                    id,
                    Self::club_status_to_str(&current.status),
                    Self::club_status_to_str(expected),
                )));
            }
        }

        let now = Utc::now().naive_utc();
        let to_str = Self::club_status_to_str(&transition.to);
        let from_str = Self::club_status_to_str(&current.status);
        let plan_str = transition.billing.subscription_plan.as_ref().map(Self::plan_to_str);
        let trial_ends_naive = transition.billing.trial_ends_at.map(|dt| dt.naive_utc());
        let next_due_naive = transition.billing.next_payment_due.map(|dt| dt.naive_utc());
        let last_paid_naive = transition.billing.last_payment_date.map(|dt| dt.naive_utc());
        let approved_at_naive = transition.billing.approved_at.map(|dt| dt.naive_utc());
        let approved_by_str = transition.billing.approved_by.map(|u| u.to_string());

        sqlx::query(
            r#"
            UPDATE clubs
            SET status = ?,
                subscription_plan = COALESCE(?, subscription_plan),
                trial_ends_at = COALESCE(?, trial_ends_at),
                next_payment_due = COALESCE(?, next_payment_due),
                last_payment_date = COALESCE(?, last_payment_date),
                approved_at = COALESCE(?, approved_at),
                approved_by = COALESCE(?, approved_by),
                approval_notes = COALESCE(?, approval_notes),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(to_str)
        .bind(plan_str)
        .bind(trial_ends_naive)
        .bind(next_due_naive)
        .bind(last_paid_naive)
        .bind(approved_at_naive)
        .bind(&approved_by_str)
        .bind(&transition.billing.approval_notes)
        .bind(now)
        .bind(&id_str)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let history_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO club_status_history (
                id, club_id, from_status, to_status, changed_by, reason, changed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&history_id)
        .bind(&id_str)
        .bind(from_str)
        .bind(to_str)
        .bind(&transition.changed_by)
        .bind(&transition.reason)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated club".to_string())
        })
    }

    async fn history_for(&self, club_id: Uuid) -> Result<Vec<ClubStatusHistory>> {
        let club_id_str = club_id.to_string();
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, club_id, from_status, to_status, changed_by, reason, changed_at
            FROM club_status_history
            WHERE club_id = ?
            ORDER BY changed_at ASC, rowid ASC
            "#,
        )
        .bind(club_id_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_history).collect()
    }
}
