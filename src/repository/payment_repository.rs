use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{CreatePaymentRequest, Payment, PaymentKind, PaymentStatus},
    error::{AppError, Result},
    repository::PaymentRepository,
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    club_id: String,
    kind: String,
    amount_cents: i64,
    status: String,
    metadata: String,
    expires_at: Option<NaiveDateTime>,
    confirmed_at: Option<NaiveDateTime>,
    confirmed_by: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PAYMENT_COLUMNS: &str = r#"id, club_id, kind, amount_cents, status, metadata,
       expires_at, confirmed_at, confirmed_by, created_at, updated_at"#;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            club_id: Uuid::parse_str(&row.club_id).map_err(|e| AppError::Database(e.to_string()))?,
            kind: Self::parse_kind(&row.kind)?,
            amount_cents: row.amount_cents,
            status: Self::parse_status(&row.status)?,
            metadata: serde_json::from_str(&row.metadata)
                .map_err(|e| AppError::Database(e.to_string()))?,
            expires_at: row.expires_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            confirmed_at: row.confirmed_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            confirmed_by: row.confirmed_by
                .map(|s| Uuid::parse_str(&s).map_err(|e| AppError::Database(e.to_string())))
                .transpose()?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_kind(s: &str) -> Result<PaymentKind> {
        match s {
            "Subscription" => Ok(PaymentKind::Subscription),
            "MemberAddition" => Ok(PaymentKind::MemberAddition),
            "Renewal" => Ok(PaymentKind::Renewal),
            _ => Err(AppError::Database(format!("Invalid payment kind: {}", s))),
        }
    }

    fn kind_to_str(kind: &PaymentKind) -> &'static str {
        match kind {
            PaymentKind::Subscription => "Subscription",
            PaymentKind::MemberAddition => "MemberAddition",
            PaymentKind::Renewal => "Renewal",
        }
    }

    fn parse_status(s: &str) -> Result<PaymentStatus> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Confirmed" => Ok(PaymentStatus::Confirmed),
            "Expired" => Ok(PaymentStatus::Expired),
            "Refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }

    fn status_to_str(status: &PaymentStatus) -> &'static str {
        match status {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Confirmed => "Confirmed",
            PaymentStatus::Expired => "Expired",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, request: CreatePaymentRequest) -> Result<Payment> {
        if request.amount_cents <= 0 {
            return Err(AppError::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let id_str = id.to_string();
        let club_id_str = request.club_id.to_string();
        let kind_str = Self::kind_to_str(&request.kind);
        let status_str = Self::status_to_str(&PaymentStatus::Pending);
        let metadata = serde_json::to_string(&request.metadata)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let expires_naive = request.expires_at.map(|dt| dt.naive_utc());

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, club_id, kind, amount_cents, status, metadata,
                expires_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(&club_id_str)
        .bind(kind_str)
        .bind(request.amount_cents)
        .bind(status_str)
        .bind(&metadata)
        .bind(expires_naive)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created payment".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_club(&self, club_id: Uuid) -> Result<Vec<Payment>> {
        let club_id_str = club_id.to_string();
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE club_id = ? ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(club_id_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        confirmed_at: Option<DateTime<Utc>>,
        confirmed_by: Option<Uuid>,
    ) -> Result<Option<Payment>> {
        let id_str = id.to_string();
        let from_str = Self::status_to_str(&from);
        let to_str = Self::status_to_str(&to);
        let confirmed_at_naive = confirmed_at.map(|dt| dt.naive_utc());
        let confirmed_by_str = confirmed_by.map(|u| u.to_string());
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?,
                confirmed_at = COALESCE(?, confirmed_at),
                confirmed_by = COALESCE(?, confirmed_by),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to_str)
        .bind(confirmed_at_naive)
        .bind(&confirmed_by_str)
        .bind(now)
        .bind(&id_str)
        .bind(from_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let now_naive = now.naive_utc();
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {}
            FROM payments
            WHERE status = ? AND expires_at IS NOT NULL AND expires_at < ?
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(Self::status_to_str(&PaymentStatus::Pending))
        .bind(now_naive)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut expired = Vec::new();
        for row in rows {
            let payment = Self::row_to_payment(row)?;
            // Conditional so a confirmation racing the clock wins.
            if let Some(updated) = self
                .transition(payment.id, PaymentStatus::Pending, PaymentStatus::Expired, None, None)
                .await?
            {
                expired.push(updated);
            }
        }

        Ok(expired)
    }
}
