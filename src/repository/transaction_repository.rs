use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{
        ClubBalance, CreateTransactionRequest, Transaction, TransactionKind, TransactionStatus,
    },
    error::{AppError, Result},
    repository::TransactionRepository,
};

#[derive(FromRow)]
struct TransactionRow {
    id: String,
    club_id: String,
    kind: String,
    amount_cents: i64,
    category: String,
    status: String,
    points: i64,
    payer_id: Option<String>,
    member_id: Option<String>,
    due_date: Option<NaiveDateTime>,
    proof_url: Option<String>,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const TRANSACTION_COLUMNS: &str = r#"id, club_id, kind, amount_cents, category, status, points,
       payer_id, member_id, due_date, proof_url, paid_at, created_at, updated_at"#;

pub struct SqliteTransactionRepository {
    pool: SqlitePool,
}

impl SqliteTransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_transaction(row: TransactionRow) -> Result<Transaction> {
        Ok(Transaction {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            club_id: Uuid::parse_str(&row.club_id).map_err(|e| AppError::Database(e.to_string()))?,
            kind: Self::parse_kind(&row.kind)?,
            amount_cents: row.amount_cents,
            category: row.category,
            status: Self::parse_status(&row.status)?,
            points: row.points,
            payer_id: row.payer_id
                .map(|s| Uuid::parse_str(&s).map_err(|e| AppError::Database(e.to_string())))
                .transpose()?,
            member_id: row.member_id
                .map(|s| Uuid::parse_str(&s).map_err(|e| AppError::Database(e.to_string())))
                .transpose()?,
            due_date: row.due_date.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            proof_url: row.proof_url,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_kind(s: &str) -> Result<TransactionKind> {
        match s {
            "Income" => Ok(TransactionKind::Income),
            "Expense" => Ok(TransactionKind::Expense),
            _ => Err(AppError::Database(format!("Invalid transaction kind: {}", s))),
        }
    }

    fn kind_to_str(kind: &TransactionKind) -> &'static str {
        match kind {
            TransactionKind::Income => "Income",
            TransactionKind::Expense => "Expense",
        }
    }

    fn parse_status(s: &str) -> Result<TransactionStatus> {
        match s {
            "Pending" => Ok(TransactionStatus::Pending),
            "WaitingApproval" => Ok(TransactionStatus::WaitingApproval),
            "Completed" => Ok(TransactionStatus::Completed),
            "Canceled" => Ok(TransactionStatus::Canceled),
            _ => Err(AppError::Database(format!("Invalid transaction status: {}", s))),
        }
    }

    fn status_to_str(status: &TransactionStatus) -> &'static str {
        match status {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::WaitingApproval => "WaitingApproval",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Canceled => "Canceled",
        }
    }
}

#[async_trait]
impl TransactionRepository for SqliteTransactionRepository {
    async fn create(&self, request: CreateTransactionRequest) -> Result<Transaction> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let id_str = id.to_string();
        let club_id_str = request.club_id.to_string();
        let kind_str = Self::kind_to_str(&request.kind);
        let status_str = Self::status_to_str(&request.status);
        let payer_str = request.payer_id.map(|u| u.to_string());
        let member_str = request.member_id.map(|u| u.to_string());
        let due_naive = request.due_date.map(|dt| dt.naive_utc());
        // A row born Completed was paid on the spot.
        let paid_at_naive = if request.status == TransactionStatus::Completed {
            Some(now)
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, club_id, kind, amount_cents, category, status, points,
                payer_id, member_id, due_date, proof_url, paid_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(&club_id_str)
        .bind(kind_str)
        .bind(request.amount_cents)
        .bind(&request.category)
        .bind(status_str)
        .bind(request.points)
        .bind(&payer_str)
        .bind(&member_str)
        .bind(due_naive)
        .bind(&request.proof_url)
        .bind(paid_at_naive)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created transaction".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_transaction(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_club(&self, club_id: Uuid) -> Result<Vec<Transaction>> {
        let club_id_str = club_id.to_string();
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE club_id = ? ORDER BY created_at DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(club_id_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Transaction>> {
        let id_str = id.to_string();
        let from_str = Self::status_to_str(&from);
        let to_str = Self::status_to_str(&to);
        let paid_at_naive = paid_at.map(|dt| dt.naive_utc());
        let now = Utc::now().naive_utc();

        // Guarded by the stored status so two racing callers cannot both
        // take the same row through the same transition.
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?,
                paid_at = COALESCE(?, paid_at),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to_str)
        .bind(paid_at_naive)
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

    async fn delete_if_open(&self, id: Uuid) -> Result<bool> {
        let id_str = id.to_string();
        let result = sqlx::query(
            "DELETE FROM transactions WHERE id = ? AND status IN (?, ?)",
        )
        .bind(&id_str)
        .bind(Self::status_to_str(&TransactionStatus::Pending))
        .bind(Self::status_to_str(&TransactionStatus::WaitingApproval))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn balance(&self, club_id: Uuid) -> Result<ClubBalance> {
        #[derive(FromRow)]
        struct BalanceRow {
            income_cents: i64,
            expense_cents: i64,
        }

        let club_id_str = club_id.to_string();
        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN kind = ? THEN amount_cents ELSE 0 END), 0) AS income_cents,
                COALESCE(SUM(CASE WHEN kind = ? THEN amount_cents ELSE 0 END), 0) AS expense_cents
            FROM transactions
            WHERE club_id = ? AND status = ?
            "#,
        )
        .bind(Self::kind_to_str(&TransactionKind::Income))
        .bind(Self::kind_to_str(&TransactionKind::Expense))
        .bind(&club_id_str)
        .bind(Self::status_to_str(&TransactionStatus::Completed))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(ClubBalance {
            club_id,
            income_cents: row.income_cents,
            expense_cents: row.expense_cents,
            balance_cents: row.income_cents - row.expense_cents,
        })
    }
}
