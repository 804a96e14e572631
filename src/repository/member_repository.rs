use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{CreateMemberRequest, DebitOutcome, Member, PointDiscrepancy},
    error::{AppError, Result},
    repository::{MemberRepository, PointsStore},
};

#[derive(FromRow)]
struct MemberRow {
    id: String,
    club_id: Option<String>,
    email: String,
    full_name: String,
    points: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct DiscrepancyRow {
    id: String,
    transaction_id: String,
    member_id: String,
    expected_debit: i64,
    actual_debit: i64,
    recorded_at: NaiveDateTime,
}

pub struct SqliteMemberRepository {
    pool: SqlitePool,
}

impl SqliteMemberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_member(row: MemberRow) -> Result<Member> {
        Ok(Member {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            club_id: row.club_id
                .map(|s| Uuid::parse_str(&s).map_err(|e| AppError::Database(e.to_string())))
                .transpose()?,
            email: row.email,
            full_name: row.full_name,
            points: row.points,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn row_to_discrepancy(row: DiscrepancyRow) -> Result<PointDiscrepancy> {
        Ok(PointDiscrepancy {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            transaction_id: Uuid::parse_str(&row.transaction_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            member_id: Uuid::parse_str(&row.member_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            expected_debit: row.expected_debit,
            actual_debit: row.actual_debit,
            recorded_at: DateTime::from_naive_utc_and_offset(row.recorded_at, Utc),
        })
    }
}

#[async_trait]
impl MemberRepository for SqliteMemberRepository {
    async fn create(&self, request: CreateMemberRequest) -> Result<Member> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let id_str = id.to_string();
        let club_id_str = request.club_id.map(|u| u.to_string());

        sqlx::query(
            r#"
            INSERT INTO members (
                id, club_id, email, full_name, points, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(&club_id_str)
        .bind(&request.email)
        .bind(&request.full_name)
        .bind(0i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created member".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT id, club_id, email, full_name, points, created_at, updated_at
            FROM members
            WHERE id = ?
            "#,
        )
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_member(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_club(&self, club_id: Uuid) -> Result<Vec<Member>> {
        let club_id_str = club_id.to_string();
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT id, club_id, email, full_name, points, created_at, updated_at
            FROM members
            WHERE club_id = ?
            ORDER BY full_name ASC
            "#,
        )
        .bind(club_id_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_member).collect()
    }
}

#[async_trait]
impl PointsStore for SqliteMemberRepository {
    async fn credit(&self, member_id: Uuid, amount: i64) -> Result<Member> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "Point credit must be positive".to_string(),
            ));
        }

        let id_str = member_id.to_string();
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE members SET points = points + ?, updated_at = ? WHERE id = ?",
        )
        .bind(amount)
        .bind(now)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Member {} not found", member_id)));
        }

        self.find_by_id(member_id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve credited member".to_string())
        })
    }

    async fn debit_clamped(&self, member_id: Uuid, amount: i64) -> Result<DebitOutcome> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "Point debit must be positive".to_string(),
            ));
        }

        let id_str = member_id.to_string();

        // Read-modify-write under one database transaction so a concurrent
        // credit cannot slip between the read and the clamp.
        let mut tx = self.pool.begin().await.map_err(|e| AppError::Database(e.to_string()))?;

        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT id, club_id, email, full_name, points, created_at, updated_at
            FROM members
            WHERE id = ?
            "#,
        )
        .bind(&id_str)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let member = match row {
            Some(r) => Self::row_to_member(r)?,
            None => return Err(AppError::NotFound(format!("Member {} not found", member_id))),
        };

        let debited = amount.min(member.points);
        let shortfall = amount - debited;
        let now = Utc::now().naive_utc();

        sqlx::query("UPDATE members SET points = points - ?, updated_at = ? WHERE id = ?")
            .bind(debited)
            .bind(now)
            .bind(&id_str)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;

        Ok(DebitOutcome { debited, shortfall })
    }

    async fn reset(&self, member_id: Uuid) -> Result<Member> {
        let id_str = member_id.to_string();
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE members SET points = 0, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Member {} not found", member_id)));
        }

        self.find_by_id(member_id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve reset member".to_string())
        })
    }

    async fn record_discrepancy(
        &self,
        transaction_id: Uuid,
        member_id: Uuid,
        expected_debit: i64,
        actual_debit: i64,
    ) -> Result<PointDiscrepancy> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO point_discrepancies (
                id, transaction_id, member_id, expected_debit, actual_debit, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(transaction_id.to_string())
        .bind(member_id.to_string())
        .bind(expected_debit)
        .bind(actual_debit)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(PointDiscrepancy {
            id,
            transaction_id,
            member_id,
            expected_debit,
            actual_debit,
            recorded_at: DateTime::from_naive_utc_and_offset(now, Utc),
        })
    }

    async fn list_discrepancies(&self, member_id: Uuid) -> Result<Vec<PointDiscrepancy>> {
        let id_str = member_id.to_string();
        let rows = sqlx::query_as::<_, DiscrepancyRow>(
            r#"
            SELECT id, transaction_id, member_id, expected_debit, actual_debit, recorded_at
            FROM point_discrepancies
            WHERE member_id = ?
            ORDER BY recorded_at ASC, rowid ASC
            "#,
        )
        .bind(id_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_discrepancy).collect()
    }
}
