//! Borrow request ledger repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use super::BorrowRequestsRepository;
use crate::{
    error::{AppError, AppResult},
    models::{
        borrow_request::{BorrowRequest, BorrowStatus, Decision, NewBorrowRequest, StockMovement},
        equipment::Equipment,
    },
};

#[derive(Clone)]
pub struct PgBorrowRequestsRepository {
    pool: Pool<Postgres>,
}

impl PgBorrowRequestsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Lock order for every multi-row unit of work: request row first, then equipment row.
async fn lock_request(conn: &mut PgConnection, id: i32) -> AppResult<BorrowRequest> {
    sqlx::query_as::<_, BorrowRequest>("SELECT * FROM borrow_requests WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Borrow request {} not found", id)))
}

async fn lock_equipment(conn: &mut PgConnection, id: i32) -> AppResult<Equipment> {
    sqlx::query_as::<_, Equipment>("SELECT * FROM equipment WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))
}

async fn add_stock(
    conn: &mut PgConnection,
    id: i32,
    delta: i32,
    at: DateTime<Utc>,
) -> AppResult<Equipment> {
    let equipment = sqlx::query_as::<_, Equipment>(
        "UPDATE equipment SET quantity = quantity + $2, updated_at = $3 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(delta)
    .bind(at)
    .fetch_one(conn)
    .await?;
    Ok(equipment)
}

#[async_trait]
impl BorrowRequestsRepository for PgBorrowRequestsRepository {
    async fn create(&self, data: &NewBorrowRequest) -> AppResult<BorrowRequest> {
        let row = sqlx::query_as::<_, BorrowRequest>(
            r#"
            INSERT INTO borrow_requests (user_id, equipment_id, quantity, reason, due_date, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.equipment_id)
        .bind(data.quantity)
        .bind(&data.reason)
        .bind(data.due_date)
        .bind(BorrowStatus::Pending)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<BorrowRequest> {
        sqlx::query_as::<_, BorrowRequest>("SELECT * FROM borrow_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow request {} not found", id)))
    }

    async fn list_all(&self) -> AppResult<Vec<BorrowRequest>> {
        let rows = sqlx::query_as::<_, BorrowRequest>(
            "SELECT * FROM borrow_requests ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_by_user(&self, user_id: i32) -> AppResult<Vec<BorrowRequest>> {
        let rows = sqlx::query_as::<_, BorrowRequest>(
            "SELECT * FROM borrow_requests WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_overdue(&self, as_of: DateTime<Utc>) -> AppResult<Vec<BorrowRequest>> {
        let rows = sqlx::query_as::<_, BorrowRequest>(
            r#"
            SELECT * FROM borrow_requests
            WHERE status = $1 AND returned_at IS NULL AND due_date < $2
            ORDER BY due_date
            "#,
        )
        .bind(BorrowStatus::Approved)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn commit_rejection(&self, id: i32) -> AppResult<BorrowRequest> {
        let updated = sqlx::query_as::<_, BorrowRequest>(
            r#"
            UPDATE borrow_requests SET status = $2, updated_at = $3
            WHERE id = $1 AND status = $4
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(BorrowStatus::Rejected)
        .bind(Utc::now())
        .bind(BorrowStatus::Pending)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(request) => Ok(request),
            None => {
                let current = self.get_by_id(id).await?;
                current.status.decide(Decision::Reject)?;
                Err(AppError::TransactionConflict(format!(
                    "Borrow request {} changed during rejection",
                    id
                )))
            }
        }
    }

    async fn commit_approval(&self, id: i32, approved_at: DateTime<Utc>) -> AppResult<StockMovement> {
        let mut tx = self.pool.begin().await?;

        let request = lock_request(&mut tx, id).await?;
        request.status.decide(Decision::Approve)?;

        let equipment = lock_equipment(&mut tx, request.equipment_id).await?;
        if equipment.quantity < request.quantity {
            return Err(AppError::InsufficientStock(format!(
                "Not enough equipment in stock (requested {}, available {})",
                request.quantity, equipment.quantity
            )));
        }

        let equipment = add_stock(&mut tx, equipment.id, -request.quantity, approved_at).await?;

        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            UPDATE borrow_requests SET status = $2, approved_at = $3, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(BorrowStatus::Approved)
        .bind(approved_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StockMovement { request, equipment })
    }

    async fn commit_return(&self, id: i32, returned_at: DateTime<Utc>) -> AppResult<StockMovement> {
        let mut tx = self.pool.begin().await?;

        let request = lock_request(&mut tx, id).await?;
        request.ensure_returnable()?;

        let equipment = lock_equipment(&mut tx, request.equipment_id).await?;
        let equipment = add_stock(&mut tx, equipment.id, request.quantity, returned_at).await?;

        let request = sqlx::query_as::<_, BorrowRequest>(
            "UPDATE borrow_requests SET returned_at = $2, updated_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(returned_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StockMovement { request, equipment })
    }
}
