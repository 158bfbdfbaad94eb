//! Reminders repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::RemindersRepository;
use crate::{
    error::{AppError, AppResult},
    models::reminder::{NewReminder, Reminder},
};

#[derive(Clone)]
pub struct PgRemindersRepository {
    pool: Pool<Postgres>,
}

impl PgRemindersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemindersRepository for PgRemindersRepository {
    async fn create(&self, data: &NewReminder) -> AppResult<Reminder> {
        let row = sqlx::query_as::<_, Reminder>(
            r#"
            INSERT INTO reminders (user_id, borrow_request_id, message)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.borrow_request_id)
        .bind(&data.message)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Reminder> {
        sqlx::query_as::<_, Reminder>("SELECT * FROM reminders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reminder {} not found", id)))
    }

    async fn list_unseen_for(&self, user_id: i32) -> AppResult<Vec<Reminder>> {
        let rows = sqlx::query_as::<_, Reminder>(
            "SELECT * FROM reminders WHERE user_id = $1 AND seen = FALSE ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn has_unseen_for_request(&self, borrow_request_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reminders WHERE borrow_request_id = $1 AND seen = FALSE)",
        )
        .bind(borrow_request_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn mark_seen(&self, id: i32) -> AppResult<Reminder> {
        sqlx::query_as::<_, Reminder>("UPDATE reminders SET seen = TRUE WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reminder {} not found", id)))
    }
}
