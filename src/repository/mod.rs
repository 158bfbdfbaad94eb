//! Repository layer: storage traits and their Postgres / in-memory backends

pub mod borrow_requests;
pub mod equipment;
pub mod memory;
pub mod reminders;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        borrow_request::{BorrowRequest, NewBorrowRequest, StockMovement},
        equipment::{CreateEquipment, Equipment, EquipmentStatus, UpdateEquipment},
        reminder::{NewReminder, Reminder},
        user::{NewUser, User},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsersRepository: Send + Sync {
    async fn get_by_id(&self, id: i32) -> AppResult<User>;

    /// Look a user up by email or username
    async fn find_by_login(&self, email_or_username: &str) -> AppResult<Option<User>>;

    async fn exists(&self, email: &str, username: &str) -> AppResult<bool>;

    async fn create(&self, data: &NewUser) -> AppResult<User>;

    async fn list(&self) -> AppResult<Vec<User>>;

    /// Delete a user and return the removed record
    async fn delete(&self, id: i32) -> AppResult<User>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EquipmentRepository: Send + Sync {
    async fn list(&self, status: Option<EquipmentStatus>) -> AppResult<Vec<Equipment>>;

    async fn get_by_id(&self, id: i32) -> AppResult<Equipment>;

    /// Whether another item already uses `serial_number`
    async fn serial_exists(&self, serial_number: &str, exclude_id: Option<i32>) -> AppResult<bool>;

    async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment>;

    async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Equipment>;

    async fn delete(&self, id: i32) -> AppResult<Equipment>;

    /// Add `delta` to the stock in a single atomic step.
    /// Fails with `InvalidState` when the result would be negative.
    async fn adjust_stock(&self, id: i32, delta: i32) -> AppResult<Equipment>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowRequestsRepository: Send + Sync {
    async fn create(&self, data: &NewBorrowRequest) -> AppResult<BorrowRequest>;

    async fn get_by_id(&self, id: i32) -> AppResult<BorrowRequest>;

    /// All requests, newest first
    async fn list_all(&self) -> AppResult<Vec<BorrowRequest>>;

    /// Requests of one user, newest first
    async fn list_by_user(&self, user_id: i32) -> AppResult<Vec<BorrowRequest>>;

    /// Approved, unreturned requests with `due_date < as_of`
    async fn list_overdue(&self, as_of: DateTime<Utc>) -> AppResult<Vec<BorrowRequest>>;

    /// Move a pending request to `rejected`.
    async fn commit_rejection(&self, id: i32) -> AppResult<BorrowRequest>;

    /// Decrement stock and mark the request approved as one unit of work.
    ///
    /// Status and stock are re-checked while both records are held, so the
    /// commit fails with `InvalidState` / `InsufficientStock` instead of
    /// over-committing when a concurrent decision got there first. On any
    /// error nothing is written.
    async fn commit_approval(&self, id: i32, approved_at: DateTime<Utc>) -> AppResult<StockMovement>;

    /// Restock the units of an approved request and stamp `returned_at`, atomically.
    async fn commit_return(&self, id: i32, returned_at: DateTime<Utc>) -> AppResult<StockMovement>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemindersRepository: Send + Sync {
    async fn create(&self, data: &NewReminder) -> AppResult<Reminder>;

    async fn get_by_id(&self, id: i32) -> AppResult<Reminder>;

    async fn list_unseen_for(&self, user_id: i32) -> AppResult<Vec<Reminder>>;

    /// Whether an unseen reminder already points at this request
    async fn has_unseen_for_request(&self, borrow_request_id: i32) -> AppResult<bool>;

    async fn mark_seen(&self, id: i32) -> AppResult<Reminder>;
}

/// Main repository struct holding one backend per entity
#[derive(Clone)]
pub struct Repository {
    pub users: Arc<dyn UsersRepository>,
    pub equipment: Arc<dyn EquipmentRepository>,
    pub borrow_requests: Arc<dyn BorrowRequestsRepository>,
    pub reminders: Arc<dyn RemindersRepository>,
    pool: Option<Pool<Postgres>>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            users: Arc::new(users::PgUsersRepository::new(pool.clone())),
            equipment: Arc::new(equipment::PgEquipmentRepository::new(pool.clone())),
            borrow_requests: Arc::new(borrow_requests::PgBorrowRequestsRepository::new(pool.clone())),
            reminders: Arc::new(reminders::PgRemindersRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Create a repository over a fresh process-local store
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::default();
        Self {
            users: Arc::new(store.clone()),
            equipment: Arc::new(store.clone()),
            borrow_requests: Arc::new(store.clone()),
            reminders: Arc::new(store),
            pool: None,
        }
    }

    /// Assemble a repository from individual backends
    pub fn from_parts(
        users: Arc<dyn UsersRepository>,
        equipment: Arc<dyn EquipmentRepository>,
        borrow_requests: Arc<dyn BorrowRequestsRepository>,
        reminders: Arc<dyn RemindersRepository>,
    ) -> Self {
        Self {
            users,
            equipment,
            borrow_requests,
            reminders,
            pool: None,
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}
