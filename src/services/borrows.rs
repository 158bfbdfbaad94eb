//! Borrow request ledger service

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow_request::{BorrowRequest, CreateBorrowRequest, NewBorrowRequest},
        user::Principal,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowRequestsService {
    repository: Repository,
}

impl BorrowRequestsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// File a pending request on behalf of `requester`.
    ///
    /// The stock check is a pre-check and reserves nothing. Approval checks again.
    pub async fn create(&self, requester: Principal, data: CreateBorrowRequest) -> AppResult<BorrowRequest> {
        data.validate()?;
        let due_date = data
            .due_date
            .ok_or_else(|| AppError::Validation("Due date is required".to_string()))?;

        let equipment = self.repository.equipment.get_by_id(data.equipment_id).await?;
        if equipment.quantity < data.quantity {
            return Err(AppError::InsufficientStock(format!(
                "Not enough equipment in stock (requested {}, available {})",
                data.quantity, equipment.quantity
            )));
        }

        let request = self
            .repository
            .borrow_requests
            .create(&NewBorrowRequest {
                user_id: requester.id,
                equipment_id: equipment.id,
                quantity: data.quantity,
                reason: data.reason.trim().to_string(),
                due_date,
            })
            .await?;

        tracing::info!(
            request_id = request.id,
            user_id = requester.id,
            equipment_id = equipment.id,
            quantity = request.quantity,
            "Borrow request created"
        );
        Ok(request)
    }

    /// Fetch one request; only its requester or an admin may see it
    pub async fn get(&self, actor: Principal, id: i32) -> AppResult<BorrowRequest> {
        let request = self.repository.borrow_requests.get_by_id(id).await?;
        actor.require_owner_or_admin(request.user_id)?;
        Ok(request)
    }

    pub async fn list_all(&self) -> AppResult<Vec<BorrowRequest>> {
        self.repository.borrow_requests.list_all().await
    }

    pub async fn list_mine(&self, requester_id: i32) -> AppResult<Vec<BorrowRequest>> {
        self.repository.borrow_requests.list_by_user(requester_id).await
    }

    pub async fn list_overdue(&self, as_of: DateTime<Utc>) -> AppResult<Vec<BorrowRequest>> {
        self.repository.borrow_requests.list_overdue(as_of).await
    }
}
