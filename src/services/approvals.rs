//! Approval workflow: decisions on pending borrow requests and returns
//!
//! Every path validates first (role, status, linked equipment, stock) and then
//! hands a single unit of work to the ledger repository, which re-checks the
//! same conditions while holding both records. A commit that loses a race is
//! reported as a retryable error and the whole decision is replayed from the
//! top, up to `workflow.max_commit_retries` times.

use std::future::Future;

use chrono::Utc;

use crate::{
    config::WorkflowConfig,
    error::{AppError, AppResult},
    models::{
        borrow_request::{Decision, DecisionOutcome, StockMovement},
        user::Principal,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct ApprovalService {
    repository: Repository,
    config: WorkflowConfig,
}

impl ApprovalService {
    pub fn new(repository: Repository, config: WorkflowConfig) -> Self {
        Self { repository, config }
    }

    /// Apply `decision` to a pending request
    pub async fn decide(&self, id: i32, decision: Decision, actor: Principal) -> AppResult<DecisionOutcome> {
        if let Err(e) = actor.require_admin() {
            tracing::warn!(request_id = id, user_id = actor.id, "Non-admin attempted to {} a request", decision.verb());
            return Err(e);
        }

        let outcome = self
            .with_retries(decision.verb(), id, move || self.attempt_decision(id, decision))
            .await?;

        match &outcome.equipment {
            Some(equipment) => tracing::info!(
                request_id = id,
                admin_id = actor.id,
                equipment_id = equipment.id,
                quantity = outcome.request.quantity,
                remaining = equipment.quantity,
                "Borrow request approved"
            ),
            None => tracing::info!(request_id = id, admin_id = actor.id, "Borrow request rejected"),
        }
        Ok(outcome)
    }

    /// Hand the units of an approved request back to stock
    pub async fn return_equipment(&self, id: i32, actor: Principal) -> AppResult<StockMovement> {
        actor.require_admin()?;

        let movement = self
            .with_retries("return", id, move || self.attempt_return(id))
            .await?;

        tracing::info!(
            request_id = id,
            admin_id = actor.id,
            equipment_id = movement.equipment.id,
            quantity = movement.request.quantity,
            remaining = movement.equipment.quantity,
            "Equipment returned"
        );
        Ok(movement)
    }

    async fn attempt_decision(&self, id: i32, decision: Decision) -> AppResult<DecisionOutcome> {
        let request = self.repository.borrow_requests.get_by_id(id).await?;
        if let Err(e) = request.status.decide(decision) {
            tracing::warn!(request_id = id, status = %request.status, "Refused to {} request", decision.verb());
            return Err(e);
        }

        match decision {
            Decision::Reject => {
                let request = self.repository.borrow_requests.commit_rejection(id).await?;
                Ok(request.into())
            }
            Decision::Approve => {
                let equipment = self.repository.equipment.get_by_id(request.equipment_id).await?;
                if equipment.quantity < request.quantity {
                    tracing::warn!(
                        request_id = id,
                        equipment_id = equipment.id,
                        requested = request.quantity,
                        available = equipment.quantity,
                        "Approval refused for lack of stock"
                    );
                    return Err(AppError::InsufficientStock(format!(
                        "Not enough equipment in stock (requested {}, available {})",
                        request.quantity, equipment.quantity
                    )));
                }

                let movement = self
                    .repository
                    .borrow_requests
                    .commit_approval(id, Utc::now())
                    .await?;
                Ok(movement.into())
            }
        }
    }

    async fn attempt_return(&self, id: i32) -> AppResult<StockMovement> {
        let request = self.repository.borrow_requests.get_by_id(id).await?;
        request.ensure_returnable()?;
        self.repository.borrow_requests.commit_return(id, Utc::now()).await
    }

    async fn with_retries<T, F, Fut>(&self, action: &str, id: i32, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.config.max_commit_retries => {
                    retries += 1;
                    tracing::warn!(
                        request_id = id,
                        action,
                        retry = retries,
                        error = %e,
                        "Commit aborted, retrying"
                    );
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!(request_id = id, action, error = %e, "Commit kept failing, giving up");
                    return Err(e);
                }
                result => return result,
            }
        }
    }
}
