//! Borrow request model and its decision state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{equipment::Equipment, text_enum};
use crate::error::{AppError, AppResult};

/// Borrow request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(BorrowStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// Admin decision applied to a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn verb(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

impl BorrowStatus {
    /// Status reached by applying `decision`. Only `pending` can be decided.
    pub fn decide(self, decision: Decision) -> AppResult<BorrowStatus> {
        match (self, decision) {
            (BorrowStatus::Pending, Decision::Approve) => Ok(BorrowStatus::Approved),
            (BorrowStatus::Pending, Decision::Reject) => Ok(BorrowStatus::Rejected),
            (BorrowStatus::Rejected, Decision::Reject) => Err(AppError::InvalidState(
                "Request is already rejected".to_string(),
            )),
            (current, decision) => Err(AppError::InvalidState(format!(
                "Cannot {} {} {} request",
                decision.verb(),
                current.article(),
                current
            ))),
        }
    }

    fn article(&self) -> &'static str {
        match self {
            BorrowStatus::Approved => "an",
            _ => "a",
        }
    }
}

/// Borrow request record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRequest {
    pub id: i32,
    /// Requesting user
    pub user_id: i32,
    pub equipment_id: i32,
    /// Requested units
    pub quantity: i32,
    pub reason: String,
    pub due_date: DateTime<Utc>,
    pub status: BorrowStatus,
    /// Set only on approval
    pub approved_at: Option<DateTime<Utc>>,
    /// Set when the units were handed back and restocked
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BorrowRequest {
    pub fn is_overdue(&self, as_of: DateTime<Utc>) -> bool {
        self.status == BorrowStatus::Approved && self.returned_at.is_none() && self.due_date < as_of
    }

    /// Only approved, not yet returned requests can be returned
    pub fn ensure_returnable(&self) -> AppResult<()> {
        if self.status != BorrowStatus::Approved {
            return Err(AppError::InvalidState(format!(
                "Cannot return {} {} request",
                self.status.article(),
                self.status
            )));
        }
        if self.returned_at.is_some() {
            return Err(AppError::InvalidState(
                "Equipment already returned".to_string(),
            ));
        }
        Ok(())
    }
}

/// Create borrow request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBorrowRequest {
    pub equipment_id: i32,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(length(min = 1, message = "Reason is required"))]
    pub reason: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// Row to insert, already validated
#[derive(Debug, Clone, PartialEq)]
pub struct NewBorrowRequest {
    pub user_id: i32,
    pub equipment_id: i32,
    pub quantity: i32,
    pub reason: String,
    pub due_date: DateTime<Utc>,
}

/// Result of a committed approval or return
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockMovement {
    pub request: BorrowRequest,
    /// Equipment as committed together with the request
    pub equipment: Equipment,
}

/// Outcome of an admin decision. `equipment` is present only for approvals.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecisionOutcome {
    pub request: BorrowRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<Equipment>,
}

impl From<StockMovement> for DecisionOutcome {
    fn from(movement: StockMovement) -> Self {
        Self {
            request: movement.request,
            equipment: Some(movement.equipment),
        }
    }
}

impl From<BorrowRequest> for DecisionOutcome {
    fn from(request: BorrowRequest) -> Self {
        Self {
            request,
            equipment: None,
        }
    }
}

/// Overdue listing query
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct OverdueQuery {
    /// Cut-off instant, defaults to now
    pub as_of: Option<DateTime<Utc>>,
}
