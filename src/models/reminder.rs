//! Reminder model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::{borrow_request::BorrowRequest, equipment::Equipment};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reminder {
    pub id: i32,
    /// Recipient
    pub user_id: i32,
    /// Overdue request that triggered the reminder
    pub borrow_request_id: Option<i32>,
    pub message: String,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub user_id: i32,
    pub borrow_request_id: Option<i32>,
    pub message: String,
}

impl NewReminder {
    /// Reminder addressed to the requester of an unreturned loan
    pub fn overdue(request: &BorrowRequest, equipment: Option<&Equipment>) -> Self {
        let label = match equipment {
            Some(e) => format!("\"{}\" (serial {})", e.name, e.serial_number),
            None => format!("#{}", request.equipment_id),
        };
        Self {
            user_id: request.user_id,
            borrow_request_id: Some(request.id),
            message: format!(
                "Equipment {} was due on {} and has not been returned. Please return it as soon as possible.",
                label,
                request.due_date.format("%Y-%m-%d")
            ),
        }
    }
}
