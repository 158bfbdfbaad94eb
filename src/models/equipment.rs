//! Equipment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::text_enum;

/// Descriptive lifecycle status. Availability is decided by `quantity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentStatus {
    Available,
    Borrowed,
    Maintenance,
}

text_enum!(EquipmentStatus {
    Available => "available",
    Borrowed => "borrowed",
    Maintenance => "maintenance",
});

/// Equipment record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Equipment {
    pub id: i32,
    /// Short name
    pub name: String,
    /// Model name
    pub full_name: String,
    /// Globally unique serial number
    pub serial_number: String,
    /// Available units
    pub quantity: i32,
    pub description: Option<String>,
    pub status: EquipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create equipment request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateEquipment {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Model name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "Serial number is required"))]
    pub serial_number: String,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
    pub description: Option<String>,
}

/// Update equipment request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEquipment {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Model name is required"))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, message = "Serial number is required"))]
    pub serial_number: Option<String>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: Option<i32>,
    pub description: Option<String>,
    pub status: Option<EquipmentStatus>,
}

/// Equipment list filter
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct EquipmentQuery {
    pub status: Option<EquipmentStatus>,
}

/// Stock adjustment request
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStock {
    /// Signed number of units to add (negative to remove)
    pub adjustment: i32,
}
