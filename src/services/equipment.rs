//! Equipment catalog service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::equipment::{CreateEquipment, Equipment, EquipmentStatus, UpdateEquipment},
    repository::Repository,
};

#[derive(Clone)]
pub struct EquipmentService {
    repository: Repository,
}

impl EquipmentService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self, status: Option<EquipmentStatus>) -> AppResult<Vec<Equipment>> {
        self.repository.equipment.list(status).await
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Equipment> {
        self.repository.equipment.get_by_id(id).await
    }

    /// Add an item to the catalog. New items start `available`.
    pub async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment> {
        data.validate()?;

        if self
            .repository
            .equipment
            .serial_exists(&data.serial_number, None)
            .await?
        {
            return Err(AppError::Conflict("Serial number already exists".to_string()));
        }

        let equipment = self.repository.equipment.create(data).await?;
        tracing::info!(
            equipment_id = equipment.id,
            serial = %equipment.serial_number,
            quantity = equipment.quantity,
            "Equipment created"
        );
        Ok(equipment)
    }

    pub async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Equipment> {
        data.validate()?;

        // Surface NotFound before any serial check
        self.repository.equipment.get_by_id(id).await?;

        if let Some(serial) = &data.serial_number {
            if self.repository.equipment.serial_exists(serial, Some(id)).await? {
                return Err(AppError::Conflict("Serial number already exists".to_string()));
            }
        }

        let equipment = self.repository.equipment.update(id, data).await?;
        tracing::info!(equipment_id = id, "Equipment updated");
        Ok(equipment)
    }

    pub async fn delete(&self, id: i32) -> AppResult<Equipment> {
        let equipment = self.repository.equipment.delete(id).await?;
        tracing::info!(equipment_id = id, serial = %equipment.serial_number, "Equipment deleted");
        Ok(equipment)
    }

    /// Add `adjustment` (possibly negative) to the available stock
    pub async fn adjust_stock(&self, id: i32, adjustment: i32) -> AppResult<Equipment> {
        let current = self.repository.equipment.get_by_id(id).await?;
        if current.quantity.checked_add(adjustment).is_none() {
            tracing::warn!(equipment_id = id, adjustment, "Stock adjustment out of range");
            return Err(AppError::Validation("Adjustment is out of range".to_string()));
        }

        match self.repository.equipment.adjust_stock(id, adjustment).await {
            Ok(equipment) => {
                tracing::info!(
                    equipment_id = id,
                    adjustment,
                    quantity = equipment.quantity,
                    "Stock adjusted"
                );
                Ok(equipment)
            }
            Err(e) => {
                tracing::warn!(equipment_id = id, adjustment, error = %e, "Stock adjustment refused");
                Err(e)
            }
        }
    }
}
