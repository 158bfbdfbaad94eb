//! Equipment catalog repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};

use super::EquipmentRepository;
use crate::{
    error::{AppError, AppResult},
    models::equipment::{CreateEquipment, Equipment, EquipmentStatus, UpdateEquipment},
};

#[derive(Clone)]
pub struct PgEquipmentRepository {
    pool: Pool<Postgres>,
}

impl PgEquipmentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EquipmentRepository for PgEquipmentRepository {
    async fn list(&self, status: Option<EquipmentStatus>) -> AppResult<Vec<Equipment>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, Equipment>(
                    "SELECT * FROM equipment WHERE status = $1 ORDER BY name",
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Equipment>("SELECT * FROM equipment ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Equipment> {
        sqlx::query_as::<_, Equipment>("SELECT * FROM equipment WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))
    }

    async fn serial_exists(&self, serial_number: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM equipment WHERE serial_number = $1 AND ($2::INTEGER IS NULL OR id != $2))",
        )
        .bind(serial_number)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment> {
        sqlx::query_as::<_, Equipment>(
            r#"
            INSERT INTO equipment (name, full_name, serial_number, quantity, description, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.full_name)
        .bind(&data.serial_number)
        .bind(data.quantity)
        .bind(&data.description)
        .bind(EquipmentStatus::Available)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_unique_violation(e, "Serial number already exists"))
    }

    async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Equipment> {
        let now = Utc::now();
        let mut sets = vec!["updated_at = $1".to_string()];
        let mut idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, idx));
                    idx += 1;
                }
            };
        }

        add_field!(data.name, "name");
        add_field!(data.full_name, "full_name");
        add_field!(data.serial_number, "serial_number");
        add_field!(data.quantity, "quantity");
        add_field!(data.description, "description");
        add_field!(data.status, "status");

        let query = format!(
            "UPDATE equipment SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            idx
        );

        let mut builder = sqlx::query_as::<_, Equipment>(&query).bind(now);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(data.name);
        bind_field!(data.full_name);
        bind_field!(data.serial_number);
        bind_field!(data.quantity);
        bind_field!(data.description);
        bind_field!(data.status);

        builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_unique_violation(e, "Serial number already exists"))?
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))
    }

    async fn delete(&self, id: i32) -> AppResult<Equipment> {
        sqlx::query_as::<_, Equipment>("DELETE FROM equipment WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))
    }

    async fn adjust_stock(&self, id: i32, delta: i32) -> AppResult<Equipment> {
        // The guard and the write are one statement, so concurrent adjustments
        // and approvals serialize on the row lock.
        let updated = sqlx::query_as::<_, Equipment>(
            r#"
            UPDATE equipment
            SET quantity = quantity + $2, updated_at = $3
            WHERE id = $1 AND quantity + $2 >= 0
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| match &err {
            // numeric_value_out_of_range
            sqlx::Error::Database(db) if db.code().as_deref() == Some("22003") => {
                AppError::Validation("Adjustment is out of range".to_string())
            }
            _ => AppError::Database(err),
        })?;

        match updated {
            Some(equipment) => Ok(equipment),
            None => {
                // Either missing or the guard refused the change
                let current = self.get_by_id(id).await?;
                Err(AppError::InvalidState(format!(
                    "Quantity cannot be negative ({} available, adjustment {})",
                    current.quantity, delta
                )))
            }
        }
    }
}
