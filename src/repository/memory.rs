//! Process-local store
//!
//! Every entity lives behind a single `tokio::sync::Mutex`. Each trait method
//! takes the lock once and does all of its checks and writes inside it, so
//! every unit of work (approval, return, stock adjustment) is a single-writer
//! critical section and cannot interleave with another.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BorrowRequestsRepository, EquipmentRepository, RemindersRepository, UsersRepository};
use crate::{
    error::{AppError, AppResult},
    models::{
        borrow_request::{BorrowRequest, BorrowStatus, Decision, NewBorrowRequest, StockMovement},
        equipment::{CreateEquipment, Equipment, EquipmentStatus, UpdateEquipment},
        reminder::{NewReminder, Reminder},
        user::{NewUser, User},
    },
};

#[derive(Default)]
struct State {
    next_id: i32,
    users: BTreeMap<i32, User>,
    equipment: BTreeMap<i32, Equipment>,
    borrow_requests: BTreeMap<i32, BorrowRequest>,
    reminders: BTreeMap<i32, Reminder>,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn equipment_mut(&mut self, id: i32) -> AppResult<&mut Equipment> {
        self.equipment
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))
    }

    fn request(&self, id: i32) -> AppResult<&BorrowRequest> {
        self.borrow_requests
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Borrow request {} not found", id)))
    }
}

fn newest_first(rows: &mut [BorrowRequest]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl UsersRepository for MemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn find_by_login(&self, email_or_username: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| {
                u.email.eq_ignore_ascii_case(email_or_username) || u.username == email_or_username
            })
            .cloned())
    }

    async fn exists(&self, email: &str, username: &str) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) || u.username == username))
    }

    async fn create(&self, data: &NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&data.email) || u.username == data.username)
        {
            return Err(AppError::Conflict("Email or username already exists".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: state.next_id(),
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            email: data.email.clone(),
            username: data.username.clone(),
            password: data.password_hash.clone(),
            contact: data.contact.clone(),
            position: data.position.clone(),
            role: data.role,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    async fn delete(&self, id: i32) -> AppResult<User> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        // Reminders cascade, borrow requests are kept
        state.reminders.retain(|_, r| r.user_id != id);
        Ok(user)
    }
}

#[async_trait]
impl EquipmentRepository for MemoryStore {
    async fn list(&self, status: Option<EquipmentStatus>) -> AppResult<Vec<Equipment>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Equipment> = state
            .equipment
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Equipment> {
        let state = self.state.lock().await;
        state
            .equipment
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))
    }

    async fn serial_exists(&self, serial_number: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .equipment
            .values()
            .any(|e| e.serial_number == serial_number && Some(e.id) != exclude_id))
    }

    async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment> {
        let mut state = self.state.lock().await;
        if state
            .equipment
            .values()
            .any(|e| e.serial_number == data.serial_number)
        {
            return Err(AppError::Conflict("Serial number already exists".to_string()));
        }

        let now = Utc::now();
        let equipment = Equipment {
            id: state.next_id(),
            name: data.name.clone(),
            full_name: data.full_name.clone(),
            serial_number: data.serial_number.clone(),
            quantity: data.quantity,
            description: data.description.clone(),
            status: EquipmentStatus::Available,
            created_at: now,
            updated_at: now,
        };
        state.equipment.insert(equipment.id, equipment.clone());
        Ok(equipment)
    }

    async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Equipment> {
        let mut state = self.state.lock().await;
        if let Some(serial) = &data.serial_number {
            if state
                .equipment
                .values()
                .any(|e| &e.serial_number == serial && e.id != id)
            {
                return Err(AppError::Conflict("Serial number already exists".to_string()));
            }
        }

        let equipment = state.equipment_mut(id)?;
        if let Some(name) = &data.name {
            equipment.name = name.clone();
        }
        if let Some(full_name) = &data.full_name {
            equipment.full_name = full_name.clone();
        }
        if let Some(serial) = &data.serial_number {
            equipment.serial_number = serial.clone();
        }
        if let Some(quantity) = data.quantity {
            equipment.quantity = quantity;
        }
        if let Some(description) = &data.description {
            equipment.description = Some(description.clone());
        }
        if let Some(status) = data.status {
            equipment.status = status;
        }
        equipment.updated_at = Utc::now();
        Ok(equipment.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<Equipment> {
        let mut state = self.state.lock().await;
        state
            .equipment
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))
    }

    async fn adjust_stock(&self, id: i32, delta: i32) -> AppResult<Equipment> {
        let mut state = self.state.lock().await;
        let equipment = state.equipment_mut(id)?;
        let quantity = equipment
            .quantity
            .checked_add(delta)
            .ok_or_else(|| AppError::Validation("Adjustment is out of range".to_string()))?;
        if quantity < 0 {
            return Err(AppError::InvalidState(format!(
                "Quantity cannot be negative ({} available, adjustment {})",
                equipment.quantity, delta
            )));
        }
        equipment.quantity = quantity;
        equipment.updated_at = Utc::now();
        Ok(equipment.clone())
    }
}

#[async_trait]
impl BorrowRequestsRepository for MemoryStore {
    async fn create(&self, data: &NewBorrowRequest) -> AppResult<BorrowRequest> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&data.user_id) {
            return Err(AppError::NotFound(format!("User with id {} not found", data.user_id)));
        }

        let now = Utc::now();
        let request = BorrowRequest {
            id: state.next_id(),
            user_id: data.user_id,
            equipment_id: data.equipment_id,
            quantity: data.quantity,
            reason: data.reason.clone(),
            due_date: data.due_date,
            status: BorrowStatus::Pending,
            approved_at: None,
            returned_at: None,
            created_at: now,
            updated_at: now,
        };
        state.borrow_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<BorrowRequest> {
        let state = self.state.lock().await;
        state.request(id).cloned()
    }

    async fn list_all(&self) -> AppResult<Vec<BorrowRequest>> {
        let state = self.state.lock().await;
        let mut rows: Vec<BorrowRequest> = state.borrow_requests.values().cloned().collect();
        newest_first(&mut rows);
        Ok(rows)
    }

    async fn list_by_user(&self, user_id: i32) -> AppResult<Vec<BorrowRequest>> {
        let state = self.state.lock().await;
        let mut rows: Vec<BorrowRequest> = state
            .borrow_requests
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut rows);
        Ok(rows)
    }

    async fn list_overdue(&self, as_of: DateTime<Utc>) -> AppResult<Vec<BorrowRequest>> {
        let state = self.state.lock().await;
        let mut rows: Vec<BorrowRequest> = state
            .borrow_requests
            .values()
            .filter(|r| r.is_overdue(as_of))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.due_date);
        Ok(rows)
    }

    async fn commit_rejection(&self, id: i32) -> AppResult<BorrowRequest> {
        let mut state = self.state.lock().await;
        let status = state.request(id)?.status.decide(Decision::Reject)?;

        let request = state
            .borrow_requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Borrow request {} not found", id)))?;
        request.status = status;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn commit_approval(&self, id: i32, approved_at: DateTime<Utc>) -> AppResult<StockMovement> {
        let mut state = self.state.lock().await;

        // Validate everything before the first write
        let request = state.request(id)?.clone();
        let status = request.status.decide(Decision::Approve)?;
        let equipment = state.equipment_mut(request.equipment_id)?;
        if equipment.quantity < request.quantity {
            return Err(AppError::InsufficientStock(format!(
                "Not enough equipment in stock (requested {}, available {})",
                request.quantity, equipment.quantity
            )));
        }

        equipment.quantity -= request.quantity;
        equipment.updated_at = approved_at;
        let equipment = equipment.clone();

        let request = state
            .borrow_requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Borrow request {} not found", id)))?;
        request.status = status;
        request.approved_at = Some(approved_at);
        request.updated_at = approved_at;

        Ok(StockMovement {
            request: request.clone(),
            equipment,
        })
    }

    async fn commit_return(&self, id: i32, returned_at: DateTime<Utc>) -> AppResult<StockMovement> {
        let mut state = self.state.lock().await;

        let request = state.request(id)?.clone();
        request.ensure_returnable()?;
        let equipment = state.equipment_mut(request.equipment_id)?;
        let quantity = equipment
            .quantity
            .checked_add(request.quantity)
            .ok_or_else(|| AppError::Internal("Stock overflow on return".to_string()))?;

        equipment.quantity = quantity;
        equipment.updated_at = returned_at;
        let equipment = equipment.clone();

        let request = state
            .borrow_requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Borrow request {} not found", id)))?;
        request.returned_at = Some(returned_at);
        request.updated_at = returned_at;

        Ok(StockMovement {
            request: request.clone(),
            equipment,
        })
    }
}

#[async_trait]
impl RemindersRepository for MemoryStore {
    async fn create(&self, data: &NewReminder) -> AppResult<Reminder> {
        let mut state = self.state.lock().await;
        let reminder = Reminder {
            id: state.next_id(),
            user_id: data.user_id,
            borrow_request_id: data.borrow_request_id,
            message: data.message.clone(),
            seen: false,
            created_at: Utc::now(),
        };
        state.reminders.insert(reminder.id, reminder.clone());
        Ok(reminder)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Reminder> {
        let state = self.state.lock().await;
        state
            .reminders
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Reminder {} not found", id)))
    }

    async fn list_unseen_for(&self, user_id: i32) -> AppResult<Vec<Reminder>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Reminder> = state
            .reminders
            .values()
            .filter(|r| r.user_id == user_id && !r.seen)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn has_unseen_for_request(&self, borrow_request_id: i32) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .reminders
            .values()
            .any(|r| r.borrow_request_id == Some(borrow_request_id) && !r.seen))
    }

    async fn mark_seen(&self, id: i32) -> AppResult<Reminder> {
        let mut state = self.state.lock().await;
        let reminder = state
            .reminders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Reminder {} not found", id)))?;
        reminder.seen = true;
        Ok(reminder.clone())
    }
}
