//! Business logic services

pub mod approvals;
pub mod borrows;
pub mod equipment;
pub mod reminders;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub equipment: equipment::EquipmentService,
    pub borrow_requests: borrows::BorrowRequestsService,
    pub approvals: approvals::ApprovalService,
    pub reminders: reminders::RemindersService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            users: users::UsersService::new(repository.clone(), config.auth.clone()),
            equipment: equipment::EquipmentService::new(repository.clone()),
            borrow_requests: borrows::BorrowRequestsService::new(repository.clone()),
            approvals: approvals::ApprovalService::new(repository.clone(), config.workflow.clone()),
            reminders: reminders::RemindersService::new(repository),
        }
    }
}
