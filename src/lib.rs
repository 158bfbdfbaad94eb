//! Equiplend equipment lending tracker
//!
//! Users file borrow requests against a shared equipment pool, administrators
//! approve or reject them, stock is taken out and handed back, and overdue
//! loans produce reminders. Exposed as a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    /// Kept for readiness probes
    pub repository: repository::Repository,
}

impl AppState {
    pub fn new(config: AppConfig, repository: repository::Repository) -> Self {
        let services = services::Services::new(repository.clone(), &config);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
            repository,
        }
    }
}
