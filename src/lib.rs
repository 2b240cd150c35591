//! Biblio library catalog server
//!
//! A REST JSON API for a shared book catalog: browsing, borrowing and
//! returning copies, an audit history of every catalog and loan action, and
//! account administration.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod seed;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use repository::Repository;
use services::Services;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<Services>,
}

impl AppState {
    pub fn new(config: AppConfig, repository: Repository) -> Self {
        let services = Services::new(repository, &config);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
