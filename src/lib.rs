//! Timed server - time tracking with report review and export

pub mod api;
pub mod auth;
pub mod bulk;
pub mod config;
pub mod duration;
pub mod error;
pub mod export;
pub mod filter;
pub mod intersection;
pub mod models;
pub mod notify;
pub mod service;
pub mod store;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::notify::{Mailer, Notifier};
use crate::service::ReportService;
use crate::store::Store;

/// Application state shared across handlers
pub struct AppState {
    pub service: ReportService,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &Config, mailer: Arc<dyn Mailer>) -> Arc<Self> {
        let notifier = Notifier::new(
            mailer,
            config.from_email.clone(),
            config.email_subject_prefix.clone(),
        );

        Arc::new(Self {
            service: ReportService::new(Store::new(pool), notifier, config.export_max_count),
        })
    }

    pub fn store(&self) -> &Store {
        self.service.store()
    }
}
