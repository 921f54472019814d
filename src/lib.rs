//! # Parla Workflow
//!
//! Routing workflow for legislative follow-up processes.
//!
//! A process is created by a sector, moved between sectors and external bodies
//! through tramitações, and closed with a final position once every opinion and
//! external position it waits on has been settled. This crate provides:
//! - The domain model with its status machines and invariants
//! - Services for every workflow operation, with role checks and optimistic concurrency
//! - In-memory and RocksDB persistence
//! - A supervised deadline monitor that escalates overdue work

pub mod actor;
pub mod adapter;
pub mod cli;
pub mod config;
pub mod domain;
pub mod port;
pub mod service;

#[cfg(test)]
pub(crate) mod fixtures;

use std::sync::Arc;

use crate::{
    adapter::{StoreFactory, directory::StaticDirectory, notify::LoggingDispatcher},
    config::Settings,
    domain::error::WorkflowError,
    port::store::WorkflowStore,
    service::{ServiceContext, WorkflowServices}
};

/// Everything a running system needs, built once from the settings
pub struct AppContext {
    pub settings:  Settings,
    pub store:     Arc<dyn WorkflowStore>,
    pub directory: Arc<StaticDirectory>,
    pub services:  WorkflowServices
}

impl AppContext {
    pub fn init(settings: Settings) -> Result<Self, WorkflowError> {
        settings.validate().map_err(|e| WorkflowError::Configuration(e.to_string()))?;

        let store_path = settings.store_path().map_err(|e| WorkflowError::Configuration(e.to_string()))?;
        let store = StoreFactory::create(settings.storage.backend, store_path.as_deref())?;
        let directory = Arc::new(StaticDirectory::new(&settings.directory));

        let ctx = ServiceContext::new(
            store.clone(),
            directory.clone(),
            Arc::new(LoggingDispatcher),
            settings.service_options()
        );

        Ok(Self { settings, store, directory, services: WorkflowServices::new(ctx) })
    }

    /// Swap the directory's reference data without restarting
    pub async fn reload_directory(&self, settings: &Settings) {
        self.directory.reload(&settings.directory).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapter::StoreType, fixtures};

    #[tokio::test]
    async fn test_init_wires_directory_and_store() {
        let settings = Settings { directory: fixtures::seed(), ..Settings::default() };
        let context = AppContext::init(settings).unwrap();

        let process = context.services.processes.create(fixtures::GESTOR, fixtures::new_process()).await.unwrap();
        assert_eq!(context.services.processes.get(&process.id).await.unwrap(), process);
    }

    #[tokio::test]
    async fn test_reload_directory_grants_new_actors() {
        let context = AppContext::init(Settings::default()).unwrap();

        let err = context.services.processes.create(fixtures::GESTOR, fixtures::new_process()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthorized(_)));

        let settings = Settings { directory: fixtures::seed(), ..Settings::default() };
        context.reload_directory(&settings).await;
        assert!(context.services.processes.create(fixtures::GESTOR, fixtures::new_process()).await.is_ok());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut settings = Settings::default();
        settings.retry.max_attempts = 0;
        assert!(matches!(AppContext::init(settings), Err(WorkflowError::Configuration(_))));

        let dir = tempfile::TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.storage.backend = StoreType::RocksDb;
        settings.storage.path = Some(dir.path().join("store"));
        assert!(AppContext::init(settings).is_ok());
    }
}
