//! Adapters: concrete implementations of the ports

pub mod directory;
pub mod memory;
pub mod notify;
pub mod rocks;

use std::{path::Path, sync::Arc};

use crate::{
    adapter::{memory::InMemoryStore, rocks::RocksDbStore},
    domain::error::WorkflowError,
    port::store::WorkflowStore
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
pub enum StoreType {
    #[serde(rename = "inmemory")]
    #[value(name = "inmemory")]
    InMemory,
    #[serde(rename = "rocksdb")]
    #[value(name = "rocksdb")]
    RocksDb
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::InMemory => "inmemory",
            StoreType::RocksDb => "rocksdb"
        }
    }
}

/// Factory for creating stores based on configuration
pub struct StoreFactory;

impl StoreFactory {
    pub fn create(store_type: StoreType, db_path: Option<&Path>) -> Result<Arc<dyn WorkflowStore>, WorkflowError> {
        match store_type {
            StoreType::InMemory => Ok(Arc::new(InMemoryStore::new())),
            StoreType::RocksDb => {
                let path = db_path
                    .ok_or_else(|| WorkflowError::Configuration("storage.path is required for rocksdb".to_string()))?;
                Ok(Arc::new(RocksDbStore::open(path)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rocksdb_requires_path() {
        let err = StoreFactory::create(StoreType::RocksDb, None).err().unwrap();
        assert!(matches!(err, WorkflowError::Configuration(_)));
    }

    #[test]
    fn test_store_type_names() {
        assert_eq!(StoreType::InMemory.as_str(), "inmemory");
        assert_eq!(serde_yaml::to_string(&StoreType::RocksDb).unwrap().trim(), "rocksdb");
    }
}
