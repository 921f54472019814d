use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration
};

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{adapter::StoreType, adapter::directory::DirectorySeed, service::ServiceOptions};

/// Runtime configuration for the routing workflow
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub storage:      StorageSettings,
    #[serde(default)]
    pub monitor:      MonitorSettings,
    #[serde(default)]
    pub notification: NotificationSettings,
    #[serde(default)]
    pub retry:        RetrySettings,
    /// Reference data served by the directory
    #[serde(default)]
    pub directory:    DirectorySeed
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub backend: StoreType,
    /// RocksDB directory; defaults to `store/` under the project data dir
    #[serde(default)]
    pub path:    Option<PathBuf>
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { backend: StoreType::InMemory, path: None }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval_secs: u64
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub timeout_ms: u64
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { timeout_ms: 2_000 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.monitor.interval_secs == 0 {
            bail!("monitor.interval_secs must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be greater than zero");
        }
        if self.notification.timeout_ms == 0 {
            bail!("notification.timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            notification_timeout: Duration::from_millis(self.notification.timeout_ms),
            retry_attempts:       self.retry.max_attempts
        }
    }

    /// Where the RocksDB backend keeps its files. `None` for the in-memory backend.
    pub fn store_path(&self) -> Result<Option<PathBuf>> {
        match (self.storage.backend, &self.storage.path) {
            (StoreType::InMemory, _) => Ok(None),
            (StoreType::RocksDb, Some(path)) => Ok(Some(path.clone())),
            (StoreType::RocksDb, None) => Ok(Some(get_data_dir()?.join("store")))
        }
    }
}

/// Get the project directories for cross-platform config path resolution
pub fn get_project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "parla-workflow").context("Failed to determine project directories")
}

pub fn get_config_dir() -> Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    Ok(project_dirs.config_dir().to_path_buf())
}

pub fn get_data_dir() -> Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    Ok(project_dirs.data_dir().to_path_buf())
}

/// The explicit path when given, otherwise `config.yaml` in the project config dir
pub fn get_config_file_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(get_config_dir()?.join("config.yaml"))
    }
}

/// Load settings from file or create the default file if it doesn't exist
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let config_path = get_config_file_path(explicit)?;

    let settings = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        let settings = Settings::default();
        save_settings(&settings, &config_path)?;
        settings
    };

    settings.validate().with_context(|| format!("Invalid config file: {}", config_path.display()))?;
    Ok(settings)
}

pub fn save_settings(settings: &Settings, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let content = serde_yaml::to_string(settings).context("Failed to serialize settings")?;

    fs::write(config_path, content)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    Ok(())
}

/// Write the default settings unless a config file already exists. Returns its path.
pub fn init_settings(explicit: Option<&Path>) -> Result<PathBuf> {
    let config_path = get_config_file_path(explicit)?;

    if !config_path.exists() {
        save_settings(&Settings::default(), &config_path)?;
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::auth::Role;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let settings = load_settings(Some(&path)).unwrap();

        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        assert_eq!(settings.monitor_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = r#"
storage:
  backend: rocksdb
  path: /var/lib/parla
monitor:
  interval_secs: 60
directory:
  sectors:
    - id: S1
      name: Assessoria Parlamentar
  external_bodies:
    - id: MRE
      name: Ministério das Relações Exteriores
      active: false
  legislative_items: [PL-1]
  actors:
    - id: gestor
      roles: [GESTOR]
"#;
        fs::write(&path, yaml).unwrap();

        let settings = load_settings(Some(&path)).unwrap();

        assert_eq!(settings.storage.backend, StoreType::RocksDb);
        assert_eq!(settings.store_path().unwrap(), Some(PathBuf::from("/var/lib/parla")));
        assert_eq!(settings.monitor.interval_secs, 60);
        assert_eq!(settings.retry, RetrySettings::default());
        assert!(settings.directory.sectors[0].active);
        assert!(!settings.directory.external_bodies[0].active);
        assert_eq!(settings.directory.actors[0].roles, vec![Role::Gestor]);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "monitor:\n  interval_secs: 0\n").unwrap();

        assert!(load_settings(Some(&path)).is_err());
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut settings = Settings::default();
        settings.retry.max_attempts = 7;
        save_settings(&settings, &path).unwrap();

        assert_eq!(init_settings(Some(&path)).unwrap(), path);
        assert_eq!(load_settings(Some(&path)).unwrap().retry.max_attempts, 7);
    }

    #[test]
    fn test_service_options_follow_settings() {
        let mut settings = Settings::default();
        settings.notification.timeout_ms = 250;
        settings.retry.max_attempts = 5;

        let options = settings.service_options();
        assert_eq!(options.notification_timeout, Duration::from_millis(250));
        assert_eq!(options.retry_attempts, 5);
        assert_eq!(settings.store_path().unwrap(), None);
    }
}
