//! Persistent record of installed services
//!
//! The SCM only knows a service's binary path. Everything else the management layer
//! configured lives here, keyed by service name.

use crate::error::{Result, ServyError};
use crate::service::ServiceConfiguration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// A configuration as it was last installed
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoredService {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: ServiceConfiguration,
}

/// Storage for installed service configurations. Names match case-insensitively,
/// as they do in the SCM.
pub trait ServiceRepository: Send + Sync {
    fn upsert(&self, config: &ServiceConfiguration) -> Result<StoredService>;
    fn get(&self, name: &str) -> Result<Option<StoredService>>;
    fn remove(&self, name: &str) -> Result<bool>;
    fn list(&self) -> Result<Vec<StoredService>>;
}

/// Repository backed by a pretty-printed JSON array on disk
pub struct JsonServiceRepository {
    path: PathBuf,
    records: Mutex<Vec<StoredService>>,
}

impl JsonServiceRepository {
    /// Load records from `path`. A missing file is an empty repository; an unreadable
    /// one is reported and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable service store {}: {}", path.display(), e);
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StoredService>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, records: &[StoredService]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl ServiceRepository for JsonServiceRepository {
    fn upsert(&self, config: &ServiceConfiguration) -> Result<StoredService> {
        if config.name.is_empty() {
            return Err(ServyError::Config("cannot store a service without a name".to_string()));
        }

        let mut records = self.lock();
        let now = Utc::now();
        let stored = match records
            .iter_mut()
            .find(|r| r.config.name.eq_ignore_ascii_case(&config.name))
        {
            Some(existing) => {
                existing.config = config.clone();
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let record = StoredService {
                    id: Uuid::new_v4(),
                    created_at: now,
                    updated_at: now,
                    config: config.clone(),
                };
                records.push(record.clone());
                record
            }
        };

        self.save(&records)?;
        Ok(stored)
    }

    fn get(&self, name: &str) -> Result<Option<StoredService>> {
        Ok(self
            .lock()
            .iter()
            .find(|r| r.config.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|r| !r.config.name.eq_ignore_ascii_case(name));
        if records.len() == before {
            return Ok(false);
        }
        self.save(&records)?;
        Ok(true)
    }

    fn list(&self) -> Result<Vec<StoredService>> {
        Ok(self.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn upsert_keeps_identity_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("services.json");
        let repo = JsonServiceRepository::open(&path).unwrap();

        let mut config = ServiceConfiguration::new("Web", "app.exe");
        let first = repo.upsert(&config).unwrap();
        config.description = "updated".into();
        let second = repo.upsert(&config).unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.updated_at >= first.updated_at);

        let reopened = JsonServiceRepository::open(&path).unwrap();
        let stored = reopened.get("web").unwrap().unwrap();
        assert_eq!(stored.config.description, "updated");
        assert_eq!(reopened.list().unwrap().len(), 1);
    }

    #[test]
    fn password_never_reaches_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("services.json");
        let repo = JsonServiceRepository::open(&path).unwrap();

        let mut config = ServiceConfiguration::new("svc", "app.exe");
        config.run_as_local_system = false;
        config.account = Some(r".\svc".into());
        config.password = Some("s3cret".into());
        repo.upsert(&config).unwrap();

        assert!(!fs::read_to_string(&path).unwrap().contains("s3cret"));
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let dir = TempDir::new().unwrap();
        let repo = JsonServiceRepository::open(dir.path().join("services.json")).unwrap();
        repo.upsert(&ServiceConfiguration::new("a", "a.exe")).unwrap();

        assert!(repo.remove("A").unwrap());
        assert!(!repo.remove("A").unwrap());
        assert!(repo.get("a").unwrap().is_none());
    }

    #[test]
    fn corrupt_store_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("services.json");
        fs::write(&path, "{ not json").unwrap();
        let repo = JsonServiceRepository::open(&path).unwrap();
        assert!(repo.list().unwrap().is_empty());
    }
}
