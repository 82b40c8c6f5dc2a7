//! Storage layer for site credentials.
//!
//! Handles reading/writing credential records to `~/.roost/credentials/`.
//! Records are stored as plain JSON files; at-rest encryption is the
//! backend's contract, not this client's.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A login the backend can replay on a site during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Site or service this login belongs to (e.g. "github.com").
    pub service: String,
    pub username: String,
    pub password: String,
    /// Whether this is the login offered for its service.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(service: &str, username: &str, password: &str) -> Self {
        Self {
            service: service.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            active: false,
            created_at: Utc::now(),
        }
    }

    #[cfg(test)]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Manages credential storage
pub struct CredentialStore {
    /// Directory holding one JSON file per credential (~/.roost/credentials)
    dir: PathBuf,
}

impl CredentialStore {
    /// Create a new credential store rooted under `base_dir`
    pub fn new(base_dir: &Path) -> Result<Self> {
        let dir = base_dir.join("credentials");
        fs::create_dir_all(&dir).context("Failed to create credentials directory")?;
        Ok(Self { dir })
    }

    /// Get the path for a credential record
    fn record_path(&self, service: &str, username: &str) -> PathBuf {
        self.dir
            .join(format!("{}__{}.json", sanitize(service), sanitize(username)))
    }

    /// Save a credential to disk
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let path = self.record_path(&credential.service, &credential.username);
        let json =
            serde_json::to_string_pretty(credential).context("Failed to serialize credential")?;
        fs::write(&path, json).with_context(|| format!("Failed to write credential to {:?}", path))
    }

    /// Load a credential from disk
    pub fn load(&self, service: &str, username: &str) -> Result<Credential> {
        let path = self.record_path(service, username);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credential {:?}", path))?;
        serde_json::from_str(&json).context("Failed to parse credential JSON")
    }

    /// Delete a credential from disk
    pub fn delete(&self, service: &str, username: &str) -> Result<()> {
        let path = self.record_path(service, username);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete credential {:?}", path))?;
        }
        Ok(())
    }

    /// Check if a credential exists
    pub fn exists(&self, service: &str, username: &str) -> bool {
        self.record_path(service, username).exists()
    }

    /// List all credentials, newest first
    pub fn list(&self) -> Result<Vec<Credential>> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(json) => match serde_json::from_str::<Credential>(&json) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!("skipping unparseable credential {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    warn!("skipping unreadable credential {:?}: {}", path, e);
                }
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// List credentials for one service, newest first
    pub fn list_for_service(&self, service: &str) -> Result<Vec<Credential>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|c| c.service == service)
            .collect())
    }

    /// Mark one credential active and every other login for the same
    /// service inactive
    pub fn set_active(&self, service: &str, username: &str) -> Result<Credential> {
        if !self.exists(service, username) {
            anyhow::bail!("no credential stored for {service} / {username}");
        }
        let mut activated = None;
        for mut record in self.list_for_service(service)? {
            record.active = record.username == username;
            self.save(&record)?;
            if record.active {
                activated = Some(record);
            }
        }
        activated.ok_or_else(|| anyhow::anyhow!("no credential stored for {service} / {username}"))
    }
}

/// Flatten path-hostile characters out of a file-name component
fn sanitize(input: &str) -> String {
    input.replace(['/', '\\'], "_").replace("..", "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_store() -> (TempDir, CredentialStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (_temp, store) = setup_test_store();

        let cred = Credential::new("github.com", "octo", "hunter2");
        store.save(&cred).unwrap();

        let loaded = store.load("github.com", "octo").unwrap();
        assert_eq!(loaded.service, "github.com");
        assert_eq!(loaded.username, "octo");
        assert_eq!(loaded.password, "hunter2");
        assert!(!loaded.active);
    }

    #[test]
    fn test_delete() {
        let (_temp, store) = setup_test_store();

        store
            .save(&Credential::new("github.com", "octo", "hunter2"))
            .unwrap();
        assert!(store.exists("github.com", "octo"));

        store.delete("github.com", "octo").unwrap();
        assert!(!store.exists("github.com", "octo"));
    }

    #[test]
    fn test_list_newest_first() {
        let (_temp, store) = setup_test_store();

        let older = Credential::new("a.example", "old", "pw")
            .with_created_at(DateTime::from_timestamp(1000, 0).unwrap());
        let newer = Credential::new("b.example", "new", "pw")
            .with_created_at(DateTime::from_timestamp(2000, 0).unwrap());
        store.save(&older).unwrap();
        store.save(&newer).unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].username, "new");
        assert_eq!(records[1].username, "old");
    }

    #[test]
    fn test_set_active_is_exclusive_per_service() {
        let (_temp, store) = setup_test_store();

        store
            .save(&Credential::new("shop.example", "alice", "pw"))
            .unwrap();
        store
            .save(&Credential::new("shop.example", "bob", "pw"))
            .unwrap();
        let mut other = Credential::new("mail.example", "carol", "pw");
        other.active = true;
        store.save(&other).unwrap();

        let activated = store.set_active("shop.example", "bob").unwrap();
        assert!(activated.active);

        assert!(!store.load("shop.example", "alice").unwrap().active);
        assert!(store.load("shop.example", "bob").unwrap().active);
        // Another service's active flag is untouched.
        assert!(store.load("mail.example", "carol").unwrap().active);
    }

    #[test]
    fn test_set_active_unknown_credential_fails() {
        let (_temp, store) = setup_test_store();
        assert!(store.set_active("nowhere.example", "ghost").is_err());
    }

    #[test]
    fn test_path_hostile_names_stay_inside_the_store() {
        let (_temp, store) = setup_test_store();

        let cred = Credential::new("evil/../service", "user\\name", "pw");
        store.save(&cred).unwrap();
        assert!(store.exists("evil/../service", "user\\name"));

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service, "evil/../service");
    }
}
