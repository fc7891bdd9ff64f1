//! Durable credential storage
//!
//! One JSON file holding the current credential. Writes go through a
//! temp-file-then-rename so a crash mid-write never leaves a torn file behind.

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::Credential;

/// On-disk shadow of the in-memory credential.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted credential. An absent file is the normal first-boot
    /// state; unreadable or corrupt content is reported and treated as absent.
    pub fn load(&self) -> Option<Credential> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read credential state {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(credential) => Some(credential),
            Err(e) => {
                tracing::warn!(
                    "Credential state {} is corrupt, treating as absent: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persist the credential atomically: write a sibling temp file, then
    /// rename it over the real one.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create state directory")?;
        }

        let content =
            serde_json::to_string_pretty(credential).context("Failed to serialize credential")?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;

        // Set restrictive permissions on the state file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&tmp, perms).context("Failed to set state file permissions")?;
        }

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }

    /// Remove the persisted credential. Missing file counts as success.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove {}", self.path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_store(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("state.json"))
    }

    fn make_credential() -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc::now() + Duration::seconds(3600)),
            scope: vec!["offline_access".to_string(), "mb:vehicle:mbdata:evstatus".to_string()],
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(&dir);
        let cred = make_credential();

        store.save(&cred).unwrap();
        assert_eq!(store.load(), Some(cred));
    }

    #[test]
    fn test_absent_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(make_store(&dir).load(), None);
    }

    #[test]
    fn test_corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(&dir);
        fs::write(store.path(), "{ not json").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_save_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(&dir);

        store.save(&make_credential()).unwrap();
        let mut updated = make_credential();
        updated.access_token = "rotated".to_string();
        store.save(&updated).unwrap();

        assert_eq!(store.load(), Some(updated));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(&dir);
        store.save(&make_credential()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["state.json"]);
    }

    #[test]
    fn test_clear_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(&dir);
        store.save(&make_credential()).unwrap();

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        // Clearing an already-absent state is fine
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_state_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = make_store(&dir);
        store.save(&make_credential()).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
