//! Small key-value persistence for workflow side state.
//!
//! Two records live here: the last broker URL (`broker`) and a synthesized
//! replacement credential (`credentials`). The workflow takes the store as an
//! injected dependency so tests run without disk I/O.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// String-to-JSON-document store.
pub trait KvStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Credential record written when the platform forces a password reset.
/// Sensitive: the file store scopes its permissions to the owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub email: String,
    pub password: String,
    /// Unix seconds at which the credential was synthesized.
    pub ts: u64,
}

/// Current time as unix seconds.
pub fn now_ts() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Broker endpoint record, for an external UI to find the control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerRecord {
    pub url: String,
}

/// One JSON file per key under a state directory.
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for DirStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Store(format!("read {key}: {err}"))),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|err| Error::Store(format!("create state dir: {err}")))?;
        let path = self.path(key);
        std::fs::write(&path, value)
            .map_err(|err| Error::Store(format!("write {key}: {err}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .map_err(|err| Error::Store(format!("chmod {key}: {err}")))?;
        }
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path().to_path_buf());

        assert!(store.read("credentials").unwrap().is_none());

        let record = CredentialRecord {
            email: "you@example.com".into(),
            password: "s3cret".into(),
            ts: now_ts(),
        };
        store
            .write("credentials", &serde_json::to_string(&record).unwrap())
            .unwrap();

        let loaded: CredentialRecord =
            serde_json::from_str(&store.read("credentials").unwrap().unwrap()).unwrap();
        assert_eq!(loaded.password, "s3cret");
    }

    #[cfg(unix)]
    #[test]
    fn dir_store_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path().to_path_buf());
        store.write("credentials", "{}").unwrap();

        let mode = std::fs::metadata(dir.path().join("credentials.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        store.write("broker", r#"{"url":"http://127.0.0.1:1"}"#).unwrap();
        assert!(store.read("broker").unwrap().is_some());
        assert!(store.read("missing").unwrap().is_none());
    }
}
