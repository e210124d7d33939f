//! Provisioned-endpoint registry.
//!
//! A flat `spaces.json` holding every Space URL this installation has
//! provisioned plus a round-robin cursor. The onboarding workflow only ever
//! appends; the upload client advances the cursor to spread jobs across
//! Spaces. The camelCase on-disk schema is the established format and stays.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RegistryFile {
    spaces: Vec<String>,
    rr_index: usize,
}

/// File-backed registry of provisioned Space URLs.
pub struct SpaceRegistry {
    path: PathBuf,
}

fn normalize(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

impl SpaceRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<RegistryFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                // A corrupt file starts over empty rather than blocking runs.
                Ok(serde_json::from_str(&contents).unwrap_or_default())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(RegistryFile::default()),
            Err(err) => Err(Error::Store(format!("read registry: {err}"))),
        }
    }

    fn save(&self, file: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| Error::Store(format!("create registry dir: {err}")))?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(file)?)
            .map_err(|err| Error::Store(format!("write registry: {err}")))
    }

    /// Appends a Space URL, deduplicating on the normalized form.
    pub fn add(&self, url: &str) -> Result<Vec<String>> {
        let url = normalize(url);
        if url.is_empty() {
            return Err(Error::Store("space url required".into()));
        }
        let mut file = self.load()?;
        if !file.spaces.contains(&url) {
            file.spaces.push(url);
            self.save(&file)?;
        }
        Ok(file.spaces)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.load()?.spaces)
    }

    /// Returns the next Space URL round-robin and advances the cursor.
    pub fn next(&self) -> Result<String> {
        let mut file = self.load()?;
        if file.spaces.is_empty() {
            return Err(Error::Store(
                "no Space configured; run onboarding or add one with `spaces add`".into(),
            ));
        }
        let url = file.spaces[file.rr_index % file.spaces.len()].clone();
        file.rr_index = (file.rr_index + 1) % file.spaces.len();
        self.save(&file)?;
        Ok(url)
    }
}
