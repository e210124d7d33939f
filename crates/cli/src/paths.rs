//! State-directory layout.
//!
//! Everything the tool persists lives in one directory: the browser profile
//! (`profile/`), the Space registry (`spaces.json`), and the broker and
//! credential records the workflow writes.

use std::path::PathBuf;

use anyhow::Context;

pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Uses the given directory, or the platform config dir
    /// (`~/.config/spaceup` on Linux) when none was passed.
    pub fn resolve(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        let root = match explicit {
            Some(dir) => dir,
            None => dirs::config_dir()
                .context("no config directory on this platform; pass --state-dir")?
                .join("spaceup"),
        };
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating state dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.root.join("profile")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("spaces.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_is_created_and_used() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::resolve(Some(dir.path().join("nested/state"))).unwrap();
        assert!(state.root().is_dir());
        assert!(state.registry_path().ends_with("spaces.json"));
        assert!(state.profile_dir().starts_with(state.root()));
    }
}
