// ============================================================
// Layer 6 — Config Store
// ============================================================
// Reads and writes run configurations as pretty-printed JSON.
//
//   sasrec init-config --path run.json   → save(default)
//   sasrec check --config run.json       → load_or_default
//
// Each check run also drops a copy of its effective config into
// the output directory so the metrics CSV can be traced back to
// the hyperparameters that produced it.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store writing `<dir>/run_config.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join("run_config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write `cfg`, creating parent directories as needed.
    pub fn save<T: Serialize>(&self, cfg: &T) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Cannot write config to '{}'", self.path.display()))?;

        tracing::debug!("Saved config to '{}'", self.path.display());
        Ok(())
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read config from '{}'", self.path.display()))?;

        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config in '{}'", self.path.display()))
    }

    /// `load`, or `T::default()` when the file does not exist.
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if !self.exists() {
            tracing::info!("No config at '{}', using defaults", self.path.display());
            return Ok(T::default());
        }
        self.load()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name:  String,
        steps: usize,
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sasrec-config-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_save_then_load() {
        let dir   = scratch("roundtrip");
        let store = ConfigStore::in_dir(dir.join("nested"));
        let cfg   = Sample { name: "smoke".into(), steps: 7 };

        store.save(&cfg).unwrap();
        assert!(store.exists());
        assert_eq!(store.load::<Sample>().unwrap(), cfg);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir   = scratch("missing");
        let store = ConfigStore::new(dir.join("none.json"));
        assert_eq!(store.load_or_default::<Sample>().unwrap(), Sample::default());
        assert!(store.load::<Sample>().is_err());
    }

    #[test]
    fn test_garbage_is_an_error() {
        let dir = scratch("garbage");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ConfigStore::new(&path).load_or_default::<Sample>().unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
        let _ = fs::remove_dir_all(&dir);
    }
}
