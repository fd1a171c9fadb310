//! JSON checkpoints of stage artifacts, so an interrupted run resumes at the
//! first stage without a saved result.
//!
//! Stages that derive from an earlier stage save their input next to their
//! result (`save_for`), and a saved result is only reused when that input is
//! unchanged.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::Result;

/// A stage result together with the input it was computed from.
#[derive(Debug, Serialize, Deserialize)]
struct Stamped<I, T> {
    input: I,
    value: T,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: Option<PathBuf>,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointStore {
            dir: Some(dir.into()),
        }
    }

    /// A store that never loads and never saves.
    pub fn disabled() -> Self {
        CheckpointStore { dir: None }
    }

    pub fn from_option(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => Self::new(dir),
            None => Self::disabled(),
        }
    }

    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{}.json", key)))
    }

    /// Load an artifact. Unreadable or unparsable files are reported and
    /// treated as missing.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path(key)?;
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(value) => {
                    log::info!("Loaded {} from {}", key, path.display());
                    Some(value)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}, recomputing", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}, recomputing", path.display(), e);
                None
            }
        }
    }

    /// Save an artifact atomically (write to a temporary file, then rename).
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let (Some(dir), Some(path)) = (self.dir.as_ref(), self.path(key)) else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut file, value)?;
        file.flush()?;
        file.persist(&path).map_err(|e| e.error)?;
        log::debug!("Saved {} to {}", key, path.display());
        Ok(())
    }

    /// Return the saved artifact, or compute and save it.
    pub fn load_or_compute<T, F>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.load(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.save(key, &value)?;
        Ok(value)
    }

    /// Load an artifact saved with `save_for`, if it was computed from
    /// `input`.
    pub fn load_for<I, T>(&self, key: &str, input: &I) -> Option<T>
    where
        I: DeserializeOwned + PartialEq,
        T: DeserializeOwned,
    {
        let saved: Stamped<I, T> = self.load(key)?;
        if saved.input == *input {
            Some(saved.value)
        } else {
            log::warn!("Saved {} was built from different inputs, recomputing", key);
            None
        }
    }

    pub fn save_for<I, T>(&self, key: &str, input: &I, value: &T) -> Result<()>
    where
        I: Serialize,
        T: Serialize,
    {
        self.save(key, &Stamped { input, value })
    }

    /// `load_or_compute` for a stage whose result depends on `input`.
    pub fn load_or_compute_for<I, T, F>(&self, key: &str, input: &I, compute: F) -> Result<T>
    where
        I: Serialize + DeserializeOwned + PartialEq,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.load_for(key, input) {
            return Ok(value);
        }
        let value = compute()?;
        self.save_for(key, input, &value)?;
        Ok(value)
    }
}
