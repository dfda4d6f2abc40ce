// Named configuration files under the config directory

use crate::{ConfigError, ConfigLoader, FileFormat, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loads `config_dir/{name}.toml` (or `.json`) on first use and caches it.
#[derive(Debug)]
pub struct ConfigRepository {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Value>>>,
}

impl ConfigRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn has(&self, name: &str) -> bool {
        self.cache.read().contains_key(name) || self.locate(name).is_some()
    }

    pub fn get(&self, name: &str) -> Result<Arc<Value>> {
        if let Some(value) = self.cache.read().get(name) {
            return Ok(value.clone());
        }

        let path = self
            .locate(name)
            .ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
        let value = Arc::new(ConfigLoader::load_path(&path)?);

        self.cache.write().insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Deserialize a whole file into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;
        serde_json::from_value((*value).clone())
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", name, e)))
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        // Names are plain identifiers; refuse anything that walks directories.
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }

        FileFormat::search_order()
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Deserialize)]
    struct Assets {
        order: Vec<String>,
    }

    #[test]
    fn test_loads_and_caches_named_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("assets.toml"), "order = [\"jquery\", \"app\"]\n").unwrap();

        let repo = ConfigRepository::new(dir.path());
        assert!(repo.has("assets"));

        let assets: Assets = repo.get_as("assets").unwrap();
        assert_eq!(assets.order, vec!["jquery", "app"]);

        fs::remove_file(dir.path().join("assets.toml")).unwrap();
        assert!(repo.get("assets").is_ok());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConfigRepository::new(dir.path());

        assert!(matches!(repo.get("routes"), Err(ConfigError::NotFound(_))));
        assert!(!repo.has("../etc/passwd"));
    }
}
