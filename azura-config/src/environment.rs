// Environment variable snapshot

use crate::{ConfigError, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Environment variables captured once at bootstrap.
///
/// Nothing reads the process environment after startup; components that need
/// a variable resolve this snapshot from the container instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Merge `KEY=value` lines from an `env.ini` style file; file entries win.
    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let entries = dotenvy::from_path_iter(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        for entry in entries {
            let (key, value) =
                entry.map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
            self.vars.insert(key, value);
        }

        Ok(())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lookup_with_default() {
        let env = Environment::from_pairs([("MYSQL_HOST", "db")]);

        assert_eq!(env.get("MYSQL_HOST"), Some("db"));
        assert_eq!(env.get_or("MYSQL_PORT", "3306"), "3306");
        assert!(!env.contains("MYSQL_PORT"));
    }

    #[test]
    fn test_merge_ini_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.ini");
        fs::write(&path, "APPLICATION_ENV=development\n# comment\nBASE_URL=\"http://radio.test\"\n")
            .unwrap();

        let mut env = Environment::from_pairs([("APPLICATION_ENV", "production")]);
        env.merge_file(&path).unwrap();

        assert_eq!(env.get("APPLICATION_ENV"), Some("development"));
        assert_eq!(env.get("BASE_URL"), Some("http://radio.test"));
    }

    #[test]
    fn test_merge_missing_file_fails() {
        let mut env = Environment::new();
        let result = env.merge_file("/definitely/not/here/env.ini");

        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
