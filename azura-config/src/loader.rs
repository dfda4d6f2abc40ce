// Configuration file parsing

use crate::{ConfigError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    /// `KEY=value` lines (`.env`, `env.ini`)
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" | "ini" => Some(FileFormat::Env),
            _ => None,
        }
    }

    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError(format!("{}: no file extension", path.display())))?;

        Self::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("{}: unsupported format", path.display())))
    }

    /// Extensions tried, in order, when looking a named file up.
    pub fn search_order() -> [&'static str; 2] {
        ["toml", "json"]
    }
}

/// Reads configuration files into JSON values.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Load a file, picking the format from its extension.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        Self::new(FileFormat::detect(path)?).load_file(path)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        self.parse(&content)
    }

    pub fn parse(&self, content: &str) -> Result<Value> {
        match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e))),
            FileFormat::Toml => toml::from_str::<Value>(content)
                .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e))),
            FileFormat::Env => {
                let mut map = serde_json::Map::new();
                for entry in dotenvy::from_read_iter(content.as_bytes()) {
                    let (key, value) = entry
                        .map_err(|e| ConfigError::ParseError(format!("env parse error: {}", e)))?;
                    map.insert(key, Value::String(value));
                }
                Ok(Value::Object(map))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_into_json_value() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let value = loader
            .parse("name = \"Radio\"\nis_docker = false\n[doctrine_options]\nhost = \"db\"\n")
            .unwrap();

        assert_eq!(value["name"], "Radio");
        assert_eq!(value["is_docker"], false);
        assert_eq!(value["doctrine_options"]["host"], "db");
    }

    #[test]
    fn test_parse_env_lines() {
        let loader = ConfigLoader::new(FileFormat::Env);
        let value = loader.parse("# comment\nKEY=value\nQUOTED=\"quoted value\"\n").unwrap();

        assert_eq!(value["KEY"], "value");
        assert_eq!(value["QUOTED"], "quoted value");
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let loader = ConfigLoader::new(FileFormat::Json);
        assert!(matches!(loader.parse("{nope"), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("TOML"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("ini"), Some(FileFormat::Env));
        assert_eq!(FileFormat::from_extension("php"), None);
        assert!(FileFormat::detect(Path::new("settings")).is_err());
    }
}
