// Application settings

use crate::{ConfigError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Recognised setting keys, as they appear in override maps and settings files.
pub mod keys {
    pub const APP_NAME: &str = "name";
    pub const APP_ENV: &str = "app_env";

    pub const BASE_DIR: &str = "base_dir";
    pub const TEMP_DIR: &str = "temp_dir";
    pub const CONFIG_DIR: &str = "config_dir";
    pub const VIEWS_DIR: &str = "views_dir";
    pub const DOCTRINE_OPTIONS: &str = "doctrine_options";
    pub const IS_DOCKER: &str = "is_docker";
    pub const IS_CLI: &str = "is_cli";

    pub const BASE_URL: &str = "base_url";
    pub const ASSETS_URL: &str = "assets_url";

    pub const HTTP_VERSION: &str = "httpVersion";
    pub const RESPONSE_CHUNK_SIZE: &str = "responseChunkSize";
    pub const OUTPUT_BUFFERING: &str = "outputBuffering";
    pub const ROUTE_BEFORE_MIDDLEWARE: &str = "determineRouteBeforeAppMiddleware";
    pub const DISPLAY_ERROR_DETAILS: &str = "displayErrorDetails";
    pub const ADD_CONTENT_LENGTH: &str = "addContentLengthHeader";
    pub const ROUTER_CACHE_FILE: &str = "routerCacheFile";
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Development,
    Testing,
    #[default]
    Production,
}

impl AppEnv {
    pub fn as_str(self) -> &'static str {
        match self {
            AppEnv::Development => "development",
            AppEnv::Testing => "testing",
            AppEnv::Production => "production",
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(AppEnv::Development),
            "testing" => Ok(AppEnv::Testing),
            "production" => Ok(AppEnv::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

/// Application settings.
///
/// Every recognised key is a typed field; anything else a host application
/// sets lands in `extra` and stays addressable through [`Settings::get`].
/// Built once by [`SettingsLoader`](crate::SettingsLoader) and shared
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub name: String,
    pub app_env: AppEnv,

    pub base_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub config_dir: PathBuf,
    pub views_dir: PathBuf,
    pub is_docker: bool,
    pub is_cli: bool,

    pub base_url: Option<String>,
    pub assets_url: String,

    pub http_version: String,
    pub response_chunk_size: usize,
    /// `"append"` or `"prepend"`; `None` disables buffering.
    pub output_buffering: Option<String>,
    pub determine_route_before_app_middleware: bool,
    pub display_error_details: bool,
    pub add_content_length_header: bool,
    pub router_cache_file: Option<PathBuf>,

    /// Database and entity-manager options
    pub doctrine_options: Map<String, Value>,

    pub extra: BTreeMap<String, Value>,
}

impl Settings {
    /// Settings rooted at `base_dir` with every default applied.
    ///
    /// The temp directory sits next to the base directory (`../www_tmp`); the
    /// config and views directories live inside it.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let temp_dir = base_dir
            .parent()
            .unwrap_or_else(|| Path::new("/"))
            .join("www_tmp");

        Self {
            name: "Application".to_string(),
            app_env: AppEnv::Production,
            temp_dir,
            config_dir: base_dir.join("config"),
            views_dir: base_dir.join("templates"),
            base_dir,
            is_docker: true,
            is_cli: false,
            base_url: None,
            assets_url: "/static".to_string(),
            http_version: "1.1".to_string(),
            response_chunk_size: 4096,
            output_buffering: None,
            determine_route_before_app_middleware: true,
            display_error_details: false,
            add_content_length_header: false,
            router_cache_file: None,
            doctrine_options: Map::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    pub fn is_testing(&self) -> bool {
        self.app_env == AppEnv::Testing
    }

    pub fn is_docker(&self) -> bool {
        self.is_docker
    }

    pub fn is_cli(&self) -> bool {
        self.is_cli
    }

    /// Look a setting up by key, typed fields included.
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = match key {
            keys::APP_NAME => Value::from(self.name.clone()),
            keys::APP_ENV => Value::from(self.app_env.as_str()),
            keys::BASE_DIR => path_value(&self.base_dir),
            keys::TEMP_DIR => path_value(&self.temp_dir),
            keys::CONFIG_DIR => path_value(&self.config_dir),
            keys::VIEWS_DIR => path_value(&self.views_dir),
            keys::DOCTRINE_OPTIONS => Value::Object(self.doctrine_options.clone()),
            keys::IS_DOCKER => Value::from(self.is_docker),
            keys::IS_CLI => Value::from(self.is_cli),
            keys::BASE_URL => return self.base_url.clone().map(Value::from),
            keys::ASSETS_URL => Value::from(self.assets_url.clone()),
            keys::HTTP_VERSION => Value::from(self.http_version.clone()),
            keys::RESPONSE_CHUNK_SIZE => Value::from(self.response_chunk_size),
            keys::OUTPUT_BUFFERING => match &self.output_buffering {
                Some(mode) => Value::from(mode.clone()),
                None => Value::Bool(false),
            },
            keys::ROUTE_BEFORE_MIDDLEWARE => Value::from(self.determine_route_before_app_middleware),
            keys::DISPLAY_ERROR_DETAILS => Value::from(self.display_error_details),
            keys::ADD_CONTENT_LENGTH => Value::from(self.add_content_length_header),
            keys::ROUTER_CACHE_FILE => return self.router_cache_file.as_deref().map(path_value),
            other => return self.extra.get(other).cloned(),
        };
        Some(value)
    }

    /// Typed lookup; `None` when the key is absent or does not deserialize.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set one key. Recognised keys are validated against their field type.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        match key {
            keys::APP_NAME => self.name = typed(key, value)?,
            keys::APP_ENV => {
                let env: String = typed(key, value)?;
                self.app_env = env.parse()?;
            }
            keys::BASE_DIR => self.base_dir = typed(key, value)?,
            keys::TEMP_DIR => self.temp_dir = typed(key, value)?,
            keys::CONFIG_DIR => self.config_dir = typed(key, value)?,
            keys::VIEWS_DIR => self.views_dir = typed(key, value)?,
            keys::DOCTRINE_OPTIONS => self.doctrine_options = typed(key, value)?,
            keys::IS_DOCKER => self.is_docker = typed(key, value)?,
            keys::IS_CLI => self.is_cli = typed(key, value)?,
            keys::BASE_URL => self.base_url = typed(key, value)?,
            keys::ASSETS_URL => self.assets_url = typed(key, value)?,
            keys::HTTP_VERSION => self.http_version = typed(key, value)?,
            keys::RESPONSE_CHUNK_SIZE => self.response_chunk_size = typed(key, value)?,
            keys::OUTPUT_BUFFERING => {
                self.output_buffering = match value {
                    Value::Bool(false) | Value::Null => None,
                    other => Some(typed(key, other)?),
                }
            }
            keys::ROUTE_BEFORE_MIDDLEWARE => {
                self.determine_route_before_app_middleware = typed(key, value)?
            }
            keys::DISPLAY_ERROR_DETAILS => self.display_error_details = typed(key, value)?,
            keys::ADD_CONTENT_LENGTH => self.add_content_length_header = typed(key, value)?,
            keys::ROUTER_CACHE_FILE => self.router_cache_file = typed(key, value)?,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        Ok(())
    }

    /// Apply every entry of an override map, in order.
    pub fn replace(&mut self, values: Map<String, Value>) -> Result<()> {
        for (key, value) in values {
            self.set(&key, value)?;
        }
        Ok(())
    }
}

fn path_value(path: &Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

fn typed<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_directories_follow_base_dir() {
        let settings = Settings::new("/var/azuracast/www");

        assert_eq!(settings.temp_dir, PathBuf::from("/var/azuracast/www_tmp"));
        assert_eq!(settings.config_dir, PathBuf::from("/var/azuracast/www/config"));
        assert_eq!(settings.views_dir, PathBuf::from("/var/azuracast/www/templates"));
        assert!(settings.is_docker());
        assert!(settings.is_production());
    }

    #[test]
    fn test_environment_flags_are_exclusive() {
        let mut settings = Settings::new("/app");

        for (env, production, testing) in [
            ("production", true, false),
            ("testing", false, true),
            ("development", false, false),
        ] {
            settings.set(keys::APP_ENV, json!(env)).unwrap();
            assert_eq!(settings.is_production(), production);
            assert_eq!(settings.is_testing(), testing);
            assert!(!(settings.is_production() && settings.is_testing()));
        }
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let mut settings = Settings::new("/app");
        let err = settings.set(keys::APP_ENV, json!("staging")).unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnvironment(_)));
        assert!(settings.is_production());
    }

    #[test]
    fn test_get_uses_original_key_names() {
        let settings = Settings::new("/app");

        assert_eq!(settings.get(keys::HTTP_VERSION), Some(json!("1.1")));
        assert_eq!(settings.get(keys::RESPONSE_CHUNK_SIZE), Some(json!(4096)));
        assert_eq!(settings.get(keys::APP_NAME), Some(json!("Application")));
        assert_eq!(settings.get(keys::BASE_URL), None);
        assert_eq!(settings.get("unknown"), None);
    }

    #[test]
    fn test_output_buffering_and_content_length_default_off() {
        let mut settings = Settings::new("/app");
        assert_eq!(settings.get(keys::OUTPUT_BUFFERING), Some(json!(false)));
        assert_eq!(settings.get(keys::ADD_CONTENT_LENGTH), Some(json!(false)));

        settings.set(keys::OUTPUT_BUFFERING, json!("prepend")).unwrap();
        assert_eq!(settings.output_buffering.as_deref(), Some("prepend"));

        settings.set(keys::OUTPUT_BUFFERING, json!(false)).unwrap();
        assert_eq!(settings.output_buffering, None);
    }

    #[test]
    fn test_extra_keys_round_trip() {
        let mut settings = Settings::new("/app");
        settings.set("station_limit", json!(25)).unwrap();

        assert_eq!(settings.get_as::<u32>("station_limit"), Some(25));
        assert!(settings.has("station_limit"));
    }

    #[test]
    fn test_replace_validates_types() {
        let mut settings = Settings::new("/app");
        let mut overrides = Map::new();
        overrides.insert(keys::IS_DOCKER.to_string(), json!("yes"));

        let err = settings.replace(overrides).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
