// Settings bootstrap: defaults, environment, settings file

use crate::settings::keys;
use crate::{AppEnv, ConfigError, ConfigLoader, Environment, FileFormat, Result, Settings};
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// Builds [`Settings`] the way an application boots.
///
/// Resolution order, later steps winning:
///
/// 1. defaults derived from `base_dir`
/// 2. explicit overrides passed to the loader
/// 3. the environment snapshot (`APPLICATION_ENV`, `BASE_URL`)
/// 4. `config_dir/settings.toml` (or `settings.json`)
///
/// ```no_run
/// use azura_config::SettingsLoader;
///
/// let (settings, env) = SettingsLoader::new()
///     .set("base_dir", "/var/azuracast/www")
///     .set("is_docker", false)
///     .load()?;
/// # Ok::<(), azura_config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    overrides: Map<String, Value>,
    environment: Option<Environment>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.to_string(), value.into());
        self
    }

    pub fn with_overrides(mut self, overrides: Map<String, Value>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    /// Use this environment instead of capturing the process environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn load(self) -> Result<(Settings, Environment)> {
        let base_dir = self
            .overrides
            .get(keys::BASE_DIR)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingBaseDir)?
            .to_string();

        let mut settings = Settings::new(base_dir);
        settings.replace(self.overrides.clone())?;

        let mut environment = self.environment.unwrap_or_else(Environment::from_process);
        if !settings.is_docker {
            let ini = settings.base_dir.join("env.ini");
            if ini.is_file() {
                trace!(path = %ini.display(), "Merging env.ini");
                environment.merge_file(&ini)?;
            }
        }

        if !self.overrides.contains_key(keys::APP_ENV) {
            settings.app_env = match environment.get("APPLICATION_ENV") {
                Some(name) => name.parse()?,
                None => AppEnv::Production,
            };
        }

        if settings.is_production() {
            settings.router_cache_file = Some(settings.temp_dir.join("app_routes.cache"));
        } else {
            settings.display_error_details = true;
        }

        if let Some(base_url) = environment.get("BASE_URL") {
            settings.base_url = Some(base_url.to_string());
        }

        for ext in FileFormat::search_order() {
            let path = settings.config_dir.join(format!("settings.{}", ext));
            if !path.is_file() {
                continue;
            }

            debug!(path = %path.display(), "Applying settings file");
            match ConfigLoader::load_path(&path)? {
                Value::Object(map) => settings.replace(map)?,
                _ => {
                    return Err(ConfigError::ParseError(format!(
                        "{}: expected a table of settings",
                        path.display()
                    )));
                }
            }
            break;
        }

        debug!(
            app_env = %settings.app_env,
            base_dir = %settings.base_dir.display(),
            is_docker = settings.is_docker,
            "Settings loaded"
        );

        Ok((settings, environment))
    }
}
