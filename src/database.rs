//! MySQL/MariaDB connection pool registered as `db` and `em`.
//!
//! Connection options come from `MYSQL_*` variables inside Docker and from
//! `db_*` variables otherwise; the `conn` table of `doctrine_options`
//! overrides either.

use azura_config::{Environment, Settings};
use azura_core::{Container, Error, Result, type_key};
use azura_log::{debug, info};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    pub charset: String,
    pub max_connections: u32,
}

impl DbOptions {
    pub fn from_environment(settings: &Settings, env: &Environment) -> Result<Self> {
        let mut options = if settings.is_docker() {
            Self {
                host: env.get_or("MYSQL_HOST", "mariadb"),
                port: parse_port(&env.get_or("MYSQL_PORT", "3306"))?,
                database: required(env, "MYSQL_DATABASE")?,
                username: required(env, "MYSQL_USER")?,
                password: env.get("MYSQL_PASSWORD").map(str::to_string),
                charset: "utf8mb4".to_string(),
                max_connections: DEFAULT_MAX_CONNECTIONS,
            }
        } else {
            Self {
                host: env.get_or("db_host", "localhost"),
                port: parse_port(&env.get_or("db_port", "3306"))?,
                database: env.get_or("db_name", "azuracast"),
                username: env.get_or("db_username", "azuracast"),
                password: env.get("db_password").map(str::to_string),
                charset: "utf8mb4".to_string(),
                max_connections: DEFAULT_MAX_CONNECTIONS,
            }
        };

        if let Some(Value::Object(conn)) = settings.doctrine_options.get("conn") {
            for (key, value) in conn {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => continue,
                };
                match key.as_str() {
                    "host" => options.host = text,
                    "port" => options.port = parse_port(&text)?,
                    "dbname" => options.database = text,
                    "user" => options.username = text,
                    "password" => options.password = Some(text),
                    "charset" => options.charset = text,
                    "max_connections" => {
                        options.max_connections = text.parse().map_err(|_| {
                            Error::Bootstrap(format!("Invalid max_connections \"{}\"", text))
                        })?
                    }
                    _ => {}
                }
            }
        }

        Ok(options)
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .charset(&self.charset);

        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

fn required(env: &Environment, key: &str) -> Result<String> {
    env.get(key)
        .map(str::to_string)
        .ok_or_else(|| Error::Bootstrap(format!("Environment variable {} is not set.", key)))
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Bootstrap(format!("Invalid database port \"{}\"", value)))
}

/// Lazily connecting pool; no connection is opened until the first query.
#[derive(Debug, Clone)]
pub struct Database {
    pool: MySqlPool,
    options: DbOptions,
}

impl Database {
    /// Must be called inside a tokio runtime.
    pub fn connect_lazy(options: DbOptions) -> Self {
        let pool = MySqlPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy_with(options.connect_options());

        info!(
            host = %options.host,
            port = options.port,
            database = %options.database,
            "Database pool configured"
        );
        Self { pool, options }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("database unavailable: {}", e)))?;
        debug!("Database ping succeeded");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn register(container: &Container) -> Result<()> {
    if !container.has_type::<Database>() {
        container.singleton_type(|c| {
            let settings = c.resolve::<Settings>()?;
            let env = c.resolve::<Environment>()?;
            Ok(Database::connect_lazy(DbOptions::from_environment(&settings, &env)?))
        });
    }

    for alias in ["db", "em"] {
        if !container.has(alias) {
            container.alias(alias, type_key::<Database>())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_docker_defaults() {
        let mut settings = Settings::new("/srv/www");
        settings.is_docker = false;
        let options = DbOptions::from_environment(&settings, &Environment::new()).unwrap();

        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 3306);
        assert_eq!(options.database, "azuracast");
        assert_eq!(options.username, "azuracast");
        assert_eq!(options.password, None);
    }

    #[test]
    fn test_docker_reads_mysql_variables() {
        let settings = Settings::new("/srv/www");
        let env = Environment::from_pairs([
            ("MYSQL_DATABASE", "radio"),
            ("MYSQL_USER", "dj"),
            ("MYSQL_PASSWORD", "secret"),
        ]);
        let options = DbOptions::from_environment(&settings, &env).unwrap();

        assert_eq!(options.host, "mariadb");
        assert_eq!(options.database, "radio");
        assert_eq!(options.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_docker_requires_database_name() {
        let settings = Settings::new("/srv/www");
        let err = DbOptions::from_environment(&settings, &Environment::new()).unwrap_err();
        assert!(matches!(err, Error::Bootstrap(_)));
    }

    #[test]
    fn test_conn_options_override_environment() {
        let mut settings = Settings::new("/srv/www");
        settings.is_docker = false;
        settings
            .doctrine_options
            .insert("conn".to_string(), json!({"host": "db.internal", "port": 3307}));

        let options = DbOptions::from_environment(&settings, &Environment::new()).unwrap();
        assert_eq!(options.host, "db.internal");
        assert_eq!(options.port, 3307);
    }

    #[tokio::test]
    async fn test_registers_aliases() {
        let container = Container::new();
        let mut settings = Settings::new("/srv/www");
        settings.is_docker = false;
        container.instance(type_key::<Settings>(), Arc::new(settings));
        container.instance(type_key::<Environment>(), Arc::new(Environment::new()));
        register(&container).unwrap();

        let db = container.get::<Database>("db").unwrap();
        let em = container.get::<Database>("em").unwrap();
        assert!(Arc::ptr_eq(&db, &em));
        assert_eq!(db.options().port, 3306);
    }
}
