// Settings and configuration for Azura applications

pub mod builder;
pub mod environment;
pub mod error;
pub mod loader;
pub mod repository;
pub mod settings;

pub use builder::SettingsLoader;
pub use environment::Environment;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use repository::ConfigRepository;
pub use settings::{AppEnv, Settings, keys};
