// Error types for settings and configuration files

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No base directory specified!")]
    MissingBaseDir,

    #[error("Invalid application environment \"{0}\"; expected development, testing or production")]
    InvalidEnvironment(String),

    #[error("Invalid value for setting \"{key}\": {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration \"{0}\" not found")]
    NotFound(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
