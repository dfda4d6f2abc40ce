// Error types for the Azura kernel

use azura_cache::CacheError;
use azura_config::ConfigError;
use azura_log::LogLevel;
use azura_session::SessionError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub const NOT_LOGGED_IN_MESSAGE: &str = "You must be logged in to access this page.";
pub const PERMISSION_DENIED_MESSAGE: &str =
    "You do not have permission to access this portion of the site.";
pub const RATE_LIMIT_MESSAGE: &str = "You have exceeded the rate limit for this application.";

#[derive(Error, Debug)]
pub enum Error {
    /// Unrecoverable startup failure; the process must not continue.
    #[error("{0}")]
    Bootstrap(String),

    #[error("{0}")]
    Exception(AppException),

    #[error("You must be logged in to access this page.")]
    NotLoggedIn,

    #[error("You do not have permission to access this portion of the site.")]
    PermissionDenied,

    #[error("{0}")]
    RateLimitExceeded(String),

    #[error("Identifier \"{0}\" is not defined.")]
    ServiceNotFound(String),

    #[error("Container error while retrieving \"{id}\"")]
    Container {
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Service \"{id}\" is not of type \"{expected}\".")]
    ServiceType { id: String, expected: &'static str },

    #[error("Alias \"{0}\" would create a resolution cycle.")]
    AliasCycle(String),

    #[error("Attribute \"{0}\" was not set.")]
    MissingAttribute(String),

    #[error("Attribute \"{name}\" is not of type \"{expected}\".")]
    AttributeType { name: String, expected: &'static str },

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Cannot generate route: {0}")]
    RouteGeneration(String),

    #[error("Base URL could not be determined.")]
    BaseUrl,

    #[error("Library {0} not found!")]
    LibraryNotFound(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Application exception with the caller's location attached.
    #[track_caller]
    pub fn exception(message: impl Into<String>) -> Self {
        Error::Exception(AppException::new(message))
    }

    pub fn rate_limit_exceeded() -> Self {
        Error::RateLimitExceeded(RATE_LIMIT_MESSAGE.to_string())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Error::Exception(e) => e.code,
            Error::NotLoggedIn | Error::PermissionDenied => 403,
            Error::RateLimitExceeded(_) => 429,
            Error::RouteNotFound(_) => 404,
            Error::MethodNotAllowed(_) => 405,
            Error::Container { source, .. } => source.status_code(),
            _ => 500,
        }
    }

    /// Severity this error is logged at.
    pub fn level(&self) -> LogLevel {
        match self {
            Error::Exception(e) => e.level,
            Error::RateLimitExceeded(_) => LogLevel::Info,
            Error::RouteNotFound(_) | Error::MethodNotAllowed(_) => LogLevel::Info,
            Error::NotLoggedIn | Error::PermissionDenied => LogLevel::Info,
            Error::Container { source, .. } => source.level(),
            _ => LogLevel::Error,
        }
    }

    /// Errors raised deliberately by application code; the container lets
    /// these through a failing factory unwrapped.
    pub fn is_application_error(&self) -> bool {
        matches!(
            self,
            Error::Bootstrap(_)
                | Error::Exception(_)
                | Error::NotLoggedIn
                | Error::PermissionDenied
                | Error::RateLimitExceeded(_)
        )
    }

    /// Short variant name for error pages.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Bootstrap(_) => "Bootstrap",
            Error::Exception(_) => "Exception",
            Error::NotLoggedIn => "NotLoggedIn",
            Error::PermissionDenied => "PermissionDenied",
            Error::RateLimitExceeded(_) => "RateLimitExceeded",
            Error::ServiceNotFound(_) => "ServiceNotFound",
            Error::Container { .. } => "Container",
            Error::ServiceType { .. } => "ServiceType",
            Error::AliasCycle(_) => "AliasCycle",
            Error::MissingAttribute(_) => "MissingAttribute",
            Error::AttributeType { .. } => "AttributeType",
            Error::RouteNotFound(_) => "RouteNotFound",
            Error::MethodNotAllowed(_) => "MethodNotAllowed",
            Error::RouteGeneration(_) => "RouteGeneration",
            Error::BaseUrl => "BaseUrl",
            Error::LibraryNotFound(_) => "LibraryNotFound",
            Error::Template(_) => "Template",
            Error::Io(_) => "Io",
            Error::Serialization(_) => "Serialization",
            Error::Config(_) => "Config",
            Error::Cache(_) => "Cache",
            Error::Session(_) => "Session",
            Error::Http(_) => "Http",
            Error::Internal(_) => "Internal",
        }
    }

    pub fn as_exception(&self) -> Option<&AppException> {
        match self {
            Error::Exception(e) => Some(e),
            _ => None,
        }
    }

    /// Source location, when the error carries one.
    pub fn location(&self) -> Option<&'static Location<'static>> {
        match self {
            Error::Exception(e) => Some(e.location),
            Error::Container { source, .. } => source.location(),
            _ => None,
        }
    }

    /// Messages of this error and every error beneath it.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<AppException> for Error {
    fn from(err: AppException) -> Self {
        Error::Exception(err)
    }
}

/// An application-level error with a log severity and optional structured
/// data for the detailed error page.
#[derive(Debug, Clone)]
pub struct AppException {
    pub message: String,
    pub formatted_message: Option<String>,
    pub level: LogLevel,
    pub code: u16,
    pub extra_data: Vec<(String, BTreeMap<String, Value>)>,
    pub logging_context: BTreeMap<String, Value>,
    pub location: &'static Location<'static>,
}

impl AppException {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            formatted_message: None,
            level: LogLevel::Error,
            code: 500,
            extra_data: Vec::new(),
            logging_context: BTreeMap::new(),
            location: Location::caller(),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_formatted_message(mut self, message: impl Into<String>) -> Self {
        self.formatted_message = Some(message.into());
        self
    }

    /// Attach a titled table. Only JSON objects are kept.
    pub fn with_extra_data(mut self, title: impl Into<String>, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.extra_data.push((title.into(), map.into_iter().collect()));
        }
        self
    }

    pub fn with_logging_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.logging_context.insert(key.into(), value.into());
        self
    }

    /// Display form of the message, falling back to the plain message.
    pub fn formatted_message(&self) -> &str {
        self.formatted_message.as_deref().unwrap_or(&self.message)
    }
}

impl fmt::Display for AppException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_messages() {
        assert_eq!(Error::NotLoggedIn.to_string(), NOT_LOGGED_IN_MESSAGE);
        assert_eq!(Error::PermissionDenied.to_string(), PERMISSION_DENIED_MESSAGE);
        assert_eq!(Error::rate_limit_exceeded().to_string(), RATE_LIMIT_MESSAGE);
        assert_eq!(
            Error::MissingAttribute("router".into()).to_string(),
            "Attribute \"router\" was not set."
        );
    }

    #[test]
    fn test_status_and_level() {
        let limited = Error::rate_limit_exceeded();
        assert_eq!(limited.status_code(), 429);
        assert_eq!(limited.level(), LogLevel::Info);

        assert_eq!(Error::RouteNotFound("/x".into()).status_code(), 404);
        assert_eq!(Error::Internal("boom".into()).level(), LogLevel::Error);
    }

    #[test]
    fn test_exception_builder() {
        let line = line!() + 1;
        let err = AppException::new("Station offline")
            .with_level(LogLevel::Warn)
            .with_formatted_message("<b>Station offline</b>")
            .with_extra_data("Station", json!({"id": 1, "name": "Radio"}))
            .with_extra_data("Ignored", json!("not a table"))
            .with_logging_context("station_id", 1);

        assert_eq!(err.location.line(), line);
        assert_eq!(err.formatted_message(), "<b>Station offline</b>");
        assert_eq!(err.extra_data.len(), 1);
        assert_eq!(err.extra_data[0].1["name"], json!("Radio"));

        let err: Error = err.into();
        assert_eq!(err.level(), LogLevel::Warn);
        assert!(err.location().is_some());
        assert!(err.is_application_error());
    }

    #[test]
    fn test_container_error_chain() {
        let err = Error::Container {
            id: "cache".into(),
            source: Box::new(Error::ServiceNotFound("redis".into())),
        };

        let chain = err.chain();
        assert_eq!(chain[0], "Container error while retrieving \"cache\"");
        assert_eq!(chain[1], "Identifier \"redis\" is not defined.");
        assert!(!err.is_application_error());
    }
}
