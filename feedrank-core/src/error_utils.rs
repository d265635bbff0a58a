use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl FeedError {
    /// Caller mistakes that cross the public boundary instead of degrading.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FeedError::InvalidArgument { .. } | FeedError::NotFound { .. }
        )
    }
}

impl ErrorExt for FeedError {
    fn log_error(&self) -> &Self {
        error!("FeedError: {}", self);
        match self {
            FeedError::DataAccess(e) => {
                error!("Data access error details: {:?}", e);
            }
            FeedError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FeedError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            FeedError::DataAccess(e) => e.is_retryable(),
            FeedError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FeedError::DataAccess(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FeedError::InvalidArgument { field, message } => {
                format!("Invalid value for '{}': {}", field, message)
            }
            FeedError::NotFound { resource } => format!("Could not find: {}", resource),
            FeedError::DataAccess(e) => e.user_friendly_message(),
            FeedError::Timeout { .. } => {
                "Building your feed took too long. Showing popular posts instead.".to_string()
            }
            FeedError::CircuitOpen => {
                "Personalized feeds are temporarily unavailable. Showing popular posts instead."
                    .to_string()
            }
            FeedError::Config(e) => e.user_friendly_message(),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            FeedError::InvalidArgument { .. } => "INVALID_ARGUMENT".to_string(),
            FeedError::NotFound { .. } => "NOT_FOUND".to_string(),
            FeedError::DataAccess(_) => "DATA_ACCESS".to_string(),
            FeedError::Timeout { .. } => "TIMEOUT".to_string(),
            FeedError::CircuitOpen => "CIRCUIT_OPEN".to_string(),
            FeedError::Fallback { .. } => "FALLBACK".to_string(),
            FeedError::Config(_) => "CONFIG".to_string(),
        }
    }
}

impl ErrorExt for DataAccessError {
    fn log_error(&self) -> &Self {
        error!("DataAccessError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DataAccessError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            DataAccessError::InvalidRow { .. } | DataAccessError::Migration(_) => false,
            DataAccessError::Sql(e) => !matches!(
                e,
                sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::Decode(_)
                    | sqlx::Error::TypeNotFound { .. }
            ),
            _ => true,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DataAccessError::DatabaseLocked => Some(Duration::from_millis(50)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DataAccessError::ConnectionFailed { .. } => {
                "Could not reach the content store. Please try again.".to_string()
            }
            DataAccessError::DatabaseLocked => {
                "The content store is temporarily busy. Please try again.".to_string()
            }
            _ => "Content store error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DataAccessError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DataAccessError::Unavailable { .. } => "DB_UNAVAILABLE".to_string(),
            DataAccessError::InvalidRow { .. } => "DB_INVALID_ROW".to_string(),
            DataAccessError::DatabaseLocked => "DB_LOCKED".to_string(),
            DataAccessError::TaskFailed { .. } => "DB_TASK_FAILED".to_string(),
            DataAccessError::Sql(_) => "DB_SQL_ERROR".to_string(),
            DataAccessError::Migration(_) => "DB_MIGRATION_FAILED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &FeedError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
            if error.is_retryable() {
                if let Some(retry_after) = error.retry_after() {
                    info!("Error is retryable. Retry after: {:?}", retry_after);
                }
            }
        }
    }

    pub fn report_warning(&self, error: &FeedError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
