use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Invalid argument for {field}: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Data access error: {0}")]
    DataAccess(#[from] DataAccessError),

    #[error("Operation timeout after {millis} ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Fallback feed failed: {message}")]
    Fallback { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

}

impl FeedError {
    pub fn invalid_argument(field: &str, message: impl Into<String>) -> Self {
        FeedError::InvalidArgument {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        FeedError::NotFound {
            resource: resource.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Data source unavailable: {source_name}")]
    Unavailable { source_name: String },

    #[error("Malformed row in {table}: {details}")]
    InvalidRow { table: String, details: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("Background task failed: {reason}")]
    TaskFailed { reason: String },

    #[error("SQL error: {0}")]
    Sql(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

// SQLite primary result codes; extended codes carry them in the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl From<sqlx::Error> for DataAccessError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) => {
                let primary = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                match primary {
                    Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => DataAccessError::DatabaseLocked,
                    _ => DataAccessError::Sql(error),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => DataAccessError::Unavailable {
                source_name: "connection pool".to_string(),
            },
            _ => DataAccessError::Sql(error),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
