use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    #[error("Failed to fetch page: {0}")]
    Fetch(String),

    #[error("Search Console is not connected: {0}")]
    NotConnected(String),

    #[error("Search Console sync failed: {0}")]
    Sync(String),

    #[error("Suggestion provider error: {0}")]
    Provider(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Machine-readable error category, stable across message wording changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidTarget,
    Fetch,
    NotConnected,
    Sync,
    Provider,
    Cancelled,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTarget => "invalid_target",
            ErrorKind::Fetch => "fetch",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::Sync => "sync",
            ErrorKind::Provider => "provider",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            AppError::Fetch(_) => ErrorKind::Fetch,
            AppError::NotConnected(_) => ErrorKind::NotConnected,
            AppError::Sync(_) => ErrorKind::Sync,
            AppError::Provider(_) => ErrorKind::Provider,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::Database(_) => ErrorKind::Storage,
            AppError::Http(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::ConfigParse(_)
            | AppError::Config(_)
            | AppError::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}
