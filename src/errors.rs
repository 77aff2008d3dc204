/// Workflow Git Sync Error Types
#[derive(Debug, thiserror::Error)]
pub enum GitSyncError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Branch management errors
    #[error("Branch error: {0}")]
    Branch(String),

    /// Network errors
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Encryption/decryption errors
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Missing repository/branch/credential errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Merge conflict errors
    #[error("Conflict error: {0}")]
    Conflict(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl GitSyncError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GitSyncError::Config(msg.into())
    }

    pub fn branch<S: Into<String>>(msg: S) -> Self {
        GitSyncError::Branch(msg.into())
    }

    pub fn auth<S: Into<String>>(msg: S) -> Self {
        GitSyncError::Auth(msg.into())
    }

    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        GitSyncError::Crypto(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        GitSyncError::NotFound(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        GitSyncError::Validation(msg.into())
    }

    pub fn network<S: Into<String>>(msg: S) -> Self {
        GitSyncError::Network(msg.into())
    }

    pub fn provider_api(provider: &str, status: u16, message: String) -> Self {
        GitSyncError::Auth(format!("{provider} API error: {status} - {message}"))
    }
}

pub type Result<T> = std::result::Result<T, GitSyncError>;
