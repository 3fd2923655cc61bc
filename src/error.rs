//! Error types and handling for ConnBench

use thiserror::Error;

/// Result type alias for ConnBench operations
pub type Result<T> = std::result::Result<T, Error>;

/// ConnBench error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive unreadable, destination not creatable, or an entry could not be written
    #[error("IO failure: {0}")]
    IoFailure(String),

    /// The TLS provider only offers restricted key lengths
    #[error("Crypto policy unsupported: {0}")]
    CryptoPolicyUnsupported(String),

    /// Wallet passphrase wrong or container corrupt
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Migration failure: {0}")]
    MigrationFailure(String),

    /// A single attempt could not reach or authenticate to the database
    #[error("Connect failure: {0}")]
    ConnectFailure(String),

    #[error("Cleanup failure: {0}")]
    CleanupFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the error must abort the run before (or instead of) a report.
    ///
    /// Per-attempt errors are recorded in the attempt result and never abort.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::ConnectFailure(_) | Error::Timeout(_))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::IoFailure(format!("zip archive: {}", e))
    }
}
