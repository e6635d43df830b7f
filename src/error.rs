use thiserror::Error;

/// Error taxonomy for the reservation engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("city mismatch: this instance owns '{owned}', request was for '{requested}'")]
    CityMismatch { owned: String, requested: String },

    #[error("no charging-point worker available for this window")]
    NoWorkerAvailable,

    #[error("requested window conflicts with an existing reservation")]
    WindowConflict,

    #[error("network failure talking to {0}: {1}")]
    NetworkFailure(String, String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("registry lookup failed for city '{0}': {1}")]
    RegistryLookupFailure(String, String),

    #[error("ledger call failed: {0}")]
    LedgerFailure(String),

    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
