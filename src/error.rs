// Error taxonomy shared by the registry, the usage log and the storage adapters

use crate::machine::{MachineKey, MachineStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaundryError {
    /// A machine (or sensor node) already exists at this key.
    #[error("{0} already exists")]
    Conflict(String),

    /// The addressed machine, node or usage anchor does not exist.
    #[error("{0} was not found")]
    NotFound(String),

    #[error("missing or invalid API key")]
    Unauthorized,

    /// Malformed entity or filter.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("machine {key} cannot move from {from} to {to}")]
    InvalidTransition {
        key: MachineKey,
        from: MachineStatus,
        to: MachineStatus,
    },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// The persistence store could not serve the request.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl LaundryError {
    pub fn machine_not_found(key: MachineKey) -> Self {
        LaundryError::NotFound(format!("Machine at floor {} position {}", key.floor, key.pos))
    }

    pub fn machine_exists(key: MachineKey) -> Self {
        LaundryError::Conflict(format!("Machine at floor {} position {}", key.floor, key.pos))
    }

    /// Only backend failures are worth another attempt; everything else is
    /// deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LaundryError::BackendUnavailable(_))
    }
}

impl From<rusqlite::Error> for LaundryError {
    fn from(err: rusqlite::Error) -> Self {
        LaundryError::BackendUnavailable(err.to_string())
    }
}

impl From<deadpool_sqlite::PoolError> for LaundryError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        LaundryError::BackendUnavailable(format!("connection pool: {}", err))
    }
}

impl From<deadpool_sqlite::InteractError> for LaundryError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        LaundryError::BackendUnavailable(format!("sqlite worker: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, LaundryError>;
