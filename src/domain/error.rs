use thiserror::Error;

/// Error types for the routing workflow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// A referenced process, tramitação, opinion, position, sector or body does not exist
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The requested status change is not reachable from the current status
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition { entity: &'static str, from: String, to: String },

    /// The actor lacks the role, or is not the declared recipient/approver
    #[error("{0}")]
    Unauthorized(String),

    /// A uniqueness or single-outstanding-item rule would be violated
    #[error("{0}")]
    Conflict(String),

    /// Optimistic version check failed
    #[error("{entity} '{id}' was modified concurrently")]
    ConcurrentModification { entity: &'static str, id: String },

    /// An operation precondition does not hold (e.g. finalizing with pending counters)
    #[error("{0}")]
    PreconditionFailed(String),

    /// An aggregate invariant would be broken
    #[error("{0}")]
    InvariantViolation(String),

    /// Input validation errors
    #[error("{0}")]
    Validation(String),

    /// Persistence backend errors
    #[error("{0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("{0}")]
    Serialization(String),

    /// Configuration related errors
    #[error("{0}")]
    Configuration(String),

    /// Notification dispatch errors
    #[error("{0}")]
    Notification(String),

    /// Spawn errors
    #[error("{0}")]
    Spawn(String),

    /// Timeout errors
    #[error("{0}")]
    Timeout(String),

    /// Generic errors with context
    #[error("{0}")]
    Generic(String)
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        WorkflowError::NotFound { entity, id: id.into() }
    }

    pub fn invalid_transition(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        WorkflowError::InvalidTransition { entity, from: from.to_string(), to: to.to_string() }
    }

    pub fn concurrent(entity: &'static str, id: impl Into<String>) -> Self {
        WorkflowError::ConcurrentModification { entity, id: id.into() }
    }

    /// Only a lost optimistic race is safe to retry automatically
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::ConcurrentModification { .. })
    }
}

/// Convert from anyhow::Error
impl From<anyhow::Error> for WorkflowError {
    fn from(err: anyhow::Error) -> Self {
        WorkflowError::Generic(err.to_string())
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        WorkflowError::Storage(err.to_string())
    }
}

/// Convert from serde_yaml::Error
impl From<serde_yaml::Error> for WorkflowError {
    fn from(err: serde_yaml::Error) -> Self {
        WorkflowError::Serialization(err.to_string())
    }
}

/// Convert from serde_json::Error
impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Serialization(err.to_string())
    }
}

/// Convert from rocksdb::Error
impl From<rocksdb::Error> for WorkflowError {
    fn from(err: rocksdb::Error) -> Self {
        WorkflowError::Storage(err.to_string())
    }
}

/// Convert from ractor::SpawnErr
impl From<ractor::SpawnErr> for WorkflowError {
    fn from(err: ractor::SpawnErr) -> Self {
        WorkflowError::Spawn(err.to_string())
    }
}
