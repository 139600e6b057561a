// Error types shared by the data access modules.
//
// Library code returns these typed errors; binaries wrap them in anyhow.

use thiserror::Error;

/// Errors raised by reads and writes against the trip/pin tables.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("not signed in")]
    Unauthenticated,

    #[error("user {user_id} has no access to trip {trip_id}")]
    Forbidden { trip_id: String, user_id: String },

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn forbidden(trip_id: &str, user_id: &str) -> Self {
        StoreError::Forbidden {
            trip_id: trip_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    /// True when retrying the same call could succeed (I/O level failures).
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the invitation flow.
#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("invitation not found")]
    NotFound,

    #[error("invitation has expired")]
    Expired,

    #[error("user is already a collaborator on this trip")]
    AlreadyCollaborator,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for InvitationError {
    fn from(err: rusqlite::Error) -> Self {
        InvitationError::Store(StoreError::Database(err))
    }
}
