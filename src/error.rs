//! Error taxonomy for the request lifecycle

/// Malformed input. Nothing has been written when one of these is returned.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Request title must not be empty")]
    EmptyTitle,
    #[error("Request owner must not be empty")]
    EmptyOwner,
    #[error("Acting user must not be empty")]
    EmptyActor,
    #[error("Requested-by label must not be empty")]
    EmptyRequester,
    #[error("Request must contain at least one item")]
    NoItems,
    #[error("Item field '{field}' is invalid")]
    InvalidItem { field: &'static str },
    #[error("Unrecognised action '{0}', expected one of approved, rejected, modified")]
    UnknownAction(String),
    #[error("A modified action requires at least one item edit")]
    NoItemEdits,
    #[error("Item edits would leave the request without any items")]
    WouldEmptyItems,
}

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("sled failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode document: {0}")]
    Encode(String),
    #[error("failed to decode document: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("failed to assign identifier: {0}")]
    Identifier(String),
    #[error("document '{0}' already exists")]
    Duplicate(String),
    #[error("document '{0}' does not exist")]
    Missing(String),
    #[error("document '{id}' is at version {found}, expected {expected}")]
    VersionConflict { id: String, expected: u64, found: u64 },
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Errors surfaced by [`crate::service::RequestService`].
#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Request '{0}' not found")]
    NotFound(String),
    #[error("Request '{id}' was changed concurrently (expected version {expected}, found {found})")]
    Conflict { id: String, expected: u64, found: u64 },
    #[error(transparent)]
    Persistence(PersistenceError),
}

impl From<PersistenceError> for LifecycleError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Missing(id) => LifecycleError::NotFound(id),
            PersistenceError::VersionConflict {
                id,
                expected,
                found,
            } => LifecycleError::Conflict {
                id,
                expected,
                found,
            },
            other => LifecycleError::Persistence(other),
        }
    }
}

/// Delivery failure. Never escapes the service, only logged.
#[derive(thiserror::Error, Debug)]
pub enum NotificationError {
    #[error("notification to '{recipient}' failed: {reason}")]
    Delivery { recipient: String, reason: String },
}
