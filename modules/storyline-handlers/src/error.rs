use storyline_store::{MutationEvent, StoreError, StorePath};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Read or write failure. The handler stops; redelivery retries it.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed event at {path}: {reason}")]
    MalformedEvent { path: StorePath, reason: String },
}

impl HandlerError {
    pub fn malformed(path: &StorePath, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            path: path.clone(),
            reason: reason.into(),
        }
    }
}

/// Decode the event's new value, reporting a bad payload as malformed.
pub(crate) fn new_value<T: serde::de::DeserializeOwned>(
    event: &MutationEvent,
) -> Result<Option<T>, HandlerError> {
    event
        .new_as()
        .map_err(|e| HandlerError::malformed(&event.path, e.to_string()))
}

/// Decode the event's previous value, reporting a bad payload as malformed.
pub(crate) fn old_value<T: serde::de::DeserializeOwned>(
    event: &MutationEvent,
) -> Result<Option<T>, HandlerError> {
    event
        .old_as()
        .map_err(|e| HandlerError::malformed(&event.path, e.to_string()))
}
