//! Core types for mutation delivery. Domain-agnostic.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::StorePath;
use crate::store::StoreError;

/// A value at `path` was created, changed, or removed.
///
/// `old_value == None` signals a fresh creation, `new_value == None` a removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub path: StorePath,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl MutationEvent {
    pub fn new(path: StorePath, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            path,
            old_value,
            new_value,
        }
    }

    pub fn created(path: StorePath, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    pub fn removed(path: StorePath, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    pub fn is_creation(&self) -> bool {
        self.old_value.is_none() && self.new_value.is_some()
    }

    pub fn is_removal(&self) -> bool {
        self.new_value.is_none()
    }

    pub fn is_update(&self) -> bool {
        self.old_value.is_some() && self.new_value.is_some()
    }

    /// Decode the previous value.
    pub fn old_as<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        decode(&self.path, self.old_value.as_ref())
    }

    /// Decode the new value.
    pub fn new_as<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        decode(&self.path, self.new_value.as_ref())
    }
}

pub(crate) fn decode<T: DeserializeOwned>(
    path: &StorePath,
    value: Option<&Value>,
) -> Result<Option<T>, StoreError> {
    value
        .map(|v| {
            serde_json::from_value(v.clone()).map_err(|source| StoreError::Decode {
                path: path.clone(),
                source,
            })
        })
        .transpose()
}
