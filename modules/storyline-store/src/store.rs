//! The store collaborator: reads, writes, atomic batches, and the mutation feed.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::path::{PathPattern, StorePath, TypedPath};
use crate::types::{decode, MutationEvent};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("read failed at {path}: {reason}")]
    Read { path: StorePath, reason: String },

    #[error("write failed at {path}: {reason}")]
    Write { path: StorePath, reason: String },

    #[error("batch rejected at {path}: {reason}")]
    Rejected { path: StorePath, reason: String },

    #[error("value at {path} does not decode: {source}")]
    Decode {
        path: StorePath,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for {path} does not encode: {source}")]
    Encode {
        path: StorePath,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Failures on the read side abort a handler before it writes anything.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Decode { .. })
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A multi-path update applied by the store as one unit.
///
/// `None` removes the subtree at that path. Entries are applied in path order,
/// so an ancestor is written before its descendants. Setting the same path
/// twice keeps the later value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    entries: BTreeMap<StorePath, Option<Value>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&mut self, path: &TypedPath<T>, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            path: path.path().clone(),
            source,
        })?;
        self.put(path.path().clone(), Some(value));
        Ok(())
    }

    pub fn remove<T>(&mut self, path: &TypedPath<T>) {
        self.put(path.path().clone(), None);
    }

    /// Untyped entry. A JSON `null` is treated as a removal.
    pub fn put(&mut self, path: StorePath, value: Option<Value>) {
        let value = value.filter(|v| !v.is_null());
        self.entries.insert(path, value);
    }

    pub fn merge(&mut self, other: Batch) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `Some(None)` means the batch removes `path`.
    pub fn get(&self, path: &StorePath) -> Option<Option<&Value>> {
        self.entries.get(path).map(Option::as_ref)
    }

    pub fn paths(&self) -> impl Iterator<Item = &StorePath> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StorePath, Option<&Value>)> {
        self.entries.iter().map(|(p, v)| (p, v.as_ref()))
    }

    pub fn into_entries(self) -> BTreeMap<StorePath, Option<Value>> {
        self.entries
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The hierarchical store. The only shared mutable resource handlers touch.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the subtree at `path`. Absent locations read as `None`.
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    /// Apply every entry or none. Fails if any path is rejected.
    async fn batch_write(&self, batch: Batch) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        (**self).read(path).await
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        (**self).write(path, value).await
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        (**self).remove(path).await
    }

    async fn batch_write(&self, batch: Batch) -> Result<(), StoreError> {
        (**self).batch_write(batch).await
    }
}

/// Typed reads and writes layered over any [`Store`].
#[async_trait]
pub trait StoreExt: Store {
    async fn get<T>(&self, path: &TypedPath<T>) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let value = self.read(path.path()).await?;
        decode(path.path(), value.as_ref())
    }

    async fn set<T>(&self, path: &TypedPath<T>, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            path: path.path().clone(),
            source,
        })?;
        self.write(path.path(), value).await
    }

    /// A collection read child by child. Children whose key or value does not
    /// decode are logged and skipped, so one bad record written by a client
    /// does not hide the rest of the collection.
    async fn get_entries<K, V>(
        &self,
        path: &TypedPath<BTreeMap<K, V>>,
    ) -> Result<BTreeMap<K, V>, StoreError>
    where
        K: DeserializeOwned + Ord + Send,
        V: DeserializeOwned + Send,
    {
        let map = match self.read(path.path()).await? {
            Some(Value::Object(map)) => map,
            Some(_) => {
                warn!(path = %path, "Expected a collection, found a leaf");
                return Ok(BTreeMap::new());
            }
            None => return Ok(BTreeMap::new()),
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            let child = path.path().child(&key);
            let decoded = (
                decode::<K>(&child, Some(&Value::String(key))),
                decode::<V>(&child, Some(&value)),
            );
            match decoded {
                (Ok(Some(k)), Ok(Some(v))) => {
                    entries.insert(k, v);
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "Skipping child that does not decode");
                }
                _ => {}
            }
        }
        Ok(entries)
    }

    /// Keys of the immediate children at `path`, in key order.
    async fn child_keys(&self, path: &StorePath) -> Result<Vec<String>, StoreError> {
        Ok(match self.read(path).await? {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

// ---------------------------------------------------------------------------
// MutationFeed
// ---------------------------------------------------------------------------

/// Watch registration and delivery of observed mutations.
///
/// Delivery is at-least-once: consumers must tolerate duplicates.
pub trait MutationFeed: Send + Sync {
    fn watch(&self, pattern: PathPattern);

    /// Take every event observed since the last drain, in observation order.
    fn drain(&self) -> Vec<MutationEvent>;

    /// Hand events back for redelivery. They come out of the next drain
    /// ahead of anything observed since.
    fn requeue(&self, events: Vec<MutationEvent>);
}

impl<F: MutationFeed + ?Sized> MutationFeed for Arc<F> {
    fn watch(&self, pattern: PathPattern) {
        (**self).watch(pattern)
    }

    fn drain(&self) -> Vec<MutationEvent> {
        (**self).drain()
    }

    fn requeue(&self, events: Vec<MutationEvent>) {
        (**self).requeue(events)
    }
}
