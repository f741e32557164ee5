//! In-memory store with a change feed. Backs tests and offline replays.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::path::{PathPattern, Segment, StorePath};
use crate::store::{Batch, MutationFeed, Store, StoreError};
use crate::types::MutationEvent;

/// A JSON tree behind a mutex.
///
/// Follows the usual realtime-database conventions: `null` and empty objects
/// do not exist, so removing the last child of a node removes the node.
/// Every applied batch is diffed against the registered watches and the
/// resulting [`MutationEvent`]s queue up until [`MutationFeed::drain`].
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    root: Map<String, Value>,
    watches: Vec<PathPattern>,
    pending: Vec<MutationEvent>,
    rejected: Vec<StorePath>,
    batches: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Seed from a snapshot. No events are produced for the seed.
    pub fn from_value(value: Value) -> Self {
        let root = match normalize(value) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            inner: Mutex::new(Inner {
                root,
                ..Inner::default()
            }),
        }
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.lock().root.clone())
    }

    /// Make every batch touching `prefix` (or below) fail with
    /// [`StoreError::Rejected`].
    pub fn reject(&self, prefix: StorePath) {
        self.lock().rejected.push(prefix);
    }

    /// Lift every rejection installed by [`MemoryStore::reject`].
    pub fn clear_rejections(&self) {
        self.lock().rejected.clear();
    }

    /// Number of successfully applied writes, batched or single.
    pub fn batch_count(&self) -> u64 {
        self.lock().batches
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, batch: Batch) -> Result<(), StoreError> {
        let mut inner = self.lock();

        if let Some(path) = batch
            .paths()
            .find(|p| inner.rejected.iter().any(|r| p.starts_with(r)))
        {
            return Err(StoreError::Rejected {
                path: path.clone(),
                reason: "path is not writable".into(),
            });
        }

        let touched: Vec<StorePath> = batch.paths().cloned().collect();
        let old_root = Value::Object(inner.root.clone());

        for (path, value) in batch.into_entries() {
            set_at(&mut inner.root, path.segments(), value.and_then(normalize));
        }
        inner.batches += 1;

        let new_root = Value::Object(inner.root.clone());
        let mut seen = HashSet::new();
        let mut events = Vec::new();
        for pattern in &inner.watches {
            if !touched.iter().any(|p| pattern.overlaps(p)) {
                continue;
            }
            collect_changes(
                pattern.segments(),
                StorePath::root(),
                Some(&old_root),
                Some(&new_root),
                &mut seen,
                &mut events,
            );
        }

        debug!(paths = touched.len(), events = events.len(), "Applied batch");
        inner.pending.extend(events);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let inner = self.lock();
        if path.is_root() {
            return Ok((!inner.root.is_empty()).then(|| Value::Object(inner.root.clone())));
        }
        Ok(lookup(&inner.root, path.segments()).cloned())
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let mut batch = Batch::new();
        batch.put(path.clone(), Some(value));
        self.apply(batch)
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        let mut batch = Batch::new();
        batch.put(path.clone(), None);
        self.apply(batch)
    }

    async fn batch_write(&self, batch: Batch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.apply(batch)
    }
}

impl MutationFeed for MemoryStore {
    fn watch(&self, pattern: PathPattern) {
        let mut inner = self.lock();
        if !inner.watches.contains(&pattern) {
            inner.watches.push(pattern);
        }
    }

    fn drain(&self) -> Vec<MutationEvent> {
        std::mem::take(&mut self.lock().pending)
    }

    fn requeue(&self, events: Vec<MutationEvent>) {
        if events.is_empty() {
            return;
        }
        debug!(events = events.len(), "Requeued events for redelivery");
        self.lock().pending.splice(0..0, events);
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

/// Drop nulls and empty objects, recursively.
fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        other => Some(other),
    }
}

fn lookup<'a>(root: &'a Map<String, Value>, segments: &[String]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut node = root.get(first)?;
    for segment in rest {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn child<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    value.and_then(Value::as_object).and_then(|m| m.get(key))
}

/// Write (or remove, when `value` is `None`) at `segments`, pruning empty parents.
fn set_at(node: &mut Map<String, Value>, segments: &[String], value: Option<Value>) {
    let Some((first, rest)) = segments.split_first() else {
        // Root write: replace the whole tree.
        *node = match value {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        return;
    };

    if rest.is_empty() {
        match value {
            Some(v) => {
                node.insert(first.clone(), v);
            }
            None => {
                node.remove(first);
            }
        }
        return;
    }

    if value.is_none() && !node.contains_key(first) {
        return;
    }

    let child = node
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(map) = child {
        set_at(map, rest, value);
        if map.is_empty() {
            node.remove(first);
        }
    }
}

/// Walk `segments` through the old and new trees in lockstep, emitting an
/// event for every concrete location whose value differs.
fn collect_changes(
    segments: &[Segment],
    prefix: StorePath,
    old: Option<&Value>,
    new: Option<&Value>,
    seen: &mut HashSet<StorePath>,
    out: &mut Vec<MutationEvent>,
) {
    if old == new {
        return;
    }

    let Some((segment, rest)) = segments.split_first() else {
        if seen.insert(prefix.clone()) {
            out.push(MutationEvent::new(prefix, old.cloned(), new.cloned()));
        }
        return;
    };

    match segment {
        Segment::Static(key) => {
            collect_changes(
                rest,
                prefix.child(key),
                child(old, key),
                child(new, key),
                seen,
                out,
            );
        }
        Segment::Capture(_) => {
            let keys: BTreeSet<&String> = [old, new]
                .into_iter()
                .flatten()
                .filter_map(Value::as_object)
                .flat_map(|m| m.keys())
                .collect();
            for key in keys {
                collect_changes(
                    rest,
                    prefix.child(key),
                    child(old, key),
                    child(new, key),
                    seen,
                    out,
                );
            }
        }
    }
}
