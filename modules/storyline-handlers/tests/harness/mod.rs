//! Test harness: an in-memory store wired to the full trigger set.
//!
//! Seeds are written without producing events, so a test can set up prior
//! state and then observe exactly what one client write propagates to.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use storyline_common::{FileConfig, Post};
use storyline_engine::DispatchReport;
use storyline_handlers::{
    build_engine, FixedClock, HandlerDeps, RecordingPush, StorylineEngine, TriggerStats,
};
use storyline_store::{MemoryStore, MutationEvent, Store, StoreExt, TypedPath};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn hours_ago(hours: i64) -> i64 {
    (now() - Duration::hours(hours)).timestamp_millis()
}

pub fn post(author: &str, place: Option<&str>, hours_old: i64) -> Post {
    Post {
        author: author.into(),
        place_id: place.map(Into::into),
        date_created: hours_ago(hours_old),
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub push: Arc<RecordingPush>,
    pub deps: HandlerDeps,
    pub engine: StorylineEngine<Arc<MemoryStore>>,
    pub stats: TriggerStats,
}

impl Harness {
    pub fn new(seed: Value) -> Self {
        Self::with_push(seed, RecordingPush::new())
    }

    pub fn with_push(seed: Value, push: RecordingPush) -> Self {
        Self::with_config(seed, push, FileConfig::default())
    }

    pub fn with_config(seed: Value, push: RecordingPush, config: FileConfig) -> Self {
        let store = Arc::new(MemoryStore::from_value(seed));
        let push = Arc::new(push);
        let deps = HandlerDeps::builder()
            .store(store.clone())
            .push(push.clone())
            .clock(Arc::new(FixedClock(now())))
            .config(config)
            .build();
        let engine = build_engine(store.clone(), &deps.config).unwrap();
        Self {
            store,
            push,
            deps,
            engine,
            stats: TriggerStats::default(),
        }
    }

    /// Client write, then run everything it causes.
    pub async fn set<T: Serialize + Sync>(&mut self, path: TypedPath<T>, value: T) -> DispatchReport {
        self.store.set(&path, &value).await.unwrap();
        self.engine.settle(&mut self.stats, &self.deps).await
    }

    /// Client removal, then run everything it causes.
    pub async fn remove<T>(&mut self, path: TypedPath<T>) -> DispatchReport {
        self.store.remove(path.path()).await.unwrap();
        self.engine.settle(&mut self.stats, &self.deps).await
    }

    /// Run whatever the feed is holding, including requeued events.
    pub async fn settle(&mut self) -> DispatchReport {
        self.engine.settle(&mut self.stats, &self.deps).await
    }

    /// Deliver an event as if the store redelivered it.
    pub async fn redeliver(&mut self, event: MutationEvent) -> DispatchReport {
        self.engine.dispatch(event, &mut self.stats, &self.deps).await
    }

    pub async fn get<T: DeserializeOwned + Send>(&self, path: TypedPath<T>) -> Option<T> {
        self.store.get(&path).await.unwrap()
    }
}
