//! Generic, domain-agnostic hierarchical store interface.
//!
//! A tree of JSON values addressed by slash-separated paths, written either one
//! path at a time or as an atomic multi-path batch. Watches registered as path
//! patterns receive at-least-once mutation events for every matching location
//! whose value changed.
//!
//! Zero knowledge of users, posts or feeds. Consumers bring their own typed
//! paths via [`TypedPath`].

pub mod memory;
pub mod path;
pub mod store;
pub mod types;

pub use memory::MemoryStore;
pub use path::{PathParams, PathPattern, PatternError, Segment, StorePath, TypedPath};
pub use store::{Batch, MutationFeed, Store, StoreError, StoreExt};
pub use types::MutationEvent;
