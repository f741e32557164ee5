//! Mutation dispatch engine.
//!
//! Provides a generic loop: route → reduce → handle → drain the change feed →
//! recurse until settled. Handlers never call each other; they write to the
//! store, and the writes come back as new mutation events through the feed.
//!
//! Consumers define their domain by building a `RouteTable`, implementing
//! `Reducer` (pure state updates) and `Router` (side-effectful handlers).

pub mod engine;
pub mod routes;
pub mod traits;

pub use engine::{DispatchFailure, DispatchReport, Engine, DEFAULT_MAX_ROUNDS};
pub use routes::{RouteTable, RoutedEvent};
pub use traits::{Reducer, Router};
