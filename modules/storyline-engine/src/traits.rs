//! Core traits for the dispatch engine.

use anyhow::Result;
use async_trait::async_trait;

use crate::routes::RoutedEvent;

/// Pure state updates. No I/O, no side effects.
///
/// Called for every routed event before its handler runs. Use for counters
/// and other state that can be derived from the event stream.
pub trait Reducer<T, S: Send>: Send + Sync {
    fn reduce(&self, state: &mut S, event: &RoutedEvent<'_, T>);
}

/// No state to fold.
impl<T> Reducer<T, ()> for () {
    fn reduce(&self, _state: &mut (), _event: &RoutedEvent<'_, T>) {}
}

/// Runs the handler for a routed event. May read and write the store.
///
/// Handlers of one wave run concurrently and see state read-only. Anything
/// they write re-enters the loop through the change feed, so a handler never
/// returns follow-up events itself.
#[async_trait]
pub trait Router<T: Sync, S: Sync, D: Sync>: Send + Sync {
    async fn route(&self, event: &RoutedEvent<'_, T>, state: &S, deps: &D) -> Result<()>;
}
