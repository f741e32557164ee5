//! The dispatch loop.

use std::marker::PhantomData;

use futures::future::join_all;
use storyline_store::{MutationEvent, MutationFeed, StorePath};
use tracing::{debug, error, warn};

use crate::routes::{RouteTable, RoutedEvent};
use crate::traits::{Reducer, Router};

pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// A handler that returned an error. Other handlers in the same wave are
/// unaffected; the failed event is requeued on the feed once the run ends.
#[derive(Debug)]
pub struct DispatchFailure {
    pub path: StorePath,
    pub error: anyhow::Error,
}

/// What one `dispatch` or `settle` call did.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Waves run, including the initial one.
    pub rounds: usize,
    pub handled: usize,
    pub unmatched: usize,
    pub failures: Vec<DispatchFailure>,
    /// Events still pending when `max_rounds` was reached.
    pub abandoned: usize,
    /// Failed and abandoned events handed back to the feed.
    pub requeued: usize,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.abandoned == 0
    }

    pub fn merge(&mut self, other: DispatchReport) {
        self.rounds += other.rounds;
        self.handled += other.handled;
        self.unmatched += other.unmatched;
        self.failures.extend(other.failures);
        self.abandoned += other.abandoned;
        self.requeued += other.requeued;
    }
}

/// Generic mutation dispatch engine.
///
/// Route → reduce → handle → drain feed → recurse until settled. Every
/// pattern in the route table is registered as a watch on the feed when the
/// engine is built, so writes made by handlers come back as the next wave.
///
/// Delivery is at-least-once. Events whose handler failed, and events left
/// over when `max_rounds` is hit, go back on the feed at the end of the run
/// and are drained again by the next `settle`. Each event is attempted at
/// most once per run, so a handler that keeps failing cannot spin the loop.
pub struct Engine<T, S, D, Red, Rout, F>
where
    T: Send + Sync,
    S: Send + Sync,
    D: Send + Sync,
    Red: Reducer<T, S>,
    Rout: Router<T, S, D>,
    F: MutationFeed,
{
    routes: RouteTable<T>,
    reducer: Red,
    router: Rout,
    feed: F,
    max_rounds: usize,
    _phantom: PhantomData<fn() -> (S, D)>,
}

impl<T, S, D, Red, Rout, F> Engine<T, S, D, Red, Rout, F>
where
    T: Send + Sync,
    S: Send + Sync,
    D: Send + Sync,
    Red: Reducer<T, S>,
    Rout: Router<T, S, D>,
    F: MutationFeed,
{
    pub fn new(routes: RouteTable<T>, reducer: Red, router: Rout, feed: F) -> Self {
        for pattern in routes.patterns() {
            feed.watch(pattern.clone());
        }
        Self {
            routes,
            reducer,
            router,
            feed,
            max_rounds: DEFAULT_MAX_ROUNDS,
            _phantom: PhantomData,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn routes(&self) -> &RouteTable<T> {
        &self.routes
    }

    /// Dispatch an externally delivered event, then everything it causes.
    pub async fn dispatch(&self, event: MutationEvent, state: &mut S, deps: &D) -> DispatchReport {
        self.run(vec![event], state, deps).await
    }

    /// Dispatch whatever the feed has observed since the last drain. Used
    /// after clients write to the store directly.
    pub async fn settle(&self, state: &mut S, deps: &D) -> DispatchReport {
        let pending = self.feed.drain();
        self.run(pending, state, deps).await
    }

    async fn run(&self, mut wave: Vec<MutationEvent>, state: &mut S, deps: &D) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut retry = Vec::new();

        while !wave.is_empty() {
            if report.rounds == self.max_rounds {
                warn!(
                    pending = wave.len(),
                    max_rounds = self.max_rounds,
                    "Propagation did not settle, requeueing pending events"
                );
                report.abandoned = wave.len();
                retry.append(&mut wave);
                break;
            }
            report.rounds += 1;
            retry.extend(self.run_wave(&wave, state, deps, &mut report).await);
            wave = self.feed.drain();
        }

        if !retry.is_empty() {
            report.requeued = retry.len();
            self.feed.requeue(retry);
        }
        report
    }

    async fn run_wave(
        &self,
        wave: &[MutationEvent],
        state: &mut S,
        deps: &D,
        report: &mut DispatchReport,
    ) -> Vec<MutationEvent> {
        let mut routed: Vec<RoutedEvent<'_, T>> = Vec::with_capacity(wave.len());
        for event in wave {
            match self.routes.resolve(event) {
                Some(r) => routed.push(r),
                None => {
                    debug!(path = %event.path, "No route for mutation");
                    report.unmatched += 1;
                }
            }
        }

        // Reduce sequentially, then hand out shared state to the handlers.
        for r in &routed {
            self.reducer.reduce(state, r);
        }
        let state = &*state;

        let results = join_all(routed.iter().map(|r| async move {
            (r.event, self.router.route(r, state, deps).await)
        }))
        .await;

        let mut failed = Vec::new();
        for (event, result) in results {
            match result {
                Ok(()) => report.handled += 1,
                Err(e) => {
                    error!(path = %event.path, error = %e, "Handler failed");
                    report.failures.push(DispatchFailure {
                        path: event.path.clone(),
                        error: e,
                    });
                    failed.push(event.clone());
                }
            }
        }
        failed
    }
}
