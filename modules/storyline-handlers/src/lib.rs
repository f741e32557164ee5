//! Reactive handlers that keep the derived store state consistent with what
//! clients write.
//!
//! Each handler reads the context it needs concurrently, computes one batch
//! of writes, submits it, and only then talks to the push channel. Every
//! handler recomputes from what it observes, so running it twice, late, or
//! out of order converges to the same state.

pub mod aggregates;
pub mod comments;
pub mod conversations;
pub mod deps;
pub mod error;
pub mod fanout;
pub mod notifications;
pub mod popularity;
pub mod proximity;
pub mod push;
pub mod relationships;
pub mod router;

pub use deps::{Clock, FixedClock, HandlerDeps, SystemClock};
pub use error::HandlerError;
pub use push::{DeliveryError, FcmChannel, NoopChannel, PushChannel, PushMessage, RecordingPush};
pub use router::{build_engine, route_table, StatsReducer, StorylineEngine, Trigger, TriggerRouter, TriggerStats};
