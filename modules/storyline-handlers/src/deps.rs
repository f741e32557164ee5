use std::sync::Arc;

use chrono::{DateTime, Utc};
use storyline_common::FileConfig;
use storyline_store::{Batch, Store};
use tracing::info;
use typed_builder::TypedBuilder;

use crate::error::HandlerError;
use crate::push::PushChannel;

/// Source of "now" for notification timestamps and the live window.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that never moves.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Shared dependency container for every handler.
///
/// Holds the store capability, the push channel and tuning. Nothing here is
/// process-global; tests build one per scenario.
#[derive(Clone, TypedBuilder)]
pub struct HandlerDeps {
    pub store: Arc<dyn Store>,
    pub push: Arc<dyn PushChannel>,
    #[builder(default = Arc::new(SystemClock))]
    pub clock: Arc<dyn Clock>,
    #[builder(default)]
    pub config: FileConfig,
}

impl HandlerDeps {
    pub fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Submit a handler's single batched write.
    pub(crate) async fn commit(&self, handler: &str, batch: Batch) -> Result<usize, HandlerError> {
        let paths = batch.len();
        self.store.batch_write(batch).await?;
        info!(handler, paths, "Committed batch");
        Ok(paths)
    }
}
