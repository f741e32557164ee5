use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::backend::{DeliveryError, PushChannel, PushMessage};

/// In-memory push sink for tests. Records every attempted delivery and can be
/// switched into a failing mode.
#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<(String, PushMessage)>>,
    failing: AtomicBool,
}

impl RecordingPush {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send attempt is recorded, then rejected.
    pub fn failing() -> Self {
        let push = Self::default();
        push.failing.store(true, Ordering::SeqCst);
        push
    }

    /// `(token, message)` pairs, in send order.
    pub fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, m)| m.body).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[async_trait]
impl PushChannel for RecordingPush {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((token.to_string(), message.clone()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}
