use async_trait::async_trait;

use super::backend::{DeliveryError, PushChannel, PushMessage};

/// Drops every message. Used when no push credentials are configured.
pub struct NoopChannel;

#[async_trait]
impl PushChannel for NoopChannel {
    async fn send(&self, _token: &str, _message: &PushMessage) -> Result<(), DeliveryError> {
        Ok(())
    }
}
