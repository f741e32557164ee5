use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("recipient has no device token")]
    MissingToken,

    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push service returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: Option<String>,
    pub body: String,
}

impl PushMessage {
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            title: None,
            body: body.into(),
        }
    }
}

/// Pluggable push backend.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Deliver one message to one device.
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DeliveryError>;
}
