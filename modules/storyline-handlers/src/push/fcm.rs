use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::backend::{DeliveryError, PushChannel, PushMessage};

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// Firebase Cloud Messaging over the legacy HTTP API.
pub struct FcmChannel {
    server_key: String,
    endpoint: String,
    http: reqwest::Client,
}

impl FcmChannel {
    pub fn new(server_key: String) -> Self {
        Self {
            server_key,
            endpoint: DEFAULT_FCM_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

#[async_trait]
impl PushChannel for FcmChannel {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DeliveryError> {
        if token.is_empty() {
            return Err(DeliveryError::MissingToken);
        }

        let mut notification = json!({ "body": message.body });
        if let Some(title) = &message.title {
            notification["title"] = json!(title);
        }
        let payload = json!({
            "to": token,
            "notification": notification,
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "FCM returned non-success");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
