//! Google Cloud Pub/Sub pull subscription over the REST v1 API
//!
//! Works against the real service (Application Default Credentials or a
//! fixed bearer token) and against the local emulator (plain http, no auth).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use gcp_auth::TokenProvider;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use super::traits::{MessageQueue, QueueMessage};
use crate::config::{PubSubAuth, RelayConfig};
use crate::constants::PUBSUB_SCOPE;
use crate::error::{RelayError, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: PubsubMessage,
    #[serde(default)]
    delivery_attempt: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubsubMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    publish_time: Option<DateTime<Utc>>,
}

impl ReceivedMessage {
    fn into_queue_message(self) -> QueueMessage {
        let (data, payload_error) = match STANDARD.decode(self.message.data.as_bytes()) {
            Ok(bytes) => (bytes, None),
            Err(e) => {
                // Still handed on so the message gets acknowledged
                warn!(
                    "Message {} carries invalid base64 data: {}",
                    self.message.message_id, e
                );
                (Vec::new(), Some(format!("Invalid base64 payload: {}", e)))
            }
        };

        QueueMessage {
            ack_id: self.ack_id,
            message_id: self.message.message_id,
            data,
            payload_error,
            publish_time: self.message.publish_time,
            delivery_attempt: self.delivery_attempt,
        }
    }
}

enum Credentials {
    Anonymous,
    Static(String),
    // Provider resolved on first use, it caches and refreshes tokens itself
    ApplicationDefault(OnceCell<Arc<dyn TokenProvider>>),
}

impl From<PubSubAuth> for Credentials {
    fn from(auth: PubSubAuth) -> Self {
        match auth {
            PubSubAuth::Anonymous => Credentials::Anonymous,
            PubSubAuth::StaticToken(token) => Credentials::Static(token),
            PubSubAuth::ApplicationDefault => Credentials::ApplicationDefault(OnceCell::new()),
        }
    }
}

pub struct PubSubClient {
    http: reqwest::Client,
    endpoint: Url,
    project_id: String,
    subscription_id: String,
    credentials: Credentials,
}

impl PubSubClient {
    pub fn new(
        endpoint: &str,
        project_id: impl Into<String>,
        subscription_id: impl Into<String>,
        auth: PubSubAuth,
        request_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(RelayError::ConfigError(format!(
                "Pub/Sub endpoint '{}' cannot be used as a base URL",
                endpoint
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RelayError::SystemError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            project_id: project_id.into(),
            subscription_id: subscription_id.into(),
            credentials: auth.into(),
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        Self::new(
            &config.pubsub_endpoint,
            config.project_id.clone(),
            config.subscription_id.clone(),
            config.auth.clone(),
            config.pull_timeout,
        )
    }

    /// `{endpoint}/v1/projects/{project}/subscriptions/{subscription}[:{action}]`
    fn subscription_url(&self, action: Option<&str>) -> Result<Url> {
        let resource = match action {
            Some(action) => format!("{}:{}", self.subscription_id, action),
            None => self.subscription_id.clone(),
        };

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| RelayError::ConfigError("Pub/Sub endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.project_id.as_str(),
                "subscriptions",
                resource.as_str(),
            ]);
        Ok(url)
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        match &self.credentials {
            Credentials::Anonymous => Ok(request),
            Credentials::Static(token) => Ok(request.bearer_auth(token)),
            Credentials::ApplicationDefault(provider) => {
                let provider = provider
                    .get_or_try_init(|| async {
                        let provider = gcp_auth::provider().await?;
                        info!("Authenticating to Pub/Sub with Application Default Credentials");
                        Ok::<_, RelayError>(provider)
                    })
                    .await?;
                // Fetched per request, the provider only refreshes near expiry
                let token = provider.token(&[PUBSUB_SCOPE]).await?;
                Ok(request.bearer_auth(token.as_str()))
            }
        }
    }

    /// Verify the subscription exists and is reachable
    pub async fn check_subscription(&self) -> Result<()> {
        let url = self.subscription_url(None)?;
        let response = self.authorize(self.http.get(url)).await?.send().await?;
        ensure_success(response, "Subscription lookup").await?;
        debug!(
            "Subscription projects/{}/subscriptions/{} is reachable",
            self.project_id, self.subscription_id
        );
        Ok(())
    }
}

async fn ensure_success(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RelayError::QueueError(format!(
        "{} failed with status {}: {}",
        action,
        status,
        body.trim()
    )))
}

#[async_trait]
impl MessageQueue for PubSubClient {
    async fn pull(&self, max_messages: usize) -> Result<Vec<QueueMessage>> {
        let url = self.subscription_url(Some("pull"))?;
        let request = self
            .authorize(self.http.post(url))
            .await?
            .json(&PullRequest { max_messages });

        let response = match request.send().await {
            Ok(response) => response,
            // The bounded wait elapsed without messages
            Err(e) if e.is_timeout() => {
                debug!("Pull timed out, treating as empty batch");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let response = ensure_success(response, "Pull").await?;
        let body: PullResponse = response.json().await?;

        Ok(body
            .received_messages
            .into_iter()
            .map(ReceivedMessage::into_queue_message)
            .collect())
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }

        let url = self.subscription_url(Some("acknowledge"))?;
        let response = self
            .authorize(self.http.post(url))
            .await?
            .json(&AcknowledgeRequest { ack_ids })
            .send()
            .await?;

        ensure_success(response, "Acknowledge").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> PubSubClient {
        PubSubClient::new(
            endpoint,
            "demo",
            "commands-sub",
            PubSubAuth::Anonymous,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_subscription_urls() {
        let client = client("http://localhost:8085");
        assert_eq!(
            client.subscription_url(Some("pull")).unwrap().as_str(),
            "http://localhost:8085/v1/projects/demo/subscriptions/commands-sub:pull"
        );
        assert_eq!(
            client.subscription_url(None).unwrap().as_str(),
            "http://localhost:8085/v1/projects/demo/subscriptions/commands-sub"
        );
    }

    #[test]
    fn test_endpoint_with_prefix() {
        let client = client("https://proxy.internal/pubsub");
        assert_eq!(
            client.subscription_url(Some("acknowledge")).unwrap().as_str(),
            "https://proxy.internal/pubsub/v1/projects/demo/subscriptions/commands-sub:acknowledge"
        );
    }

    #[test]
    fn test_rejects_unusable_endpoint() {
        let result = PubSubClient::new(
            "mailto:ops@example.com",
            "p",
            "s",
            PubSubAuth::Anonymous,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(RelayError::ConfigError(_))));
    }

    #[test]
    fn test_pull_response_decoding() {
        let raw = r#"{
            "receivedMessages": [{
                "ackId": "ack-1",
                "message": {
                    "data": "eyJjb21tYW5kIjoidXAifQ==",
                    "messageId": "42",
                    "publishTime": "2024-05-01T12:00:00.123Z"
                },
                "deliveryAttempt": 3
            }]
        }"#;

        let response: PullResponse = serde_json::from_str(raw).unwrap();
        let messages: Vec<QueueMessage> = response
            .received_messages
            .into_iter()
            .map(ReceivedMessage::into_queue_message)
            .collect();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].ack_id, "ack-1");
        assert_eq!(messages[0].message_id, "42");
        assert_eq!(messages[0].data, br#"{"command":"up"}"#);
        assert_eq!(messages[0].delivery_attempt, Some(3));
        assert!(messages[0].publish_time.is_some());
        assert!(messages[0].payload().is_ok());
    }

    #[test]
    fn test_invalid_base64_marks_payload_unusable() {
        let raw = r#"{
            "receivedMessages": [{
                "ackId": "ack-raw",
                "message": {"data": "{\"command\":\"up\"}", "messageId": "7"}
            }]
        }"#;

        let response: PullResponse = serde_json::from_str(raw).unwrap();
        let message = response
            .received_messages
            .into_iter()
            .map(ReceivedMessage::into_queue_message)
            .next()
            .unwrap();

        assert_eq!(message.ack_id, "ack-raw");
        assert!(message.data.is_empty());
        assert!(matches!(message.payload(), Err(RelayError::MessageParseError(_))));
    }

    #[test]
    fn test_empty_pull_response() {
        let response: PullResponse = serde_json::from_str("{}").unwrap();
        assert!(response.received_messages.is_empty());
    }
}
