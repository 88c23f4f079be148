//! Outbound HTTP: request assembly, signing and the transport seam.

use crate::error::{DeliveryError, DispatchError};
use crate::queue::QueuedDelivery;
use async_trait::async_trait;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_EVENT_ID: &str = "X-Webhook-Event-Id";
pub const HEADER_ATTEMPT: &str = "X-Webhook-Attempt";
pub const HEADER_TIMESTAMP: &str = "X-Webhook-Timestamp";
pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";

/// A fully assembled POST to one webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub target_id: String,
    pub url: String,
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl WebhookRequest {
    /// Assemble the request for a delivery's current attempt.
    ///
    /// `timestamp` is unix seconds and is covered by the signature.
    pub fn for_delivery(delivery: &QueuedDelivery, timestamp: i64) -> Result<Self, DeliveryError> {
        let target = &delivery.target;
        let timestamp = timestamp.to_string();

        let mut headers = vec![
            ("Content-Type".to_string(), target.content_type().to_string()),
            (HEADER_EVENT.to_string(), delivery.event.kind().to_string()),
            (
                HEADER_EVENT_ID.to_string(),
                delivery.event.source_event_id().to_string(),
            ),
            (HEADER_ATTEMPT.to_string(), delivery.attempt.to_string()),
            (HEADER_TIMESTAMP.to_string(), timestamp.clone()),
        ];
        headers.extend(target.headers().iter().cloned());

        if let Some(secret) = target.secret() {
            let signature = sign_payload(secret, &timestamp, &delivery.payload)?;
            headers.push((HEADER_SIGNATURE.to_string(), signature));
        }

        Ok(Self {
            target_id: target.id().to_string(),
            url: target.url().to_string(),
            body: delivery.payload.clone(),
            headers,
            timeout: target.timeout(),
        })
    }

    /// First header value with `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// HMAC-SHA256 over `"{timestamp}.{body}"`, formatted as `sha256=<hex>`.
pub fn sign_payload(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, DeliveryError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::InvalidRequest(format!("invalid signing key: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Sends one request and reports the HTTP status. Any response, successful
/// or not, is `Ok`; transport failures and timeouts are `Err`.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: WebhookRequest) -> Result<u16, DeliveryError>;
}

/// `reqwest`-backed transport shared by all workers.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("AllTheWebhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DispatchError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(&self, request: WebhookRequest) -> Result<u16, DeliveryError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match builder.send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) if e.is_timeout() => Err(DeliveryError::Timeout(request.timeout)),
            Err(e) if e.is_builder() => Err(DeliveryError::InvalidRequest(e.without_url().to_string())),
            // The URL carries the webhook token; never let it into error text
            Err(e) => Err(DeliveryError::Transport(e.without_url().to_string())),
        }
    }
}
