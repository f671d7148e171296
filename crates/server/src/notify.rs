use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};

use countersign_core::config::NotifyConfig;
use countersign_core::domain::workflow::WorkflowId;
use countersign_core::notify::{NotificationKind, Notifier};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-countersign-signature";

#[derive(Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    workflow_id: &'a str,
    kind: &'a str,
}

/// Delivers approval notifications to the configured webhook endpoint.
/// Payloads are signed with HMAC-SHA256 so the receiver can authenticate
/// the sender; delivery is fire-and-forget per the engine contract.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    signing_secret: SecretString,
}

impl WebhookNotifier {
    pub fn new(url: String, signing_secret: SecretString, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self { client, url, signing_secret }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        recipient: &str,
        workflow_id: &WorkflowId,
        kind: NotificationKind,
    ) -> Result<(), String> {
        let payload = WebhookPayload {
            recipient,
            workflow_id: &workflow_id.0,
            kind: kind.as_str(),
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|error| format!("payload serialization failed: {error}"))?;
        let signature = sign(self.signing_secret.expose_secret().as_bytes(), &body);

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|error| format!("webhook request failed: {error}"))?;

        if !response.status().is_success() {
            return Err(format!("webhook responded with status {}", response.status()));
        }
        Ok(())
    }
}

/// Runtime-selected notifier: webhook when an endpoint is configured,
/// otherwise a no-op.
pub enum ServerNotifier {
    Webhook(WebhookNotifier),
    Noop(countersign_core::notify::NoopNotifier),
}

impl ServerNotifier {
    pub fn from_config(config: &NotifyConfig) -> Self {
        match (&config.webhook_url, &config.signing_secret) {
            (Some(url), Some(secret)) => Self::Webhook(WebhookNotifier::new(
                url.clone(),
                secret.clone(),
                config.timeout_secs,
            )),
            _ => Self::Noop(countersign_core::notify::NoopNotifier),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop(_))
    }
}

#[async_trait]
impl Notifier for ServerNotifier {
    async fn notify(
        &self,
        recipient: &str,
        workflow_id: &WorkflowId,
        kind: NotificationKind,
    ) -> Result<(), String> {
        match self {
            Self::Webhook(webhook) => webhook.notify(recipient, workflow_id, kind).await,
            Self::Noop(noop) => noop.notify(recipient, workflow_id, kind).await,
        }
    }
}

pub fn sign(key: &[u8], body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return encode_hex(&Sha256::digest(body));
    };
    mac.update(body);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn encode_hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
