use std::time::Duration;

use anyhow::Context as _;
use reqwest::Client;

use crate::domain::repository::WebhookPort;
use crate::domain::types::{DeliveryError, PostPayload};
use crate::error::SchedulerError;

const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// Posts schedule payloads to the automation webhook (e.g. a Make.com scenario).
#[derive(Clone)]
pub struct ReqwestWebhook {
    client: Client,
    url: String,
}

impl ReqwestWebhook {
    /// `timeout` bounds the whole request, connect through body.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SchedulerError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("clipcast-scheduler/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build webhook HTTP client")
            .map_err(SchedulerError::Internal)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl WebhookPort for ReqwestWebhook {
    async fn deliver(&self, payload: &PostPayload) -> Result<(), DeliveryError> {
        let resp = self
            .client
            .post(&self.url)
            .header(IDEMPOTENCY_KEY, payload.idempotency_key.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::new(transport_message(&e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let message = match status.canonical_reason() {
            Some(reason) => format!("webhook responded {} {reason}", status.as_u16()),
            None => format!("webhook responded {}", status.as_u16()),
        };
        Err(DeliveryError::new(message))
    }
}

fn transport_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "webhook timed out".to_owned()
    } else if e.is_connect() {
        format!("webhook unreachable: {e}")
    } else {
        format!("webhook request failed: {e}")
    }
}
