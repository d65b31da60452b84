//! HTTP dispatch gateway sender.
//!
//! Talks to the external transport gateway that actually places calls and
//! sends messages. One POST per attempt; the gateway answers with the
//! attempt's terminal status once its provider reports back.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::channels::{Channel, ChannelSender};
use crate::error::DispatchError;
use crate::ledger::model::AttemptStatus;

/// Gateway response body.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    status: AttemptStatus,
}

/// Channel sender backed by an HTTP dispatch gateway.
pub struct GatewaySender {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl GatewaySender {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn dispatch_url(&self) -> String {
        format!("{}/dispatch", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChannelSender for GatewaySender {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn send(
        &self,
        address: &str,
        channel: Channel,
        payload_ref: &str,
    ) -> Result<AttemptStatus, DispatchError> {
        let body = serde_json::json!({
            "address": address,
            "channel": channel,
            "payload_ref": payload_ref,
        });

        debug!(channel = %channel, "Dispatching via gateway");

        let response = self
            .client
            .post(self.dispatch_url())
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let http_status = response.status();
        if !http_status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Gateway {
                status: http_status.as_u16(),
                body,
            });
        }

        let parsed: GatewayResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Transport(format!("bad gateway response: {e}")))?;

        if !parsed.status.is_terminal() {
            return Err(DispatchError::NonTerminalStatus {
                status: parsed.status.to_string(),
            });
        }

        Ok(parsed.status)
    }
}
