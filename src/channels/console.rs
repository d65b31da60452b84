//! Console sender — logs attempts instead of placing them.
//!
//! Useful for local runs and as a stand-in when no dispatch gateway is
//! configured. Every attempt reports `delivered`.

use async_trait::async_trait;
use tracing::info;

use crate::channels::{Channel, ChannelSender};
use crate::error::DispatchError;
use crate::ledger::model::AttemptStatus;

/// Logging-only channel sender.
#[derive(Debug, Default)]
pub struct ConsoleSender;

impl ConsoleSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelSender for ConsoleSender {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(
        &self,
        address: &str,
        channel: Channel,
        payload_ref: &str,
    ) -> Result<AttemptStatus, DispatchError> {
        info!(
            channel = %channel,
            address = %address,
            payload_ref = %payload_ref,
            "Console dispatch"
        );
        Ok(AttemptStatus::Delivered)
    }
}
