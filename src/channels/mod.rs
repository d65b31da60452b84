//! Channel sender abstraction — transport I/O lives behind this boundary.

pub mod console;
pub mod gateway;

use std::str::FromStr;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::ledger::model::AttemptStatus;

pub use console::ConsoleSender;
pub use gateway::GatewaySender;

/// A contact transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Voice,
    Whatsapp,
    Sms,
    Email,
}

impl Channel {
    /// All channels, in a stable order.
    pub const ALL: [Channel; 4] = [
        Channel::Voice,
        Channel::Whatsapp,
        Channel::Sms,
        Channel::Email,
    ];

    /// The string stored in the DB channel column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Whatsapp => "whatsapp",
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voice" => Ok(Self::Voice),
            "whatsapp" => Ok(Self::Whatsapp),
            "sms" => Ok(Self::Sms),
            "email" => Ok(Self::Email),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Trait for channel senders — pure transport I/O, no scheduling logic.
///
/// `send` resolves once the transport reports a terminal status for the
/// attempt. Backoff, admission, and fallback decisions live in the engine;
/// a sender only places the contact and reports how it ended.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Sender name (e.g. "console", "gateway").
    fn name(&self) -> &str;

    /// Place one contact attempt and wait for its terminal status.
    async fn send(
        &self,
        address: &str,
        channel: Channel,
        payload_ref: &str,
    ) -> Result<AttemptStatus, DispatchError>;
}

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9][0-9]{6,14}$").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Cheap plausibility check for a channel address.
///
/// An implausible address is classified `invalid-number` without ever
/// reaching the transport.
pub fn plausible_address(channel: Channel, address: &str) -> bool {
    match channel {
        Channel::Voice | Channel::Whatsapp | Channel::Sms => PHONE_RE.is_match(address),
        Channel::Email => EMAIL_RE.is_match(address),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_roundtrip() {
        for ch in Channel::ALL {
            assert_eq!(ch.as_str().parse::<Channel>().unwrap(), ch);
        }
    }

    #[test]
    fn channel_serde_snake_case() {
        let json = serde_json::to_string(&Channel::Whatsapp).unwrap();
        assert_eq!(json, "\"whatsapp\"");
    }

    #[test]
    fn plausible_phone_numbers() {
        assert!(plausible_address(Channel::Voice, "+5511987654321"));
        assert!(plausible_address(Channel::Sms, "15551234567"));
        assert!(!plausible_address(Channel::Voice, "not-a-number"));
        assert!(!plausible_address(Channel::Whatsapp, "+0123"));
    }

    #[test]
    fn plausible_email_addresses() {
        assert!(plausible_address(Channel::Email, "ana@university.edu"));
        assert!(!plausible_address(Channel::Email, "ana@nowhere"));
        assert!(!plausible_address(Channel::Email, "missing-at.com"));
    }
}
