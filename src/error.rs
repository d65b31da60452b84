//! Error types for the cadence engine.

use std::time::Duration;

use uuid::Uuid;

use crate::channels::Channel;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Rule configuration errors.
///
/// Isolated per rule: a malformed rule is skipped with a warning and never
/// blocks evaluation of other leads or rules.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Rule {rule_id} references unknown {kind} id {id}")]
    UnknownSegmentRef {
        rule_id: Uuid,
        kind: &'static str,
        id: Uuid,
    },

    #[error("Rule {rule_id} has an invalid contact window: {reason}")]
    InvalidWindow { rule_id: Uuid, reason: String },

    #[error("Rule {rule_id} has an empty channel priority list")]
    EmptyChannelPlan { rule_id: Uuid },

    #[error("Rule {rule_id} has a zero concurrency budget")]
    ZeroBudget { rule_id: Uuid },
}

/// Dispatch errors — failures between the engine and a channel sender.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No sender registered for channel {channel}")]
    NoSender { channel: Channel },

    #[error("Lead {lead_id} has no address for channel {channel}")]
    MissingAddress { lead_id: Uuid, channel: Channel },

    #[error("Gateway rejected dispatch: HTTP {status}: {body}")]
    Gateway { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dispatch timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Sender returned a non-terminal status: {status}")]
    NonTerminalStatus { status: String },
}

/// Admission controller errors.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Admission controller is shut down")]
    Closed,
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
