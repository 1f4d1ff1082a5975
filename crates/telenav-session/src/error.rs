//! Session error types.

use telenav_types::{HandlerTag, MessageType, StateKey, StateKind};
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while resolving and executing a command call.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A caller broke a contract (unknown block, page of another block,
    /// write to the empty provider). Never retried.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// No command registered under the tag.
    #[error("unknown command: {0}")]
    UnknownCommand(HandlerTag),

    /// The command has no entry point for this message type.
    #[error("command {tag} cannot handle {message_type} input")]
    Unsupported {
        tag: HandlerTag,
        message_type: MessageType,
    },

    /// The handler itself failed.
    #[error("command {tag} failed: {source}")]
    Handler {
        tag: HandlerTag,
        #[source]
        source: anyhow::Error,
    },

    /// A handler asked for a state slot it never declared.
    #[error("command {tag} did not declare {kind} state {key}")]
    UndeclaredState {
        tag: HandlerTag,
        kind: StateKind,
        key: StateKey,
    },

    /// The message sender failed.
    #[error("message delivery failed: {0}")]
    Delivery(#[source] anyhow::Error),

    /// Registration or wiring problem found at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Backing store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// State value could not be encoded or decoded.
    #[error("state value error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn handler(tag: HandlerTag, source: anyhow::Error) -> Self {
        Self::Handler { tag, source }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
