//! Error taxonomy. Domain errors are returned as
//! `(success=false, message)` in the relevant reply, never as a transport
//! failure; transport errors are a separate, smaller enum so the
//! live-auction layer can distinguish "the remote rejected my request" from
//! "I could not reach the remote at all" without string-matching messages.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("user {0} does not exist")]
    UnknownUser(String),

    #[error("auction {0} does not exist")]
    UnknownAuction(u64),

    #[error("bad lifecycle transition: {0}")]
    BadLifecycle(String),

    #[error("the sole active buyer cannot withdraw")]
    SoleActiveBuyerCannotWithdraw,

    #[error("unsupported operation")]
    UnsupportedOp,

    #[error("duplicate auction: an identical auction already exists")]
    DuplicateAuction,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("not the leader{}", .leader_hint.as_ref().map(|h| format!(" (try {h})")).unwrap_or_default())]
    NotLeader { leader_hint: Option<String> },
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connection(_))
    }
}
