//! Internal consensus errors. These are never user-visible: expected
//! conditions (stale term, log mismatch) are handled inline by returning a
//! negative RPC response, never an `Err`. `RaftError` is reserved for
//! genuine protocol violations that indicate either a corrupt log or a bug
//! — most rejections are `Ok(response(false, ..))`, `Err` only for "this
//! should never happen" cases.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RaftError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] common::TransportError),
}

pub type Result<T> = std::result::Result<T, RaftError>;
