//! The leader-based replicated-log consensus module.
//!
//! Split into a synchronous, I/O-free core (`consensus`, `log`, `state`,
//! `types`) that is fully unit-testable without a runtime, and an async
//! shell (`node`, `rpc`) that drives it with Tokio tasks and talks to peers
//! over HTTP.

pub mod consensus;
pub mod error;
pub mod log;
pub mod node;
pub mod persist;
pub mod rpc;
pub mod state;
pub mod types;

pub use consensus::{ConsensusModule, ProposalStatus, ProposeError, Tick};
pub use error::RaftError;
pub use log::Log;
pub use node::Node;
pub use persist::PersistentStore;
pub use types::{LogEntry, LogEntryData, LogIndex, ServerId, Term};
