//! Wire types for the consensus module: log entries, the persistent
//! metadata triple, and the peer RPC request/response pairs. This cluster
//! is a static, pre-configured replica list with no reconfiguration, so
//! there's no membership-change machinery (`ConfigChange`, `Configuration`,
//! learners) here.

use serde::{Deserialize, Serialize};

pub type ServerId = u64;
pub type Term = u64;
/// 1-based; 0 is reserved as the "nothing here yet" sentinel.
pub type LogIndex = u64;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogEntryData {
    /// Occupies a log index without carrying a state-machine command.
    /// Proposed by a freshly elected leader so it can commit (and thus
    /// safely serve reads/writes for) entries left over from a prior term.
    Noop,
    /// Opaque bytes handed to the state machine on apply. The raft crate
    /// never interprets this payload.
    Command(Vec<u8>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub index: LogIndex,
    pub term: Term,
    pub data: LogEntryData,
}

/// The persistent term/vote pair, minus the log (stored separately in
/// `Log`, see `crate::log`).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    pub current_term: Term,
    pub voted_for: Option<ServerId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogPosition {
    pub term: Term,
    pub index: LogIndex,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: ServerId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: ServerId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

/// An outbound message the `ConsensusModule` wants sent, accumulated in a
/// `Tick` rather than sent directly: no RPC is issued with a lock held, the
/// async shell in `crate::node` performs the actual I/O.
#[derive(Clone, Debug)]
pub enum MessageBody {
    RequestVote(RequestVoteRequest),
    AppendEntries { request: AppendEntriesRequest, last_index_sent: LogIndex },
}

#[derive(Clone, Debug)]
pub struct Message {
    pub to: ServerId,
    pub body: MessageBody,
}
