//! The three roles a replica occupies and the bookkeeping each one
//! carries. A `FollowerState`/`CandidateState`/`LeaderState` split keeps
//! role-specific fields from leaking into code paths that don't need them.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::types::ServerId;

#[derive(Debug)]
pub struct FollowerState {
    pub election_timeout: Duration,
    pub last_leader_id: Option<ServerId>,
    pub last_heartbeat: Instant,
}

#[derive(Debug)]
pub struct CandidateState {
    pub election_start: Instant,
    pub election_timeout: Duration,
    pub votes_received: HashSet<ServerId>,
    /// Set once any peer explicitly rejects our vote request in this term,
    /// forcing a fresh term increment on the next election attempt.
    pub some_rejected: bool,
}

#[derive(Debug, Clone)]
pub struct ServerProgress {
    pub next_index: u64,
    pub match_index: u64,
    pub request_pending: bool,
    pub last_sent: Option<Instant>,
}

impl ServerProgress {
    pub fn new(last_log_index: u64) -> Self {
        ServerProgress {
            next_index: last_log_index + 1,
            match_index: 0,
            request_pending: false,
            last_sent: None,
        }
    }
}

#[derive(Debug)]
pub struct LeaderState {
    pub servers: HashMap<ServerId, ServerProgress>,
}

#[derive(Debug)]
pub enum ServerState {
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

impl ServerState {
    pub fn role_name(&self) -> &'static str {
        match self {
            ServerState::Follower(_) => "follower",
            ServerState::Candidate(_) => "candidate",
            ServerState::Leader(_) => "leader",
        }
    }
}
