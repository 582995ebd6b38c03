//! The leader-based replicated-log consensus core.
//!
//! No membership-change or snapshot machinery — this cluster's replica set
//! is static. Every rejection that's an ordinary, expected outcome (stale
//! term, log mismatch, vote withheld) returns a negative response rather
//! than an `Err` — `RaftError` is reserved for conditions that should be
//! structurally impossible.
//!
//! `ConsensusModule` performs no I/O and owns no `Mutex`; every public
//! method takes `&mut self` and a `&mut Tick` out-parameter that
//! accumulates the side effects the caller (`crate::node::Node`) must carry
//! out. This is what makes the hardest logic in the whole workspace
//! unit-testable without a runtime (see `tests.rs`).

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::RaftError;
use crate::log::Log;
use crate::state::{CandidateState, FollowerState, LeaderState, ServerProgress, ServerState};
use crate::types::{
    AppendEntriesRequest, AppendEntriesResponse, LogEntry, LogEntryData, LogIndex, LogPosition,
    Message, MessageBody, Metadata, RequestVoteRequest, RequestVoteResponse, ServerId, Term,
};

pub type Proposal = LogPosition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposeError {
    /// We are not the leader. `leader_hint` is our best guess (the last
    /// leader we observed, or who we voted for) so the caller can retry
    /// against the right replica without a blind round-robin.
    NotLeader { leader_hint: Option<ServerId> },
}

pub type ProposeResult = std::result::Result<Proposal, ProposeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Committed,
    Failed,
    Pending,
    Unavailable,
}

/// All external side effects requested by the module during one operation.
#[derive(Debug)]
pub struct Tick {
    pub time: Instant,
    /// If set, `(meta, log)` must be persisted before any reply derived
    /// from this tick is sent.
    pub persist: bool,
    pub messages: Vec<Message>,
    /// If no other event occurs first, `cycle` should be called again
    /// after this long.
    pub next_tick: Option<Duration>,
}

impl Tick {
    pub fn empty(time: Instant) -> Self {
        Tick { time, persist: false, messages: Vec::new(), next_tick: None }
    }

    pub fn write_persist(&mut self) {
        self.persist = true;
    }

    pub fn send(&mut self, msg: Message) {
        self.messages.push(msg);
    }
}

pub struct ConsensusModule {
    id: ServerId,
    /// All replicas, self included. Static for the cluster's lifetime — no
    /// membership changes.
    members: Vec<ServerId>,
    meta: Metadata,
    log: Log,
    /// Volatile: commit_index and last_applied restart at 0 on restart
    /// and are rebuilt as entries are reapplied.
    commit_index: LogIndex,
    state: ServerState,
    election_timeout_range: (u64, u64),
    heartbeat_timeout: Duration,
    rng: StdRng,
}

impl ConsensusModule {
    pub fn new(
        id: ServerId,
        members: Vec<ServerId>,
        meta: Metadata,
        log: Log,
        election_timeout_range: (u64, u64),
        heartbeat_timeout: Duration,
        now: Instant,
        rng_seed: Option<u64>,
    ) -> Self {
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut module = ConsensusModule {
            id,
            members,
            meta,
            log,
            commit_index: 0,
            state: ServerState::Follower(FollowerState {
                election_timeout: Duration::from_millis(0),
                last_leader_id: None,
                last_heartbeat: now,
            }),
            election_timeout_range,
            heartbeat_timeout,
            rng,
        };
        module.state = ServerState::Follower(FollowerState {
            election_timeout: module.new_election_timeout(),
            last_leader_id: None,
            last_heartbeat: now,
        });
        module
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn role(&self) -> &'static str {
        self.state.role_name()
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.state, ServerState::Leader(_))
    }

    pub fn leader_hint(&self) -> Option<ServerId> {
        match &self.state {
            ServerState::Leader(_) => Some(self.id),
            ServerState::Follower(s) => s.last_leader_id.or(self.meta.voted_for),
            ServerState::Candidate(_) => self.meta.voted_for,
        }
    }

    fn majority_size(&self) -> usize {
        if self.members.is_empty() {
            return usize::MAX;
        }
        self.members.len() / 2 + 1
    }

    fn can_be_leader(&self) -> bool {
        self.log.last_index() >= self.commit_index
    }

    fn new_election_timeout(&mut self) -> Duration {
        let (low, high) = self.election_timeout_range;
        Duration::from_millis(self.rng.gen_range(low..=high))
    }

    // ---- Proposing entries (leader only) --------------------------------

    pub fn propose_command(&mut self, data: Vec<u8>, tick: &mut Tick) -> ProposeResult {
        self.propose_entry(LogEntryData::Command(data), tick)
    }

    pub fn propose_noop(&mut self, tick: &mut Tick) -> ProposeResult {
        self.propose_entry(LogEntryData::Noop, tick)
    }

    fn propose_entry(&mut self, data: LogEntryData, tick: &mut Tick) -> ProposeResult {
        if !self.is_leader() {
            return Err(ProposeError::NotLeader { leader_hint: self.leader_hint() });
        }

        let index = self.log.last_index() + 1;
        let term = self.meta.current_term;
        assert!(term > 0, "a leader always has a term > 0");

        self.log.append(LogEntry { term, index, data });
        tick.write_persist();

        self.cycle(tick);

        Ok(Proposal { term, index })
    }

    /// Queryable on any replica; only meaningful once the leader that
    /// accepted the proposal (or a later leader) has had a chance to
    /// converge.
    pub fn proposal_status(&self, prop: &Proposal) -> ProposalStatus {
        let last_log_index = self.log.last_index();
        let last_log_term = self.log.term(last_log_index).unwrap();

        if prop.term > last_log_term || prop.index > last_log_index {
            return ProposalStatus::Pending;
        }

        let cur_term = match self.log.term(prop.index) {
            Some(t) => t,
            None => return ProposalStatus::Unavailable,
        };

        match cur_term.cmp(&prop.term) {
            std::cmp::Ordering::Greater => ProposalStatus::Failed,
            std::cmp::Ordering::Less => {
                if self.commit_index >= prop.index {
                    ProposalStatus::Failed
                } else {
                    ProposalStatus::Pending
                }
            }
            std::cmp::Ordering::Equal => {
                if self.commit_index >= prop.index {
                    ProposalStatus::Committed
                } else {
                    ProposalStatus::Pending
                }
            }
        }
    }

    // ---- The main state-transition loop ----------------------------------

    /// Advances this replica's role state by exactly one "what should
    /// happen now" step, given the wall-clock time in `tick.time`. Always
    /// leaves `tick.next_tick` set to when it should be called again
    /// (absent some other event, like an inbound RPC, happening first).
    pub fn cycle(&mut self, tick: &mut Tick) {
        if self.members.is_empty() || !self.members.contains(&self.id) {
            tick.next_tick = Some(Duration::from_secs(1));
            return;
        }

        enum Summary {
            Follower { elapsed: Duration, election_timeout: Duration },
            Candidate { vote_count: usize, election_start: Instant, election_timeout: Duration },
            Leader { next_commit_index: Option<LogIndex> },
        }

        let summary = match &self.state {
            ServerState::Follower(s) => Summary::Follower {
                elapsed: tick.time.saturating_duration_since(s.last_heartbeat),
                election_timeout: s.election_timeout,
            },
            ServerState::Candidate(s) => Summary::Candidate {
                vote_count: 1 + s.votes_received.len(),
                election_start: s.election_start,
                election_timeout: s.election_timeout,
            },
            ServerState::Leader(s) => Summary::Leader { next_commit_index: self.find_next_commit_index(s) },
        };

        match summary {
            Summary::Follower { elapsed, election_timeout } => {
                if !self.can_be_leader() {
                    if self.members.len() == 1 {
                        panic!("single-node cluster with an unreplayable log can never make progress");
                    }
                    let timeout = self.new_election_timeout();
                    self.state = ServerState::Follower(FollowerState {
                        election_timeout: timeout,
                        last_leader_id: None,
                        last_heartbeat: tick.time,
                    });
                    tick.next_tick = Some(timeout);
                } else if elapsed >= election_timeout || self.members.len() == 1 {
                    self.start_election(tick);
                } else {
                    tick.next_tick = Some(election_timeout - elapsed);
                }
            }
            Summary::Candidate { vote_count, election_start, election_timeout } => {
                if vote_count >= self.majority_size() {
                    self.become_leader(tick);
                } else {
                    let elapsed = tick.time.saturating_duration_since(election_start);
                    if elapsed >= election_timeout {
                        self.start_election(tick);
                    } else {
                        tick.next_tick = Some(election_timeout - elapsed);
                    }
                }
            }
            Summary::Leader { next_commit_index } => {
                if let Some(ci) = next_commit_index {
                    self.update_committed(ci, tick);
                }
                let next_heartbeat = self.replicate_entries(tick);
                tick.next_tick = Some(next_heartbeat);
            }
        }
    }

    fn become_leader(&mut self, tick: &mut Tick) {
        tracing::info!(id = self.id, term = self.meta.current_term, "became leader");

        let last_log_index = self.log.last_index();
        let servers = self
            .members
            .iter()
            .filter(|s| **s != self.id)
            .map(|s| (*s, ServerProgress::new(last_log_index)))
            .collect();

        self.state = ServerState::Leader(LeaderState { servers });

        if self.commit_index < last_log_index {
            self.propose_noop(tick).expect("a fresh leader can always propose");
        } else {
            self.cycle(tick);
        }
    }

    /// On the leader: the highest index `N` such that a majority of
    /// `match_index >= N` and `log[N].term == current_term`.
    fn find_next_commit_index(&self, s: &LeaderState) -> Option<LogIndex> {
        let mut candidate = self.log.last_index();
        let majority = self.majority_size();

        while candidate > self.commit_index {
            let term = self.log.term(candidate).unwrap();

            if term < self.meta.current_term {
                break;
            }
            if term == self.meta.current_term {
                let mut count = 1; // ourselves
                for (id, progress) in s.servers.iter() {
                    if *id == self.id {
                        continue;
                    }
                    if progress.match_index >= candidate {
                        count += 1;
                    }
                }
                if count >= majority {
                    return Some(candidate);
                }
            }
            candidate -= 1;
        }
        None
    }

    fn replicate_entries(&mut self, tick: &mut Tick) -> Duration {
        let state = match &mut self.state {
            ServerState::Leader(s) => s,
            _ => panic!("replicate_entries called while not leader"),
        };

        let term = self.meta.current_term;
        let leader_commit = self.commit_index;
        let last_log_index = self.log.last_index();
        let leader_id = self.id;

        let mut since_last_heartbeat = Duration::from_millis(0);

        for server_id in self.members.iter().copied() {
            if server_id == leader_id {
                continue;
            }

            let progress = state
                .servers
                .entry(server_id)
                .or_insert_with(|| ServerProgress::new(last_log_index));

            if progress.request_pending {
                continue;
            }

            if progress.match_index >= last_log_index {
                if let Some(last_sent) = progress.last_sent {
                    let elapsed = tick.time.saturating_duration_since(last_sent);
                    if elapsed < self.heartbeat_timeout {
                        since_last_heartbeat = since_last_heartbeat.max(elapsed);
                        continue;
                    }
                }
            }

            let prev_log_index = progress.next_index.saturating_sub(1);
            let prev_log_term = match self.log.term(prev_log_index) {
                Some(t) => t,
                None => {
                    // Our log no longer has this entry (shouldn't happen
                    // absent compaction, which this spec doesn't have).
                    continue;
                }
            };

            let mut entries = Vec::new();
            for i in (prev_log_index + 1)..=last_log_index {
                entries.push(self.log.entry(i).unwrap().clone());
            }

            progress.request_pending = true;
            progress.last_sent = Some(tick.time);

            let request = AppendEntriesRequest {
                term,
                leader_id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            };

            tick.send(Message {
                to: server_id,
                body: MessageBody::AppendEntries { request, last_index_sent: last_log_index },
            });
        }

        self.heartbeat_timeout.saturating_sub(since_last_heartbeat)
    }

    fn start_election(&mut self, tick: &mut Tick) {
        if !self.can_be_leader() {
            panic!("a replica with uncommitted-but-missing entries cannot start an election");
        }

        let must_increment_term = match &self.state {
            ServerState::Candidate(s) => s.some_rejected,
            _ => true,
        };

        if must_increment_term {
            self.meta.current_term += 1;
            self.meta.voted_for = Some(self.id);
            tick.write_persist();
        }

        tracing::info!(id = self.id, term = self.meta.current_term, "starting election");

        self.state = ServerState::Candidate(CandidateState {
            election_start: tick.time,
            election_timeout: self.new_election_timeout(),
            votes_received: HashSet::new(),
            some_rejected: false,
        });

        self.request_votes(tick);
        self.cycle(tick);
    }

    fn request_votes(&self, tick: &mut Tick) {
        let last_log_index = self.log.last_index();
        let last_log_term = self.log.term(last_log_index).unwrap();

        let request = RequestVoteRequest {
            term: self.meta.current_term,
            candidate_id: self.id,
            last_log_index,
            last_log_term,
        };

        for peer in self.members.iter().copied().filter(|s| *s != self.id) {
            tick.send(Message { to: peer, body: MessageBody::RequestVote(request.clone()) });
        }
    }

    fn become_follower(&mut self, tick: &mut Tick) {
        let timeout = self.new_election_timeout();
        self.state = ServerState::Follower(FollowerState {
            election_timeout: timeout,
            last_leader_id: None,
            last_heartbeat: tick.time,
        });
        self.cycle(tick);
    }

    /// Run on every incoming RPC/response that carries a term: reject
    /// anything stale, step down and adopt the term if it's newer than ours.
    fn observe_term(&mut self, term: Term, tick: &mut Tick) {
        if term > self.meta.current_term {
            self.meta.current_term = term;
            self.meta.voted_for = None;
            tick.write_persist();
            self.become_follower(tick);
        }
    }

    fn update_committed(&mut self, index: LogIndex, tick: &mut Tick) {
        assert!(index > self.commit_index);
        self.commit_index = index;
    }

    // ---- Inbound RPC handlers ---------------------------------------------

    pub fn request_vote_callback(&mut self, from: ServerId, resp: RequestVoteResponse, tick: &mut Tick) {
        self.observe_term(resp.term, tick);

        if self.meta.current_term != resp.term || from == self.id {
            return;
        }

        if let ServerState::Candidate(s) = &mut self.state {
            if resp.vote_granted {
                s.votes_received.insert(from);
            } else {
                s.some_rejected = true;
            }
            self.cycle(tick);
        }
    }

    pub fn append_entries_callback(
        &mut self,
        from: ServerId,
        last_index_sent: LogIndex,
        resp: AppendEntriesResponse,
        tick: &mut Tick,
    ) {
        self.observe_term(resp.term, tick);

        let should_cycle = if let ServerState::Leader(s) = &mut self.state {
            if let Some(progress) = s.servers.get_mut(&from) {
                if resp.success {
                    if last_index_sent > progress.match_index {
                        progress.match_index = last_index_sent;
                        progress.next_index = last_index_sent + 1;
                    }
                } else {
                    progress.next_index = progress.next_index.saturating_sub(1).max(1);
                }
                progress.request_pending = false;
            }
            true
        } else {
            false
        };

        if should_cycle {
            self.cycle(tick);
        }
    }

    pub fn append_entries_noresponse(&mut self, from: ServerId, _tick: &mut Tick) {
        if let ServerState::Leader(s) = &mut self.state {
            if let Some(progress) = s.servers.get_mut(&from) {
                progress.request_pending = false;
            }
        }
    }

    /// Handles an incoming `request_vote` RPC: grants only if the voter
    /// hasn't already voted for someone else this term and the candidate's
    /// log is at least as up-to-date as the voter's.
    pub fn request_vote(&mut self, req: RequestVoteRequest, tick: &mut Tick) -> RequestVoteResponse {
        self.observe_term(req.term, tick);

        if req.term < self.meta.current_term {
            return RequestVoteResponse { term: self.meta.current_term, vote_granted: false };
        }

        let last_log_index = self.log.last_index();
        let last_log_term = self.log.term(last_log_index).unwrap();

        let candidate_up_to_date = req.last_log_term > last_log_term
            || (req.last_log_term == last_log_term && req.last_log_index >= last_log_index);

        let already_voted_for_someone_else =
            matches!(self.meta.voted_for, Some(id) if id != req.candidate_id);

        let granted = candidate_up_to_date && !already_voted_for_someone_else;

        if granted {
            self.meta.voted_for = Some(req.candidate_id);
            tick.write_persist();

            if let ServerState::Follower(s) = &mut self.state {
                s.last_heartbeat = tick.time;
            }
            tracing::debug!(id = self.id, candidate = req.candidate_id, "granted vote");
        }

        RequestVoteResponse { term: self.meta.current_term, vote_granted: granted }
    }

    /// Handles an incoming `append_entries` RPC: rejects a stale term or a
    /// log mismatch at `prev_log_index` without mutation, and truncates
    /// and replaces any conflicting suffix before appending new entries.
    pub fn append_entries(
        &mut self,
        req: AppendEntriesRequest,
        tick: &mut Tick,
    ) -> std::result::Result<AppendEntriesResponse, RaftError> {
        self.observe_term(req.term, tick);

        if req.term == self.meta.current_term && matches!(self.state, ServerState::Candidate(_)) {
            self.become_follower(tick);
        }

        let current_term = self.meta.current_term;

        if req.term < current_term {
            return Ok(AppendEntriesResponse { term: current_term, success: false });
        }

        match &mut self.state {
            ServerState::Follower(s) => {
                s.last_heartbeat = tick.time;
                s.last_leader_id = Some(req.leader_id);
            }
            ServerState::Leader(_) => {
                if req.leader_id != self.id {
                    return Err(RaftError::ProtocolViolation(
                        "received append_entries from another leader in the same term".into(),
                    ));
                }
            }
            ServerState::Candidate(_) => {
                return Err(RaftError::ProtocolViolation("still a candidate after observing current-term leader".into()));
            }
        }

        match self.log.term(req.prev_log_index) {
            Some(term) if term == req.prev_log_term => {}
            _ => return Ok(AppendEntriesResponse { term: current_term, success: false }),
        }

        // Find the first new entry, truncating on conflict.
        let mut first_new = 0;
        for e in req.entries.iter() {
            match self.log.term(e.index) {
                Some(t) if t == e.term => first_new += 1,
                Some(_) => {
                    if self.commit_index >= e.index {
                        return Err(RaftError::ProtocolViolation(
                            "refusing to truncate an already-committed entry".into(),
                        ));
                    }
                    self.log.truncate_suffix(e.index);
                    break;
                }
                None => break,
            }
        }

        if req.entries.len() > first_new {
            for e in &req.entries[first_new..] {
                self.log.append(e.clone());
            }
            tick.write_persist();
        }

        let last_new_index = req.entries.last().map(|e| e.index).unwrap_or(req.prev_log_index);

        if req.leader_commit > self.commit_index {
            let next_commit_index = req.leader_commit.min(last_new_index);
            if next_commit_index > self.commit_index {
                self.update_committed(next_commit_index, tick);
            }
        }

        Ok(AppendEntriesResponse { term: current_term, success: true })
    }
}

#[cfg(test)]
#[path = "consensus_tests.rs"]
mod tests;
