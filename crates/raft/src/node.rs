//! The async shell around `ConsensusModule`. Owns the one `Mutex` the
//! concurrency model grants the consensus module, runs the single
//! role-cycling task, fans out peer RPCs concurrently with no lock held
//! during the I/O, and exposes the committed `apply_stream` the state
//! machine consumes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::consensus::{ConsensusModule, ProposeError, Tick};
use crate::error::Result;
use crate::persist::PersistentStore;
use crate::rpc::{PeerClient, PeerService};
use crate::types::{
    AppendEntriesRequest, AppendEntriesResponse, LogEntryData, LogIndex, Message, MessageBody,
    Metadata, RequestVoteRequest, RequestVoteResponse, ServerId, Term,
};

/// A committed log entry carrying a state-machine command, handed to the
/// applier over `apply_stream`. `Noop` entries (proposed by a fresh leader
/// to establish leader completeness) are consumed here and never
/// forwarded — the state machine has no notion of them.
#[derive(Clone, Debug)]
pub struct CommittedEntry {
    pub index: LogIndex,
    pub term: Term,
    pub command: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    Accepted { index: LogIndex, term: Term },
    NotLeader { leader_hint: Option<ServerId> },
}

pub struct NodeConfig {
    pub id: ServerId,
    pub members: Vec<ServerId>,
    /// peer id -> peer-facing `host:port`, self excluded.
    pub peer_addrs: HashMap<ServerId, String>,
    pub data_path: PathBuf,
    pub election_timeout_ms: (u64, u64),
    pub heartbeat_period_ms: u64,
    pub rpc_timeout: Duration,
    /// Deterministic seed for tests, so they can inject a reproducible
    /// RNG; `None` draws from the OS.
    pub rng_seed: Option<u64>,
}

struct Inner {
    module: ConsensusModule,
    last_applied: LogIndex,
}

pub struct Node {
    id: ServerId,
    inner: StdMutex<Inner>,
    persist: PersistentStore,
    peers: HashMap<ServerId, String>,
    client: PeerClient,
    apply_tx: mpsc::UnboundedSender<CommittedEntry>,
}

/// Handle to the role-cycling task spawned by `Node::start`. Dropping or
/// aborting it simulates a crash for tests that need to force a real
/// leader election (a plain `Arc<Node>` has no way to stop its own loop).
pub type CyclingTaskHandle = tokio::task::JoinHandle<()>;

impl Node {
    pub fn start(
        config: NodeConfig,
    ) -> Result<(Arc<Node>, mpsc::UnboundedReceiver<CommittedEntry>, CyclingTaskHandle)> {
        let persist = PersistentStore::new(config.data_path);
        let (meta, log) = persist.load()?;

        let module = ConsensusModule::new(
            config.id,
            config.members,
            meta,
            log,
            config.election_timeout_ms,
            Duration::from_millis(config.heartbeat_period_ms),
            Instant::now(),
            config.rng_seed,
        );

        let (apply_tx, apply_rx) = mpsc::unbounded_channel();

        let node = Arc::new(Node {
            id: config.id,
            inner: StdMutex::new(Inner { module, last_applied: 0 }),
            persist,
            peers: config.peer_addrs,
            client: PeerClient::new(config.rpc_timeout),
            apply_tx,
        });

        let cycling = node.clone();
        let handle = tokio::spawn(async move { cycling.run_loop().await });

        Ok((node, apply_rx, handle))
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn is_leader(&self) -> bool {
        self.inner.lock().unwrap().module.is_leader()
    }

    pub fn leader_hint(&self) -> Option<ServerId> {
        self.inner.lock().unwrap().module.leader_hint()
    }

    /// `submit(command) -> (index, term, is_leader)`. Does not wait for
    /// commit; the caller registers an awaiter against the returned index.
    pub async fn submit(self: &Arc<Self>, command: Vec<u8>) -> Submission {
        let mut tick = Tick::empty(Instant::now());
        let outcome = {
            let mut inner = self.inner.lock().unwrap();
            inner.module.propose_command(command, &mut tick)
        };

        self.apply_tick(tick).await;

        match outcome {
            Ok(prop) => Submission::Accepted { index: prop.index, term: prop.term },
            Err(ProposeError::NotLeader { leader_hint }) => Submission::NotLeader { leader_hint },
        }
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            let mut tick = Tick::empty(Instant::now());
            {
                let mut inner = self.inner.lock().unwrap();
                inner.module.cycle(&mut tick);
            }
            let next_tick = tick.next_tick;
            self.apply_tick(tick).await;
            tokio::time::sleep(next_tick.unwrap_or_else(|| Duration::from_millis(10))).await;
        }
    }

    /// Persists (if requested), forwards newly committed entries to the
    /// applier, and fans out any outbound messages — all of the side
    /// effects a `Tick` can carry, performed with no module lock held.
    async fn apply_tick(self: &Arc<Self>, tick: Tick) {
        let committed = {
            let inner = self.inner.lock().unwrap();
            if tick.persist {
                if let Err(e) = self.persist.save(inner.module.meta(), inner.module.log()) {
                    tracing::warn!(error = %e, "failed to persist raft state");
                }
            }
            drop(inner);
            self.drain_committed()
        };

        for entry in committed {
            let _ = self.apply_tx.send(entry);
        }

        for msg in tick.messages {
            let node = self.clone();
            tokio::spawn(async move { node.send_message(msg).await });
        }
    }

    fn drain_committed(self: &Arc<Self>) -> Vec<CommittedEntry> {
        let mut inner = self.inner.lock().unwrap();
        let commit_index = inner.module.commit_index();
        let mut out = Vec::new();
        while inner.last_applied < commit_index {
            inner.last_applied += 1;
            let idx = inner.last_applied;
            if let Some(entry) = inner.module.log().entry(idx) {
                if let LogEntryData::Command(bytes) = &entry.data {
                    out.push(CommittedEntry { index: entry.index, term: entry.term, command: bytes.clone() });
                }
            }
        }
        out
    }

    async fn send_message(self: Arc<Self>, msg: Message) {
        let Some(peer_addr) = self.peers.get(&msg.to).cloned() else {
            return;
        };

        match msg.body {
            MessageBody::RequestVote(req) => match self.client.request_vote(&peer_addr, &req).await {
                Ok(resp) => {
                    let mut tick = Tick::empty(Instant::now());
                    {
                        let mut inner = self.inner.lock().unwrap();
                        inner.module.request_vote_callback(msg.to, resp, &mut tick);
                    }
                    self.apply_tick(tick).await;
                }
                Err(_) => {
                    // Silently dropped; retried on the next election cycle.
                }
            },
            MessageBody::AppendEntries { request, last_index_sent } => {
                match self.client.append_entries(&peer_addr, &request).await {
                    Ok(resp) => {
                        let mut tick = Tick::empty(Instant::now());
                        {
                            let mut inner = self.inner.lock().unwrap();
                            inner.module.append_entries_callback(msg.to, last_index_sent, resp, &mut tick);
                        }
                        self.apply_tick(tick).await;
                    }
                    Err(_) => {
                        let mut tick = Tick::empty(Instant::now());
                        {
                            let mut inner = self.inner.lock().unwrap();
                            inner.module.append_entries_noresponse(msg.to, &mut tick);
                        }
                        self.apply_tick(tick).await;
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl PeerService for Node {
    async fn on_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse {
        let mut tick = Tick::empty(Instant::now());
        let resp = {
            let mut inner = self.inner.lock().unwrap();
            match inner.module.append_entries(req, &mut tick) {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "append_entries protocol violation");
                    AppendEntriesResponse { term: inner.module.meta().current_term, success: false }
                }
            }
        };

        self.apply_tick(tick).await;
        resp
    }

    async fn on_request_vote(&self, req: RequestVoteRequest) -> RequestVoteResponse {
        let mut tick = Tick::empty(Instant::now());
        let resp = {
            let mut inner = self.inner.lock().unwrap();
            inner.module.request_vote(req, &mut tick)
        };
        self.apply_tick(tick).await;
        resp
    }
}

/// Re-exported so callers constructing a fresh replica's metadata don't
/// need to reach into `crate::types` directly.
pub type InitialMetadata = Metadata;
