//! The client used by seller and buyer processes to talk to the Platform
//! replica group. Tries replicas in round-robin order, preferring the last-known leader,
//! and retries on `is_leader = false` or a transport failure until every
//! known replica has been tried once.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::cluster::{ClusterConfig, ReplicaInfo};
use crate::command::{Command, PlatformResponse, Reply};
use crate::error::TransportError;
use crate::wire;

pub struct PlatformClient {
    http: reqwest::Client,
    replicas: Vec<ReplicaInfo>,
    next: AtomicUsize,
    /// Best guess at the current leader's id, updated from `leader_hint`.
    leader_hint: AtomicU64,
}

const NO_HINT: u64 = u64::MAX;

impl PlatformClient {
    pub fn new(cluster: &ClusterConfig, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a plain timeout");
        PlatformClient {
            http,
            replicas: cluster.replicas.clone(),
            next: AtomicUsize::new(0),
            leader_hint: AtomicU64::new(NO_HINT),
        }
    }

    /// Submits `command`, trying replicas until one replies as leader or
    /// every replica has been tried once this call. A transport failure
    /// here is an unknown outcome — the caller should retry with the same
    /// idempotent intent; this function only handles the retry across
    /// replicas, not across calls.
    pub async fn submit(&self, command: &Command) -> Result<Reply, TransportError> {
        if self.replicas.is_empty() {
            return Err(TransportError::Connection("no replicas configured".into()));
        }

        let start = self.start_index();
        let mut last_err = TransportError::Connection("no replicas reachable".into());

        for offset in 0..self.replicas.len() {
            let idx = (start + offset) % self.replicas.len();
            match self.try_replica(idx, command).await {
                Ok(PlatformResponse { is_leader: true, reply: Some(reply), .. }) => {
                    self.leader_hint.store(self.replicas[idx].id, Ordering::Relaxed);
                    return Ok(reply);
                }
                Ok(PlatformResponse { is_leader: false, leader_hint: Some(hint), .. }) => {
                    self.leader_hint.store(hint, Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(e) => last_err = e,
            }
        }

        Err(last_err)
    }

    fn start_index(&self) -> usize {
        let hint = self.leader_hint.load(Ordering::Relaxed);
        if hint != NO_HINT {
            if let Some(idx) = self.replicas.iter().position(|r| r.id == hint) {
                return idx;
            }
        }
        self.next.fetch_add(1, Ordering::Relaxed) % self.replicas.len()
    }

    async fn try_replica(&self, idx: usize, command: &Command) -> Result<PlatformResponse, TransportError> {
        let addr = self.replicas[idx].client_addr();
        let body = wire::marshal(command)?;
        let url = format!("http://{addr}/");
        let resp = self.http.post(&url).body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;
        let bytes = resp.bytes().await.map_err(|e| TransportError::Connection(e.to_string()))?;
        wire::unmarshal(&bytes)
    }
}
