//! The Platform RPC façade: the single entry point that funnels a client
//! command through the consensus log and blocks the caller until its log
//! index is applied, returning the state machine's reply.

use std::collections::HashMap;
use std::sync::Arc;

use common::command::{Command, Reply};
use common::wire;
use raft::node::{CommittedEntry, Submission};
use raft::Node;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use crate::state_machine::StateMachine;

/// `response.is_leader`: `false` means "no payload, try another replica";
/// `true` carries the state machine's `Reply`.
pub struct FacadeResponse {
    pub is_leader: bool,
    pub reply: Option<Reply>,
    pub leader_hint: Option<u64>,
}

/// An awaiter registered against a log index, tagged with the term of the
/// entry it was submitted as. If a later commit at that index carries a
/// different term (the original entry got overwritten after a leader
/// change), the awaiter must be dropped rather than woken with the wrong
/// command's reply — dropping the sender resolves the caller's `rx.await`
/// with an error, which `Facade::serve` treats the same as "not leader,
/// retry".
struct PendingAwaiter {
    term: u64,
    tx: oneshot::Sender<Reply>,
}

pub struct Facade {
    node: Arc<Node>,
    awaiters: AsyncMutex<HashMap<u64, PendingAwaiter>>,
}

impl Facade {
    /// Spawns the applier task that drains `apply_rx` in order, applies
    /// each entry to `state_machine`, and wakes whichever awaiter (if any)
    /// is registered for that index. Entries applied on followers (no
    /// awaiter registered) are applied silently.
    pub fn spawn(node: Arc<Node>, mut apply_rx: mpsc::UnboundedReceiver<CommittedEntry>) -> Arc<Facade> {
        let facade = Arc::new(Facade { node, awaiters: AsyncMutex::new(HashMap::new()) });

        let applier = facade.clone();
        tokio::spawn(async move {
            let state_machine = AsyncMutex::new(StateMachine::new());
            while let Some(entry) = apply_rx.recv().await {
                applier.apply_one(&state_machine, entry).await;
            }
        });

        facade
    }

    async fn apply_one(&self, state_machine: &AsyncMutex<StateMachine>, entry: CommittedEntry) {
        let reply = match wire::unmarshal::<Command>(&entry.command) {
            Ok(command) => {
                let mut sm = state_machine.lock().await;
                sm.apply(command)
            }
            Err(e) => {
                // A future/older binary wrote a command tag this replica
                // doesn't recognise. The entry still occupies a log index
                // and must still resolve any awaiter registered for it —
                // otherwise that caller's `rx.await` would hang forever.
                tracing::warn!(error = %e, index = entry.index, "failed to decode committed command");
                Reply::err(common::DomainError::UnsupportedOp.to_string())
            }
        };

        let mut awaiters = self.awaiters.lock().await;
        if let Some(awaiter) = awaiters.remove(&entry.index) {
            if awaiter.term == entry.term {
                let _ = awaiter.tx.send(reply);
            }
            // else: drop `awaiter.tx` here, unblocking the stale caller
            // with an error rather than handing it this entry's reply.
        }
    }

    /// `platform_serve(request) -> response`.
    pub async fn serve(&self, command: Command) -> FacadeResponse {
        let bytes = match wire::marshal(&command) {
            Ok(b) => b,
            Err(e) => {
                return FacadeResponse {
                    is_leader: true,
                    reply: Some(Reply::err(e.to_string())),
                    leader_hint: None,
                };
            }
        };

        match self.node.submit(bytes).await {
            Submission::NotLeader { leader_hint } => {
                FacadeResponse { is_leader: false, reply: None, leader_hint }
            }
            Submission::Accepted { index, term } => {
                let (tx, rx) = oneshot::channel();
                {
                    let mut awaiters = self.awaiters.lock().await;
                    awaiters.insert(index, PendingAwaiter { term, tx });
                }
                match rx.await {
                    Ok(reply) => FacadeResponse { is_leader: true, reply: Some(reply), leader_hint: None },
                    Err(_) => {
                        // The leader lost the entry before it committed
                        // (e.g. term change overwrote it). Not acknowledged;
                        // the client must re-send.
                        FacadeResponse { is_leader: false, reply: None, leader_hint: self.node.leader_hint() }
                    }
                }
            }
        }
    }

    pub fn leader_hint(&self) -> Option<u64> {
        self.node.leader_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A committed entry that fails to decode must still resolve its
    /// registered awaiter (with an `UnsupportedOp`-flavoured failure)
    /// rather than leaving the caller's `rx.await` hanging forever.
    #[tokio::test]
    async fn undecodable_committed_entry_still_resolves_its_awaiter() {
        let state_machine = AsyncMutex::new(StateMachine::new());
        let awaiters = AsyncMutex::new(HashMap::new());
        let (tx, rx) = oneshot::channel();
        awaiters.lock().await.insert(1, PendingAwaiter { term: 1, tx });

        let garbage = CommittedEntry { index: 1, term: 1, command: vec![0xff, 0xff, 0xff] };
        let reply = match wire::unmarshal::<Command>(&garbage.command) {
            Ok(command) => state_machine.lock().await.apply(command),
            Err(_) => Reply::err(common::DomainError::UnsupportedOp.to_string()),
        };
        if let Some(awaiter) = awaiters.lock().await.remove(&garbage.index) {
            if awaiter.term == garbage.term {
                let _ = awaiter.tx.send(reply);
            }
        }

        let resolved = rx.await.expect("awaiter must be resolved, not leaked");
        assert!(!resolved.success);
        assert_eq!(resolved.message, common::DomainError::UnsupportedOp.to_string());
    }
}
