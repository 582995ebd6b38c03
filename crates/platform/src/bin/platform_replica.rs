//! Binary entry point for a single Platform replica.
//! Wires `cluster.toml`, the raft peer-facing server, the consensus `Node`,
//! the `StateMachine`-backed `Facade`, and the client-facing server
//! together, then runs until killed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::ClusterConfig;
use platform::Facade;
use raft::node::NodeConfig;
use raft::rpc::serve_peer;
use raft::Node;

#[derive(Parser, Debug)]
#[command(about = "Runs one replica of the auction platform's replicated state machine")]
struct Args {
    /// Path to `cluster.toml` describing the replica group.
    #[arg(long)]
    config: PathBuf,

    /// This replica's id, must match one entry under `[[replicas]]`.
    #[arg(long)]
    id: u64,

    /// Directory where this replica's persisted raft state is stored.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    common::logging::init("info");
    let args = Args::parse();

    let cluster = ClusterConfig::load(&args.config)?;
    let me = cluster
        .replica(args.id)
        .ok_or_else(|| anyhow::anyhow!("replica id {} not present in {:?}", args.id, args.config))?
        .clone();

    let members: Vec<u64> = cluster.replicas.iter().map(|r| r.id).collect();
    let peer_addrs = cluster
        .replicas
        .iter()
        .filter(|r| r.id != args.id)
        .map(|r| (r.id, r.peer_addr()))
        .collect();

    std::fs::create_dir_all(&args.data_dir)?;
    let data_path = args.data_dir.join(format!("replica-{}.state", args.id));

    let node_config = NodeConfig {
        id: args.id,
        members,
        peer_addrs,
        data_path,
        election_timeout_ms: cluster.election_timeout_ms,
        heartbeat_period_ms: cluster.heartbeat_period_ms,
        rpc_timeout: Duration::from_millis(cluster.heartbeat_period_ms.saturating_mul(4).max(100)),
        rng_seed: None,
    };

    let (node, apply_rx, _cycling) = Node::start(node_config)?;
    let facade = Facade::spawn(node.clone(), apply_rx);

    let peer_addr = me.peer_addr().parse()?;
    let client_addr = me.client_addr().parse()?;

    tracing::info!(id = args.id, %peer_addr, %client_addr, "starting platform replica");

    let peer_node = node.clone();
    let peer_server = tokio::spawn(async move { serve_peer(peer_addr, peer_node).await });
    let client_server = tokio::spawn(async move { platform::server::serve_clients(client_addr, facade).await });

    tokio::select! {
        res = peer_server => { res??; }
        res = client_server => { res??; }
    }

    Ok(())
}
