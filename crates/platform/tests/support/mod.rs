//! Harness for spinning up a full in-process deployment — a replicated
//! Platform cluster plus seller and buyer processes talking real HTTP —
//! so the integration tests in `../scenarios.rs` exercise the actual wire
//! paths instead of calling into each crate's internals directly.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use buyer::runtime::BuyerRuntime;
use buyer::seller_client::SellerClient;
use buyer::store::BuyerStore;
use common::{AddressCache, Auction, AuctionId, AuctionView, Cents, ClusterConfig, Command, Item, PlatformClient, ReplicaInfo, ReplyPayload};
use platform::Facade;
use raft::node::{CyclingTaskHandle, NodeConfig};
use raft::rpc::serve_peer;
use raft::Node;
use seller::buyer_client::BuyerClient;
use seller::store::SellerStore;
use seller::SellerRuntime;

static NEXT_PORT: AtomicU16 = AtomicU16::new(24000);

fn reserve_ports(count: u16) -> u16 {
    NEXT_PORT.fetch_add(count, Ordering::Relaxed)
}

pub struct ReplicaHandle {
    pub node: Arc<Node>,
    pub cycling: CyclingTaskHandle,
}

pub struct PlatformCluster {
    pub client: Arc<PlatformClient>,
    pub replicas: Vec<ReplicaHandle>,
    _tmp: tempfile::TempDir,
}

impl PlatformCluster {
    pub async fn start(n: u64) -> Self {
        let base = reserve_ports((n as u16) * 2);
        let tmp = tempfile::tempdir().expect("tempdir");

        let replica_infos: Vec<ReplicaInfo> = (0..n)
            .map(|i| ReplicaInfo {
                id: i,
                host: "127.0.0.1".into(),
                client_port: base + (i as u16) * 2,
                peer_port: base + (i as u16) * 2 + 1,
            })
            .collect();

        let config = ClusterConfig {
            replicas: replica_infos.clone(),
            heartbeat_period_ms: 30,
            election_timeout_ms: (120, 250),
        };

        let members: Vec<u64> = replica_infos.iter().map(|r| r.id).collect();
        let mut replicas = Vec::new();

        for info in &replica_infos {
            let peer_addrs = replica_infos
                .iter()
                .filter(|r| r.id != info.id)
                .map(|r| (r.id, r.peer_addr()))
                .collect();

            let node_config = NodeConfig {
                id: info.id,
                members: members.clone(),
                peer_addrs,
                data_path: tmp.path().join(format!("replica-{}.state", info.id)),
                election_timeout_ms: config.election_timeout_ms,
                heartbeat_period_ms: config.heartbeat_period_ms,
                rpc_timeout: Duration::from_millis(200),
                rng_seed: Some(info.id + 1),
            };

            let (node, apply_rx, cycling) = Node::start(node_config).expect("node starts");
            let facade = Facade::spawn(node.clone(), apply_rx);

            let peer_addr: SocketAddr = info.peer_addr().parse().unwrap();
            let peer_node = node.clone();
            tokio::spawn(async move { serve_peer(peer_addr, peer_node).await });

            let client_addr: SocketAddr = info.client_addr().parse().unwrap();
            tokio::spawn(async move { platform::server::serve_clients(client_addr, facade).await });

            replicas.push(ReplicaHandle { node, cycling });
        }

        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = Arc::new(PlatformClient::new(&config, Duration::from_millis(500)));
        let cluster = PlatformCluster { client, replicas, _tmp: tmp };
        cluster.wait_for_leader().await;
        cluster
    }

    pub async fn wait_for_leader(&self) {
        for _ in 0..300 {
            if self.replicas.iter().any(|r| r.node.is_leader()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no leader elected within timeout");
    }

    /// Aborts the current leader's role-cycling task (simulating a crash)
    /// and waits for a survivor to take over.
    pub async fn crash_leader(&self) -> u64 {
        let leader_idx = self
            .replicas
            .iter()
            .position(|r| r.node.is_leader())
            .expect("a leader must exist to crash");
        let crashed_id = self.replicas[leader_idx].node.id();
        self.replicas[leader_idx].cycling.abort();

        for _ in 0..300 {
            let new_leader = self
                .replicas
                .iter()
                .enumerate()
                .any(|(i, r)| i != leader_idx && r.node.is_leader());
            if new_leader {
                return crashed_id;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no new leader elected after crashing replica {crashed_id}");
    }
}

pub async fn login(client: &PlatformClient, username: &str, address: &str) {
    let reply = client
        .submit(&Command::Login { username: username.into(), address: address.into() })
        .await
        .expect("transport succeeds");
    assert!(reply.success, "{}", reply.message);
}

pub async fn create_auction(
    client: &PlatformClient,
    seller: &str,
    name: &str,
    base_price: i64,
    period_ms: u64,
    increment: i64,
) -> Auction {
    let reply = client
        .submit(&Command::SellerCreateAuction {
            seller: seller.into(),
            name: name.into(),
            item: Item { name: name.into(), description: "integration test item".into() },
            base_price: Cents(base_price),
            price_increment_period_ms: period_ms,
            increment: Cents(increment),
        })
        .await
        .expect("transport succeeds");
    assert!(reply.success, "{}", reply.message);
    match reply.payload {
        ReplyPayload::Auction(a) => a,
        _ => panic!("expected an auction payload"),
    }
}

pub async fn join_auction(client: &PlatformClient, username: &str, auction_id: AuctionId) {
    let reply = client
        .submit(&Command::BuyerJoinAuction { username: username.into(), auction_id })
        .await
        .expect("transport succeeds");
    assert!(reply.success, "{}", reply.message);
}

pub async fn start_auction(client: &PlatformClient, seller: &str, auction_id: AuctionId) {
    let reply = client
        .submit(&Command::SellerStartAuction { seller: seller.into(), auction_id })
        .await
        .expect("transport succeeds");
    assert!(reply.success, "{}", reply.message);
}

pub async fn fetch_auctions(client: &PlatformClient, username: &str, as_seller: bool) -> Vec<AuctionView> {
    let command = if as_seller {
        Command::SellerFetchAuctions { username: username.into() }
    } else {
        Command::BuyerFetchAuctions { username: username.into() }
    };
    let reply = client.submit(&command).await.expect("transport succeeds");
    assert!(reply.success, "{}", reply.message);
    match reply.payload {
        ReplyPayload::Auctions(views) => views,
        _ => panic!("expected an auctions payload"),
    }
}

pub struct SellerProcess {
    pub runtime: Arc<SellerRuntime>,
    pub listen_addr: SocketAddr,
}

impl SellerProcess {
    /// Binds the withdraw endpoint on a fresh port but does not start the
    /// reconciliation loop — tests seed `runtime.store` directly so
    /// scenario timing isn't at the mercy of the 1-second reconcile tick.
    pub async fn start(client: Arc<PlatformClient>, username: &str) -> Self {
        let port = reserve_ports(1);
        let listen_addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

        let runtime = Arc::new(SellerRuntime {
            username: username.to_string(),
            store: Arc::new(SellerStore::new()),
            buyer_client: BuyerClient::new(Duration::from_millis(500)),
            addresses: Arc::new(AddressCache::new()),
            platform: client,
        });

        let server_runtime = runtime.clone();
        tokio::spawn(async move { seller::server::serve_withdraw(listen_addr, server_runtime).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        SellerProcess { runtime, listen_addr }
    }
}

pub struct BuyerProcess {
    pub runtime: Arc<BuyerRuntime>,
    pub store: Arc<BuyerStore>,
    pub listen_addr: SocketAddr,
    /// The inbound `announce_price`/`finish_auction` server's task; tests
    /// abort it to simulate a buyer process dying mid-auction.
    pub server: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl BuyerProcess {
    pub async fn start(client: Arc<PlatformClient>, username: &str) -> Self {
        let port = reserve_ports(1);
        let listen_addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

        let store = Arc::new(BuyerStore::new());
        let runtime = Arc::new(BuyerRuntime {
            username: username.to_string(),
            store: store.clone(),
            seller_client: SellerClient::new(Duration::from_millis(500)),
            addresses: Arc::new(AddressCache::new()),
            platform: client,
        });

        let server_store = store.clone();
        let server = tokio::spawn(async move { buyer::server::serve(listen_addr, server_store).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        BuyerProcess { runtime, store, listen_addr, server }
    }
}

pub async fn poll_until<F: Fn() -> bool>(what: &str, timeout: Duration, predicate: F) {
    let start = tokio::time::Instant::now();
    loop {
        if predicate() {
            return;
        }
        if start.elapsed() > timeout {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
