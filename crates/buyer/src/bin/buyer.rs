//! Binary entry point for a buyer process (the same `--username`/
//! `--listen-port` CLI pair sellers take).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use buyer::runtime::BuyerRuntime;
use buyer::{reconcile, seller_client::SellerClient, server, store::BuyerStore};
use clap::Parser;
use common::{AddressCache, ClusterConfig, Command, PlatformClient};

#[derive(Parser, Debug)]
#[command(about = "Runs a buyer process: mirrors joined auctions and reacts to seller announces")]
struct Args {
    #[arg(long)]
    config: std::path::PathBuf,

    #[arg(long)]
    username: String,

    #[arg(long)]
    address: String,

    #[arg(long)]
    listen_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    common::logging::init("info");
    let args = Args::parse();

    let cluster = ClusterConfig::load(&args.config)?;
    let platform = Arc::new(PlatformClient::new(&cluster, Duration::from_millis(500)));

    let login = Command::Login { username: args.username.clone(), address: args.address.clone() };
    let reply = platform.submit(&login).await?;
    if !reply.success {
        anyhow::bail!("login failed: {}", reply.message);
    }

    let runtime = Arc::new(BuyerRuntime {
        username: args.username.clone(),
        store: Arc::new(BuyerStore::new()),
        seller_client: SellerClient::new(Duration::from_millis(500)),
        addresses: Arc::new(AddressCache::new()),
        platform: platform.clone(),
    });

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.listen_port).parse()?;
    let rpc_server = {
        let store = runtime.store.clone();
        tokio::spawn(async move { server::serve(listen_addr, store).await })
    };
    let reconciliation = {
        let runtime = runtime.clone();
        tokio::spawn(async move { reconcile::run(runtime).await })
    };

    tracing::info!(username = %args.username, %listen_addr, "buyer process started");

    tokio::select! {
        res = rpc_server => { res??; }
        res = reconciliation => { res?; }
    }

    Ok(())
}
