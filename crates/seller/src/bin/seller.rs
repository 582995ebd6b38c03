//! Binary entry point for a seller process: takes a `--username` and
//! `--listen-port` in addition to the shared cluster config.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::command::ReplyPayload;
use common::{AddressCache, ClusterConfig, Command, PlatformClient};
use seller::store::SellerStore;
use seller::{server, SellerRuntime};

#[derive(Parser, Debug)]
#[command(about = "Runs a seller process: owns its auctions' live state and price-increment drivers")]
struct Args {
    #[arg(long)]
    config: std::path::PathBuf,

    #[arg(long)]
    username: String,

    /// Address this seller already registered for itself via `LOGIN`.
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

    let runtime = Arc::new(SellerRuntime {
        username: args.username.clone(),
        store: Arc::new(SellerStore::new()),
        buyer_client: seller::buyer_client::BuyerClient::new(Duration::from_millis(500)),
        addresses: Arc::new(AddressCache::new()),
        platform: platform.clone(),
    });

    // Resume any auction the Platform still has on record as
    // `started ∧ ¬finished` before entering the steady-state loops.
    let fetch = Command::SellerFetchAuctions { username: args.username.clone() };
    if let Ok(reply) = platform.submit(&fetch).await {
        if reply.success {
            if let ReplyPayload::Auctions(views) = reply.payload {
                for view in views {
                    if let common::AuctionView::Full(auction) = view {
                        if auction.seller_username == args.username {
                            let live = auction.started && !auction.finished;
                            let id = auction.id;
                            runtime.store.replace(auction);
                            if live {
                                tracing::info!(auction_id = %id, "resuming live auction driver after restart");
                                runtime.spawn_driver(id);
                            }
                        }
                    }
                }
            }
        }
    }

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.listen_port).parse()?;
    let withdraw_server = {
        let runtime = runtime.clone();
        tokio::spawn(async move { server::serve_withdraw(listen_addr, runtime).await })
    };
    let reconciliation = {
        let runtime = runtime.clone();
        tokio::spawn(async move { seller::reconcile::run(runtime).await })
    };

    tracing::info!(username = %args.username, %listen_addr, "seller process started");

    tokio::select! {
        res = withdraw_server => { res??; }
        res = reconciliation => { res?; }
    }

    Ok(())
}
