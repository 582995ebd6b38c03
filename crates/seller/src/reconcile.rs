//! Seller's 1-second reconciliation loop. Also carries restart-resume
//! behaviour: a fetched auction that is `started ∧ ¬finished` and new to
//! the local store gets a driver spawned for it, preserving whatever
//! `round_id`/`current_price` the Platform still had on record.

use std::sync::Arc;
use std::time::Duration;

use common::command::ReplyPayload;
use common::reconcile::merge_auction;
use common::{AuctionView, Command};

use crate::driver::SellerRuntime;

pub async fn run(runtime: Arc<SellerRuntime>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        if let Err(e) = reconcile_once(&runtime).await {
            tracing::debug!(error = %e, "seller reconciliation tick failed");
        }
    }
}

async fn reconcile_once(runtime: &Arc<SellerRuntime>) -> Result<(), common::TransportError> {
    let command = Command::SellerFetchAuctions { username: runtime.username.clone() };
    let reply = runtime.platform.submit(&command).await?;
    if !reply.success {
        return Ok(());
    }
    let ReplyPayload::Auctions(views) = reply.payload else { return Ok(()) };

    for view in views {
        // A seller only ever sees its own auctions in full and has no use
        // for a shielded view of someone else's.
        let AuctionView::Full(remote) = view else { continue };
        if remote.seller_username != runtime.username {
            continue;
        }

        let was_known = runtime.store.contains(remote.id);
        let is_live = remote.started && !remote.finished;
        let local = runtime.store.snapshot(remote.id);
        let merged = merge_auction(local, remote);
        let id = merged.id;
        runtime.store.replace(merged);

        if !was_known && is_live {
            runtime.spawn_driver(id);
        }

        if let Some(snapshot) = runtime.store.snapshot(id) {
            for buyer in snapshot.buyers.keys() {
                runtime.addresses.resolve(&runtime.platform, buyer).await;
            }
        }
    }

    Ok(())
}
