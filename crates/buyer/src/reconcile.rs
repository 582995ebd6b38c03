//! Buyer's 1-second reconciliation loop. A live auction missing locally is
//! pulled in on first sight, then left alone (the seller's announces
//! become the source of truth), the same rule `crate::store`'s merge
//! function already encodes.

use std::sync::Arc;
use std::time::Duration;

use common::command::ReplyPayload;
use common::reconcile::merge_auction;
use common::{AuctionView, Command};

use crate::runtime::BuyerRuntime;

pub async fn run(runtime: Arc<BuyerRuntime>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        if let Err(e) = reconcile_once(&runtime).await {
            tracing::debug!(error = %e, "buyer reconciliation tick failed");
        }
    }
}

async fn reconcile_once(runtime: &Arc<BuyerRuntime>) -> Result<(), common::TransportError> {
    let command = Command::BuyerFetchAuctions { username: runtime.username.clone() };
    let reply = runtime.platform.submit(&command).await?;
    if !reply.success {
        return Ok(());
    }
    let ReplyPayload::Auctions(views) = reply.payload else { return Ok(()) };

    for view in views {
        let AuctionView::Full(remote) = view else {
            // A shielded view means we're not a participant; nothing to
            // mirror locally.
            continue;
        };

        let local = runtime.store.snapshot(remote.id);
        let seller = remote.seller_username.clone();
        let merged = merge_auction(local, remote);
        runtime.store.replace(merged);
        runtime.addresses.resolve(&runtime.platform, &seller).await;
    }

    Ok(())
}
