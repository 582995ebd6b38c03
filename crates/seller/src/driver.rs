//! The price-increment driver and the async orchestration around withdraw
//! and finish. The synchronous decisions live in `crate::store`;
//! everything here is the I/O that must happen with no lock held.

use std::sync::Arc;
use std::time::Duration;

use common::live::{AnnouncePriceRequest, FinishAuctionRequest};
use common::{AuctionId, Command, DomainError, PlatformClient, Reply};
use futures::future::join_all;

use crate::buyer_client::BuyerClient;
use crate::store::{FinishOutcome, SellerStore, WithdrawOutcome};
use crate::AddressCache;

pub struct SellerRuntime {
    pub username: String,
    pub store: Arc<SellerStore>,
    pub buyer_client: BuyerClient,
    pub addresses: Arc<AddressCache>,
    pub platform: Arc<PlatformClient>,
}

impl SellerRuntime {
    /// Spawns the per-auction price-increment driver. Also used to resume
    /// a driver after a restart finds a live auction — `round_id` and
    /// `current_price` are whatever the store already holds, so resuming
    /// is just "start the loop again".
    pub fn spawn_driver(self: &Arc<Self>, auction_id: AuctionId) {
        let runtime = self.clone();
        tokio::spawn(async move { runtime.run_driver(auction_id).await });
    }

    async fn run_driver(self: Arc<Self>, auction_id: AuctionId) {
        loop {
            let Some(snapshot) = self.store.snapshot(auction_id) else { return };
            if snapshot.finished {
                return;
            }

            let buyer_status = snapshot.buyer_status_snapshot();
            let req = AnnouncePriceRequest {
                auction_id,
                round_id: snapshot.round_id,
                price: snapshot.current_price,
                buyer_status: buyer_status.clone(),
            };

            let calls = buyer_status.iter().map(|(buyer, _)| {
                let buyer = buyer.clone();
                let req = req.clone();
                let runtime = self.clone();
                async move {
                    let addr = runtime.addresses.resolve(&runtime.platform, &buyer).await;
                    let ok = match addr {
                        Some(addr) => runtime.buyer_client.announce_price(&addr, &req).await.is_ok(),
                        None => false,
                    };
                    (buyer, ok)
                }
            });

            for (buyer, ok) in join_all(calls).await {
                if !ok {
                    // An unacknowledged announce is treated as an implicit withdrawal.
                    self.withdraw_and_react(auction_id, &buyer).await;
                }
            }

            tokio::time::sleep(Duration::from_millis(snapshot.price_increment_period_ms)).await;

            match self.store.advance_round(auction_id) {
                Some(_) => continue,
                None => return,
            }
        }
    }

    /// Returns the reply the caller (the HTTP handler, or this driver on
    /// an implicit withdrawal) should surface, and fires off `finish`/the
    /// non-acking fanout in the background after the store lock has
    /// already been released.
    pub async fn withdraw_and_react(self: &Arc<Self>, auction_id: AuctionId, buyer: &str) -> Reply {
        match self.store.withdraw(auction_id, &self.username, buyer) {
            WithdrawOutcome::Rejected(err) => Reply::err(err.to_string()),
            WithdrawOutcome::AlreadyWithdrew => Reply::ok("already withdrew"),
            WithdrawOutcome::SoleActiveBuyerFinished => {
                let runtime = self.clone();
                tokio::spawn(async move { runtime.finish(auction_id).await });
                Reply::err(DomainError::SoleActiveBuyerCannotWithdraw.to_string())
            }
            WithdrawOutcome::Withdrawn { became_sole_survivor } => {
                if became_sole_survivor {
                    let runtime = self.clone();
                    tokio::spawn(async move { runtime.finish(auction_id).await });
                }
                let runtime = self.clone();
                let auction_id = auction_id;
                tokio::spawn(async move { runtime.notify_fanout(auction_id).await });
                Reply::ok("withdrew")
            }
        }
    }

    /// Non-acknowledging `announce_price` fan-out: informational only,
    /// failures are not retried and do not trigger further withdrawals.
    async fn notify_fanout(self: Arc<Self>, auction_id: AuctionId) {
        let Some(snapshot) = self.store.snapshot(auction_id) else { return };
        if snapshot.finished {
            return;
        }
        let buyer_status = snapshot.buyer_status_snapshot();
        let req = AnnouncePriceRequest {
            auction_id,
            round_id: snapshot.round_id,
            price: snapshot.current_price,
            buyer_status: buyer_status.clone(),
        };

        let calls = buyer_status.into_iter().map(|(buyer, _)| {
            let req = req.clone();
            let runtime = self.clone();
            async move {
                if let Some(addr) = runtime.addresses.resolve(&runtime.platform, &buyer).await {
                    let _ = runtime.buyer_client.announce_price(&addr, &req).await;
                }
            }
        });
        join_all(calls).await;
    }

    async fn finish(self: Arc<Self>, auction_id: AuctionId) {
        let Some(FinishOutcome { snapshot }) = self.store.finish(auction_id) else { return };

        let buyer_status = snapshot.buyer_status_snapshot();
        let req = FinishAuctionRequest {
            auction_id,
            winner_username: snapshot.winner_username.clone(),
            price: snapshot.transaction_price,
            buyer_status: buyer_status.clone(),
        };

        let calls = buyer_status.into_iter().map(|(buyer, _)| {
            let req = req.clone();
            let runtime = self.clone();
            async move {
                if let Some(addr) = runtime.addresses.resolve(&runtime.platform, &buyer).await {
                    let _ = runtime.buyer_client.finish_auction(&addr, &req).await;
                }
            }
        });
        join_all(calls).await;

        let command = Command::SellerFinishAuction { seller: self.username.clone(), auction: snapshot };
        loop {
            match self.platform.submit(&command).await {
                Ok(reply) if reply.success => break,
                Ok(_) | Err(_) => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
    }
}
