//! The seller's auction store — one mutex, like the Platform state
//! machine's. Holds this process's mutable copy of every auction it
//! sells, live-state fields included: the seller owns `current_price`,
//! `round_id`, and `buyers[*].active` while `started ∧ ¬finished`.
//!
//! Every locked section here is synchronous and returns a plain outcome
//! value; the caller performs any RPC fan-out after the lock is
//! released — no RPC is issued with a lock held.

use std::collections::HashMap;
use std::sync::Mutex;

use common::{Auction, AuctionId, DomainError};

pub struct SellerStore {
    auctions: Mutex<HashMap<AuctionId, Auction>>,
}

/// Outcome of a withdraw attempt, computed entirely under the store's lock.
pub enum WithdrawOutcome {
    /// The auction doesn't belong to this seller, is unknown, unstarted, or
    /// already finished.
    Rejected(DomainError),
    /// The buyer had already withdrawn; no state change.
    AlreadyWithdrew,
    /// `buyer` was the sole active buyer; the auction is now finished and
    /// the caller must run `finish` (the reply itself is still a failure).
    SoleActiveBuyerFinished,
    /// `buyer` flipped to inactive. If `became_sole_survivor` is set, the
    /// caller must run `finish` with that survivor as the winner. Either
    /// way the caller must broadcast a non-acknowledging `announce_price`.
    Withdrawn { became_sole_survivor: bool },
}

/// Outcome of a finish, carrying the snapshot needed to build the
/// `finish_auction` fan-out and the `SELLER_FINISH_AUCTION` submission.
pub struct FinishOutcome {
    pub snapshot: Auction,
}

impl SellerStore {
    pub fn new() -> Self {
        SellerStore { auctions: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, auction: Auction) {
        self.auctions.lock().unwrap().insert(auction.id, auction);
    }

    pub fn snapshot(&self, id: AuctionId) -> Option<Auction> {
        self.auctions.lock().unwrap().get(&id).cloned()
    }

    pub fn all_ids(&self) -> Vec<AuctionId> {
        self.auctions.lock().unwrap().keys().copied().collect()
    }

    pub fn contains(&self, id: AuctionId) -> bool {
        self.auctions.lock().unwrap().contains_key(&id)
    }

    /// Overwrites the local mirror of `id` with `auction`, used by the
    /// reconciliation loop and by first-start bookkeeping. Returns the
    /// previous value, if any.
    pub fn replace(&self, auction: Auction) -> Option<Auction> {
        self.auctions.lock().unwrap().insert(auction.id, auction)
    }

    /// Advances to the next round under the lock. Returns `None` if the
    /// auction is finished (driver should stop) or unknown,
    /// `Some(snapshot)` of the new round otherwise.
    pub fn advance_round(&self, id: AuctionId) -> Option<Auction> {
        let mut guard = self.auctions.lock().unwrap();
        let auction = guard.get_mut(&id)?;
        if auction.finished {
            return None;
        }
        auction.round_id = auction.round_id.next();
        auction.current_price = auction.current_price + auction.increment;
        Some(auction.clone())
    }

    /// Atomic under the store lock.
    pub fn withdraw(&self, id: AuctionId, seller_username: &str, buyer: &str) -> WithdrawOutcome {
        let mut guard = self.auctions.lock().unwrap();
        let Some(auction) = guard.get_mut(&id) else {
            return WithdrawOutcome::Rejected(DomainError::UnknownAuction(id.0));
        };

        if auction.seller_username != seller_username
            || !auction.buyers.contains_key(buyer)
            || auction.finished
            || !auction.started
        {
            return WithdrawOutcome::Rejected(DomainError::BadLifecycle(format!(
                "auction {id} is not accepting withdrawals from {buyer}"
            )));
        }

        if !auction.is_active_buyer(buyer) {
            return WithdrawOutcome::AlreadyWithdrew;
        }

        if auction.n_active_buyers() == 1 && auction.sole_active_buyer() == Some(buyer) {
            auction.finished = true;
            return WithdrawOutcome::SoleActiveBuyerFinished;
        }

        auction.buyers.insert(buyer.to_string(), false);
        let became_sole_survivor = auction.n_active_buyers() == 1;
        WithdrawOutcome::Withdrawn { became_sole_survivor }
    }

    /// Atomic under the store lock.
    pub fn finish(&self, id: AuctionId) -> Option<FinishOutcome> {
        let mut guard = self.auctions.lock().unwrap();
        let auction = guard.get_mut(&id)?;

        auction.finished = true;
        match auction.sole_active_buyer() {
            Some(winner) => {
                auction.winner_username = winner.to_string();
                auction.transaction_price = auction.current_price;
            }
            None => {
                auction.winner_username = String::new();
                auction.transaction_price = auction.base_price;
            }
        }

        Some(FinishOutcome { snapshot: auction.clone() })
    }
}

impl Default for SellerStore {
    fn default() -> Self {
        SellerStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Cents, Item, RoundId};

    fn live_auction(id: u64, buyers: &[(&str, bool)]) -> Auction {
        let mut a = Auction::new(
            AuctionId(id),
            "lamp".into(),
            "alice".into(),
            Item { name: "Lamp".into(), description: "brass".into() },
            Cents(1000),
            1000,
            Cents(100),
        );
        a.started = true;
        a.round_id = RoundId(0);
        for (name, active) in buyers {
            a.buyers.insert(name.to_string(), *active);
        }
        a
    }

    #[test]
    fn withdraw_flips_active_false_and_reports_survivor() {
        let store = SellerStore::new();
        store.insert(live_auction(1, &[("bob", true), ("carol", true)]));

        match store.withdraw(AuctionId(1), "alice", "bob") {
            WithdrawOutcome::Withdrawn { became_sole_survivor } => assert!(became_sole_survivor),
            _ => panic!("expected Withdrawn"),
        }

        let snap = store.snapshot(AuctionId(1)).unwrap();
        assert!(!snap.is_active_buyer("bob"));
        assert!(snap.is_active_buyer("carol"));
    }

    #[test]
    fn sole_active_buyer_cannot_withdraw_but_auction_finishes() {
        let store = SellerStore::new();
        store.insert(live_auction(1, &[("bob", true)]));

        match store.withdraw(AuctionId(1), "alice", "bob") {
            WithdrawOutcome::SoleActiveBuyerFinished => {}
            _ => panic!("expected SoleActiveBuyerFinished"),
        }

        assert!(store.snapshot(AuctionId(1)).unwrap().finished);
    }

    #[test]
    fn repeated_withdraw_is_reported_as_already_withdrew() {
        let store = SellerStore::new();
        store.insert(live_auction(1, &[("bob", true), ("carol", true)]));
        let _ = store.withdraw(AuctionId(1), "alice", "bob");

        match store.withdraw(AuctionId(1), "alice", "bob") {
            WithdrawOutcome::AlreadyWithdrew => {}
            _ => panic!("expected AlreadyWithdrew"),
        }
    }

    #[test]
    fn withdraw_rejects_wrong_seller_or_unstarted() {
        let store = SellerStore::new();
        let mut a = live_auction(1, &[("bob", true)]);
        a.started = false;
        store.insert(a);

        assert!(matches!(store.withdraw(AuctionId(1), "alice", "bob"), WithdrawOutcome::Rejected(_)));
    }

    #[test]
    fn finish_sets_winner_and_transaction_price_from_current_price() {
        let store = SellerStore::new();
        let mut a = live_auction(1, &[("bob", true)]);
        a.current_price = Cents(1500);
        store.insert(a);

        let outcome = store.finish(AuctionId(1)).unwrap();
        assert_eq!(outcome.snapshot.winner_username, "bob");
        assert_eq!(outcome.snapshot.transaction_price, Cents(1500));
    }

    #[test]
    fn finish_with_no_survivor_has_empty_winner_and_base_price() {
        let store = SellerStore::new();
        let mut a = live_auction(1, &[("bob", false), ("carol", false)]);
        a.current_price = Cents(1300);
        store.insert(a);

        let outcome = store.finish(AuctionId(1)).unwrap();
        assert_eq!(outcome.snapshot.winner_username, "");
        assert_eq!(outcome.snapshot.transaction_price, outcome.snapshot.base_price);
    }
}
