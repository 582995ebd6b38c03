//! The buyer's local auction mirror, behind its own mutex. Holds one
//! `Auction` per auction this buyer knows about, mutated by
//! `announce_price`/`finish_auction` handlers and by the reconciliation
//! loop's merge rule.

use std::collections::HashMap;
use std::sync::Mutex;

use common::live::BuyerStatus;
use common::{Auction, AuctionId, Cents, RoundId};

pub struct BuyerStore {
    auctions: Mutex<HashMap<AuctionId, Auction>>,
}

impl BuyerStore {
    pub fn new() -> Self {
        BuyerStore { auctions: Mutex::new(HashMap::new()) }
    }

    pub fn snapshot(&self, id: AuctionId) -> Option<Auction> {
        self.auctions.lock().unwrap().get(&id).cloned()
    }

    pub fn contains(&self, id: AuctionId) -> bool {
        self.auctions.lock().unwrap().contains_key(&id)
    }

    pub fn replace(&self, auction: Auction) -> Option<Auction> {
        self.auctions.lock().unwrap().insert(auction.id, auction)
    }

    /// The buyer's `announce_price` handler: idempotent, out-of-order
    /// tolerant. Returns `true` if the incoming announce was applied,
    /// `false` if it was ignored (unknown auction, or stale `round_id`).
    pub fn apply_announce(&self, id: AuctionId, round_id: RoundId, price: Cents, buyer_status: &BuyerStatus) -> bool {
        let mut guard = self.auctions.lock().unwrap();
        let Some(auction) = guard.get_mut(&id) else { return false };

        if round_id.0 < auction.round_id.0 {
            return false;
        }

        auction.round_id = round_id;
        if round_id.0 > -1 {
            auction.started = true;
        }
        auction.current_price = price;
        auction.replace_buyer_status(buyer_status);
        true
    }

    /// The buyer's `finish_auction` handler.
    pub fn apply_finish(&self, id: AuctionId, winner: &str, price: Cents, buyer_status: &BuyerStatus) -> bool {
        let mut guard = self.auctions.lock().unwrap();
        let Some(auction) = guard.get_mut(&id) else { return false };

        auction.finished = true;
        auction.winner_username = winner.to_string();
        auction.transaction_price = price;
        auction.replace_buyer_status(buyer_status);
        true
    }
}

impl Default for BuyerStore {
    fn default() -> Self {
        BuyerStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Item;

    fn unstarted(id: u64) -> Auction {
        Auction::new(
            AuctionId(id),
            "lamp".into(),
            "alice".into(),
            Item { name: "Lamp".into(), description: "brass".into() },
            Cents(1000),
            1000,
            Cents(100),
        )
    }

    #[test]
    fn out_of_order_announces_keep_the_highest_round_id() {
        let store = BuyerStore::new();
        store.replace(unstarted(1));

        let status: BuyerStatus = vec![("bob".into(), true)];
        assert!(store.apply_announce(AuctionId(1), RoundId(3), Cents(1300), &status));
        assert!(store.apply_announce(AuctionId(1), RoundId(5), Cents(1500), &status));
        assert!(!store.apply_announce(AuctionId(1), RoundId(4), Cents(1400), &status));
        assert!(store.apply_announce(AuctionId(1), RoundId(6), Cents(1600), &status));

        let snap = store.snapshot(AuctionId(1)).unwrap();
        assert_eq!(snap.round_id, RoundId(6));
        assert_eq!(snap.current_price, Cents(1600));
    }

    #[test]
    fn announce_for_unknown_auction_is_ignored() {
        let store = BuyerStore::new();
        let status: BuyerStatus = vec![];
        assert!(!store.apply_announce(AuctionId(99), RoundId(0), Cents(1000), &status));
    }

    #[test]
    fn finish_sets_terminal_fields_and_buyer_status() {
        let store = BuyerStore::new();
        store.replace(unstarted(1));
        let status: BuyerStatus = vec![("bob".into(), false), ("carol".into(), true)];

        assert!(store.apply_finish(AuctionId(1), "carol", Cents(1500), &status));
        let snap = store.snapshot(AuctionId(1)).unwrap();
        assert!(snap.finished);
        assert_eq!(snap.winner_username, "carol");
        assert_eq!(snap.transaction_price, Cents(1500));
        assert!(!snap.is_active_buyer("bob"));
        assert!(snap.is_active_buyer("carol"));
    }
}
