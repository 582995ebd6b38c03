//! The auction platform's data model. Every type here is plain data: no
//! locking, no I/O, so it can be freely cloned across the mutex boundaries
//! the concurrency model requires.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An integer amount of cents. A newtype rather than a bare `i64` so that
/// prices can never be silently added to counts, indices or round numbers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cents(pub i64);

impl Cents {
    pub const fn zero() -> Self {
        Cents(0)
    }

    /// Sentinel used for `transaction_price` before an auction finishes.
    pub const fn unset() -> Self {
        Cents(-1)
    }
}

impl std::ops::Add for Cents {
    type Output = Cents;
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl std::fmt::Display for Cents {
    /// Presentation-only formatting: dividing by 100 is a display concern,
    /// never part of the domain model's comparisons.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, (self.0 % 100).abs())
    }
}

/// Monotonically increasing auction id, assigned by the Platform starting
/// at 1. Ids are dense and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuctionId(pub u64);

impl std::fmt::Display for AuctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live-auction round counter. `-1` before the auction starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundId(pub i64);

impl RoundId {
    pub const fn not_started() -> Self {
        RoundId(-1)
    }

    pub fn next(self) -> RoundId {
        RoundId(self.0 + 1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub description: String,
}

/// The canonical, un-shielded auction record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub name: String,
    pub seller_username: String,
    pub item: Item,
    pub base_price: Cents,
    pub price_increment_period_ms: u64,
    pub increment: Cents,

    pub created: bool,
    pub started: bool,
    pub finished: bool,

    pub round_id: RoundId,
    pub current_price: Cents,

    /// username -> active. Entries are only ever inserted/removed pre-start;
    /// once `started`, only true->false transitions are allowed (invariant 5).
    pub buyers: BTreeMap<String, bool>,

    pub transaction_price: Cents,
    pub winner_username: String,
}

/// The set of fields omitted from an auction record shown to a
/// non-participant under the shielded-keys contract.
pub const SHIELDED_KEYS: [&str; 3] = ["buyers", "current_price", "round_id"];

/// An auction view with `buyers`, `current_price` and `round_id` removed.
/// A separate type (rather than an `Option`-ified `Auction`) so shielding
/// can never accidentally leak into a value that gets persisted or
/// re-shared as if it were the canonical record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShieldedAuction {
    pub id: AuctionId,
    pub name: String,
    pub seller_username: String,
    pub item: Item,
    pub base_price: Cents,
    pub price_increment_period_ms: u64,
    pub increment: Cents,
    pub created: bool,
    pub started: bool,
    pub finished: bool,
    pub transaction_price: Cents,
    pub winner_username: String,
}

/// What a `FETCH_AUCTIONS` reply carries per auction: either the full
/// record (requester is a participant) or the shielded view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuctionView {
    Full(Auction),
    Shielded(ShieldedAuction),
}

impl AuctionView {
    pub fn id(&self) -> AuctionId {
        match self {
            AuctionView::Full(a) => a.id,
            AuctionView::Shielded(a) => a.id,
        }
    }

    pub fn started(&self) -> bool {
        match self {
            AuctionView::Full(a) => a.started,
            AuctionView::Shielded(a) => a.started,
        }
    }

    pub fn finished(&self) -> bool {
        match self {
            AuctionView::Full(a) => a.finished,
            AuctionView::Shielded(a) => a.finished,
        }
    }
}

impl Auction {
    pub fn new(
        id: AuctionId,
        name: String,
        seller_username: String,
        item: Item,
        base_price: Cents,
        price_increment_period_ms: u64,
        increment: Cents,
    ) -> Self {
        Auction {
            id,
            name,
            seller_username,
            item,
            base_price,
            price_increment_period_ms,
            increment,
            created: true,
            started: false,
            finished: false,
            round_id: RoundId::not_started(),
            current_price: base_price,
            buyers: BTreeMap::new(),
            transaction_price: Cents::unset(),
            winner_username: String::new(),
        }
    }

    /// Fields that must be identical for `SELLER_CREATE_AUCTION` to be
    /// considered a duplicate of a prior creation.
    pub fn creation_fields_eq(&self, other: &Auction) -> bool {
        self.seller_username == other.seller_username
            && self.name == other.name
            && self.item == other.item
            && self.base_price == other.base_price
            && self.price_increment_period_ms == other.price_increment_period_ms
            && self.increment == other.increment
    }

    pub fn shielded(&self) -> ShieldedAuction {
        ShieldedAuction {
            id: self.id,
            name: self.name.clone(),
            seller_username: self.seller_username.clone(),
            item: self.item.clone(),
            base_price: self.base_price,
            price_increment_period_ms: self.price_increment_period_ms,
            increment: self.increment,
            created: self.created,
            started: self.started,
            finished: self.finished,
            transaction_price: self.transaction_price,
            winner_username: self.winner_username.clone(),
        }
    }

    /// The view a given requester should see: full record if they're a
    /// participant (buyer in `buyers`, or the seller themselves for
    /// `SELLER_FETCH_AUCTIONS`), shielded otherwise.
    pub fn view_for(&self, requester: &str, requester_is_seller_check: bool) -> AuctionView {
        let is_participant = if requester_is_seller_check {
            self.seller_username == requester
        } else {
            self.buyers.contains_key(requester)
        };

        if is_participant {
            AuctionView::Full(self.clone())
        } else {
            AuctionView::Shielded(self.shielded())
        }
    }

    pub fn is_active_buyer(&self, username: &str) -> bool {
        self.buyers.get(username).copied().unwrap_or(false)
    }

    pub fn n_active_buyers(&self) -> usize {
        self.buyers.values().filter(|active| **active).count()
    }

    /// The unique active buyer, if exactly one remains.
    pub fn sole_active_buyer(&self) -> Option<&str> {
        let mut it = self.buyers.iter().filter(|(_, active)| **active);
        match (it.next(), it.next()) {
            (Some((name, _)), None) => Some(name.as_str()),
            _ => None,
        }
    }

    /// An ordered snapshot suitable for an `announce_price`/`finish_auction`
    /// `buyer_status` payload.
    pub fn buyer_status_snapshot(&self) -> Vec<(String, bool)> {
        self.buyers
            .iter()
            .map(|(name, active)| (name.clone(), *active))
            .collect()
    }

    pub fn replace_buyer_status(&mut self, status: &[(String, bool)]) {
        self.buyers = status.iter().cloned().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Auction {
        let mut a = Auction::new(
            AuctionId(1),
            "lamp".into(),
            "alice".into(),
            Item { name: "Lamp".into(), description: "brass".into() },
            Cents(1000),
            1000,
            Cents(100),
        );
        a.buyers.insert("bob".into(), true);
        a.buyers.insert("carol".into(), true);
        a
    }

    #[test]
    fn shielding_drops_exactly_the_three_keys() {
        let a = sample();
        let view = a.view_for("dave", false);
        match view {
            AuctionView::Shielded(s) => {
                assert_eq!(s.id, a.id);
                assert_eq!(s.name, a.name);
                assert_eq!(s.winner_username, a.winner_username);
            }
            AuctionView::Full(_) => panic!("dave is not a participant"),
        }
    }

    #[test]
    fn participant_sees_full_record() {
        let a = sample();
        assert!(matches!(a.view_for("bob", false), AuctionView::Full(_)));
        assert!(matches!(a.view_for("alice", true), AuctionView::Full(_)));
        assert!(matches!(a.view_for("alice", false), AuctionView::Shielded(_)));
    }

    #[test]
    fn sole_active_buyer_detection() {
        let mut a = sample();
        assert_eq!(a.sole_active_buyer(), None);
        a.buyers.insert("bob".into(), false);
        assert_eq!(a.sole_active_buyer(), Some("carol"));
    }

    #[test]
    fn creation_duplicate_detection() {
        let a = sample();
        let mut b = sample();
        assert!(a.creation_fields_eq(&b));
        b.base_price = Cents(1001);
        assert!(!a.creation_fields_eq(&b));
    }
}
