//! The Platform state machine: a deterministic function from (state,
//! committed command) to (new state, reply). A single mutex serialises
//! application in `crate::facade::Facade` — this module itself holds no
//! lock, the same separation of pure state transition from the
//! concurrency around it that `crates/raft::consensus` uses.

use std::collections::HashMap;

use common::command::{Command, Reply, ReplyPayload};
use common::error::DomainError;
use common::model::{Auction, AuctionId, AuctionView, Cents, RoundId};

#[derive(Default)]
pub struct StateMachine {
    users: HashMap<String, String>,
    /// 1-indexed: `auctions[0]` is auction id 1. Ids are dense, 1..N, and
    /// never reused.
    auctions: Vec<Auction>,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine::default()
    }

    pub fn users(&self) -> &HashMap<String, String> {
        &self.users
    }

    pub fn auctions(&self) -> &[Auction] {
        &self.auctions
    }

    fn auction_mut(&mut self, id: AuctionId) -> Option<&mut Auction> {
        self.auctions.get_mut((id.0 as usize).checked_sub(1)?)
    }

    fn auction(&self, id: AuctionId) -> Option<&Auction> {
        self.auctions.get((id.0 as usize).checked_sub(1)?)
    }

    /// The single dispatch point: a tagged variant dispatched by one table,
    /// not a dynamic string match.
    pub fn apply(&mut self, command: Command) -> Reply {
        match command {
            Command::Login { username, address } => self.login(username, address),
            Command::GetUserAddress { username } => self.get_user_address(&username),
            Command::BuyerFetchAuctions { username } => self.fetch_auctions(&username, false),
            Command::SellerFetchAuctions { username } => self.fetch_auctions(&username, true),
            Command::BuyerJoinAuction { username, auction_id } => self.buyer_join(&username, auction_id),
            Command::BuyerQuitAuction { username, auction_id } => self.buyer_quit(&username, auction_id),
            Command::SellerCreateAuction {
                seller,
                name,
                item,
                base_price,
                price_increment_period_ms,
                increment,
            } => self.create_auction(seller, name, item, base_price, price_increment_period_ms, increment),
            Command::SellerStartAuction { seller, auction_id } => self.start_auction(&seller, auction_id),
            Command::SellerFinishAuction { seller, auction } => self.finish_auction(&seller, auction),
            Command::SellerUpdateAuction { seller, auction } => self.update_auction(&seller, auction),
        }
    }

    fn login(&mut self, username: String, address: String) -> Reply {
        self.users.insert(username, address);
        Reply::ok("logged in")
    }

    fn get_user_address(&self, username: &str) -> Reply {
        match self.users.get(username) {
            Some(addr) => Reply::ok_with(addr.clone(), ReplyPayload::Address(addr.clone())),
            None => Reply::err(DomainError::UnknownUser(username.to_string()).to_string()),
        }
    }

    /// The shielded-keys contract: for each auction, if the requester is a
    /// participant (buyer in `buyers`, or the seller for
    /// `SellerFetchAuctions`) return the full record, else the shielded
    /// view omitting `buyers`, `current_price`, `round_id`.
    fn fetch_auctions(&self, username: &str, is_seller_view: bool) -> Reply {
        if !self.users.contains_key(username) {
            return Reply::err(DomainError::UnknownUser(username.to_string()).to_string());
        }
        let views: Vec<AuctionView> = self
            .auctions
            .iter()
            .map(|a| a.view_for(username, is_seller_view))
            .collect();
        Reply::ok_with("ok", ReplyPayload::Auctions(views))
    }

    fn buyer_join(&mut self, username: &str, auction_id: AuctionId) -> Reply {
        if !self.users.contains_key(username) {
            return Reply::err(DomainError::UnknownUser(username.to_string()).to_string());
        }
        let Some(auction) = self.auction_mut(auction_id) else {
            return Reply::err(DomainError::UnknownAuction(auction_id.0).to_string());
        };
        if auction.started || auction.finished {
            return Reply::err(DomainError::BadLifecycle("auction has already started".into()).to_string());
        }
        auction.buyers.entry(username.to_string()).or_insert(true);
        Reply::ok("joined")
    }

    fn buyer_quit(&mut self, username: &str, auction_id: AuctionId) -> Reply {
        let Some(auction) = self.auction_mut(auction_id) else {
            return Reply::err(DomainError::UnknownAuction(auction_id.0).to_string());
        };
        if auction.started || auction.finished {
            return Reply::err(DomainError::BadLifecycle("auction has already started".into()).to_string());
        }
        if auction.buyers.remove(username).is_none() {
            return Reply::err(DomainError::BadLifecycle(format!("{username} is not a participant")).to_string());
        }
        Reply::ok("quit")
    }

    fn create_auction(
        &mut self,
        seller: String,
        name: String,
        item: common::model::Item,
        base_price: Cents,
        price_increment_period_ms: u64,
        increment: Cents,
    ) -> Reply {
        if !self.users.contains_key(&seller) {
            return Reply::err(DomainError::UnknownUser(seller.clone()).to_string());
        }

        let candidate = Auction::new(
            AuctionId((self.auctions.len() + 1) as u64),
            name,
            seller,
            item,
            base_price,
            price_increment_period_ms,
            increment,
        );

        if self.auctions.iter().any(|a| a.creation_fields_eq(&candidate)) {
            return Reply::err(DomainError::DuplicateAuction.to_string());
        }

        self.auctions.push(candidate.clone());
        Reply::ok_with(format!("created auction {}", candidate.id), ReplyPayload::Auction(candidate))
    }

    fn start_auction(&mut self, seller: &str, auction_id: AuctionId) -> Reply {
        let Some(auction) = self.auction_mut(auction_id) else {
            return Reply::err(DomainError::UnknownAuction(auction_id.0).to_string());
        };
        if auction.seller_username != seller {
            return Reply::err(DomainError::BadLifecycle("only the seller can start this auction".into()).to_string());
        }
        if auction.finished {
            return Reply::err(DomainError::BadLifecycle("auction has already finished".into()).to_string());
        }
        if !auction.started {
            auction.started = true;
            auction.round_id = RoundId(0);
        }
        Reply::ok_with("started", ReplyPayload::Auction(auction.clone()))
    }

    /// Seller reports terminal state wholesale (`SELLER_FINISH_AUCTION`):
    /// the seller owns live-auction fields while `started ∧ ¬finished`, so
    /// the Platform's copy is stale and this is the point where it gets
    /// resynced.
    fn finish_auction(&mut self, seller: &str, incoming: Auction) -> Reply {
        let Some(auction) = self.auction_mut(incoming.id) else {
            return Reply::err(DomainError::UnknownAuction(incoming.id.0).to_string());
        };
        if auction.seller_username != seller {
            return Reply::err(DomainError::BadLifecycle("only the seller can finish this auction".into()).to_string());
        }
        if auction.finished {
            return Reply::ok_with("already finished", ReplyPayload::Auction(auction.clone()));
        }
        *auction = incoming;
        auction.finished = true;
        Reply::ok_with("finished", ReplyPayload::Auction(auction.clone()))
    }

    fn update_auction(&mut self, seller: &str, incoming: Auction) -> Reply {
        let Some(auction) = self.auction_mut(incoming.id) else {
            return Reply::err(DomainError::UnknownAuction(incoming.id.0).to_string());
        };
        if auction.seller_username != seller {
            return Reply::err(DomainError::BadLifecycle("only the seller can update this auction".into()).to_string());
        }
        *auction = incoming;
        Reply::ok_with("updated", ReplyPayload::Auction(auction.clone()))
    }
}
