//! The Platform state machine's request/reply shapes.
//!
//! `Command` is a closed Rust enum rather than a dynamically dispatched
//! string tag: the wire string is only a forward-compatibility concern, not
//! the in-process dispatch mechanism, so the string form only exists at the
//! `raft` log-entry boundary (see `crate::wire`).

use serde::{Deserialize, Serialize};

use crate::model::{Auction, AuctionId, AuctionView, Cents, Item};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Command {
    Login {
        username: String,
        address: String,
    },
    GetUserAddress {
        username: String,
    },
    BuyerFetchAuctions {
        username: String,
    },
    SellerFetchAuctions {
        username: String,
    },
    BuyerJoinAuction {
        username: String,
        auction_id: AuctionId,
    },
    BuyerQuitAuction {
        username: String,
        auction_id: AuctionId,
    },
    SellerCreateAuction {
        seller: String,
        name: String,
        item: Item,
        base_price: Cents,
        price_increment_period_ms: u64,
        increment: Cents,
    },
    SellerStartAuction {
        seller: String,
        auction_id: AuctionId,
    },
    SellerFinishAuction {
        seller: String,
        auction: Auction,
    },
    SellerUpdateAuction {
        seller: String,
        auction: Auction,
    },
}

impl Command {
    /// The wire discriminator for this operation. Used only for logging
    /// and for tagging entries that cross the wire
    /// to older/newer binaries; in-process dispatch always matches on the
    /// enum itself.
    pub fn op_name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "LOGIN",
            Command::GetUserAddress { .. } => "GET_USER_ADDRESS",
            Command::BuyerFetchAuctions { .. } => "BUYER_FETCH_AUCTIONS",
            Command::SellerFetchAuctions { .. } => "SELLER_FETCH_AUCTIONS",
            Command::BuyerJoinAuction { .. } => "BUYER_JOIN_AUCTION",
            Command::BuyerQuitAuction { .. } => "BUYER_QUIT_AUCTION",
            Command::SellerCreateAuction { .. } => "SELLER_CREATE_AUCTION",
            Command::SellerStartAuction { .. } => "SELLER_START_AUCTION",
            Command::SellerFinishAuction { .. } => "SELLER_FINISH_AUCTION",
            Command::SellerUpdateAuction { .. } => "SELLER_UPDATE_AUCTION",
        }
    }
}

/// Typed reply payload. A bare `(success, message)` pair would force
/// callers to parse `message` as ad hoc structured text; this additive
/// field lets them match on real data instead.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum ReplyPayload {
    #[default]
    None,
    Address(String),
    Auctions(Vec<AuctionView>),
    Auction(Auction),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub payload: ReplyPayload,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Reply { success: true, message: message.into(), payload: ReplyPayload::None }
    }

    pub fn ok_with(message: impl Into<String>, payload: ReplyPayload) -> Self {
        Reply { success: true, message: message.into(), payload }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Reply { success: false, message: message.into(), payload: ReplyPayload::None }
    }
}

/// The wire shape of `platform_serve(request) -> response`: `is_leader =
/// false` carries no payload and means "try another replica".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformResponse {
    pub is_leader: bool,
    pub reply: Option<Reply>,
    /// Best-effort hint so a client can try the likely leader next instead
    /// of round-robining blindly.
    pub leader_hint: Option<u64>,
}
