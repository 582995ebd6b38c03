//! Wire types for the live-auction protocol: the point-to-point RPCs seller
//! and buyer processes exchange directly, outside the consensus log. Shared
//! here so `crates/seller` and `crates/buyer` agree on one wire shape
//! without depending on each other.

use serde::{Deserialize, Serialize};

use crate::model::{AuctionId, Cents, RoundId};

/// An ordered sequence of `(username, active)` pairs.
pub type BuyerStatus = Vec<(String, bool)>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnouncePriceRequest {
    pub auction_id: AuctionId,
    pub round_id: RoundId,
    pub price: Cents,
    pub buyer_status: BuyerStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnouncePriceResponse {
    pub success: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinishAuctionRequest {
    pub auction_id: AuctionId,
    pub winner_username: String,
    pub price: Cents,
    pub buyer_status: BuyerStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinishAuctionResponse {
    pub success: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub auction_id: AuctionId,
    pub username: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub success: bool,
    pub message: String,
}
