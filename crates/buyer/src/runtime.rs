//! The buyer process's shared state.

use std::sync::Arc;

use common::live::WithdrawRequest;
use common::{AddressCache, AuctionId, PlatformClient, Reply};

use crate::seller_client::SellerClient;
use crate::store::BuyerStore;

pub struct BuyerRuntime {
    pub username: String,
    pub store: Arc<BuyerStore>,
    pub seller_client: SellerClient,
    pub addresses: Arc<AddressCache>,
    pub platform: Arc<PlatformClient>,
}

impl BuyerRuntime {
    /// Buyer-initiated withdraw: looks up the seller's stub in the address
    /// cache and forwards the seller's response unchanged.
    pub async fn withdraw(&self, auction_id: AuctionId) -> Reply {
        let Some(snapshot) = self.store.snapshot(auction_id) else {
            return Reply::err(common::DomainError::UnknownAuction(auction_id.0).to_string());
        };

        let Some(seller_addr) = self.addresses.resolve(&self.platform, &snapshot.seller_username).await else {
            return Reply::err(common::TransportError::Connection("seller address unknown".into()).to_string());
        };

        let request = WithdrawRequest { auction_id, username: self.username.clone() };
        match self.seller_client.withdraw(&seller_addr, &request).await {
            Ok(resp) => Reply { success: resp.success, message: resp.message, payload: Default::default() },
            Err(e) => Reply::err(e.to_string()),
        }
    }
}
