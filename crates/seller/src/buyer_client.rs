//! Outbound calls a seller makes to buyers: `announce_price` and
//! `finish_auction`. Same hand-rolled MessagePack-over-`reqwest` envelope
//! as `raft::rpc::PeerClient` and `common::platform_client`.

use std::time::Duration;

use common::live::{AnnouncePriceRequest, AnnouncePriceResponse, FinishAuctionRequest, FinishAuctionResponse};
use common::{wire, TransportError};

#[derive(Clone)]
pub struct BuyerClient {
    http: reqwest::Client,
}

impl BuyerClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a plain timeout");
        BuyerClient { http }
    }

    pub async fn announce_price(
        &self,
        buyer_addr: &str,
        req: &AnnouncePriceRequest,
    ) -> Result<AnnouncePriceResponse, TransportError> {
        self.post(buyer_addr, "/announce_price", req).await
    }

    pub async fn finish_auction(
        &self,
        buyer_addr: &str,
        req: &FinishAuctionRequest,
    ) -> Result<FinishAuctionResponse, TransportError> {
        self.post(buyer_addr, "/finish_auction", req).await
    }

    async fn post<Req, Resp>(&self, buyer_addr: &str, path: &str, req: &Req) -> Result<Resp, TransportError>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let body = wire::marshal(req)?;
        let url = format!("http://{buyer_addr}{path}");
        let resp = self.http.post(&url).body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;
        let bytes = resp.bytes().await.map_err(|e| TransportError::Connection(e.to_string()))?;
        wire::unmarshal(&bytes)
    }
}
