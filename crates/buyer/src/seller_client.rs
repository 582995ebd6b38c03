//! Outbound call a buyer makes to a seller for a buyer-initiated withdraw:
//! `withdraw(auction_id, username)`.

use std::time::Duration;

use common::live::{WithdrawRequest, WithdrawResponse};
use common::{wire, TransportError};

#[derive(Clone)]
pub struct SellerClient {
    http: reqwest::Client,
}

impl SellerClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a plain timeout");
        SellerClient { http }
    }

    pub async fn withdraw(&self, seller_addr: &str, req: &WithdrawRequest) -> Result<WithdrawResponse, TransportError> {
        let body = wire::marshal(req)?;
        let url = format!("http://{seller_addr}/withdraw");
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
