//! Buyer's inbound RPC endpoints: `announce_price` and `finish_auction`,
//! both driven by the seller.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use common::live::{AnnouncePriceRequest, AnnouncePriceResponse, FinishAuctionRequest, FinishAuctionResponse};
use common::wire;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};

use crate::store::BuyerStore;

pub async fn serve(addr: SocketAddr, store: Arc<BuyerStore>) -> std::io::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let store = store.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, store.clone()))) }
    });

    tracing::info!(%addr, "buyer RPC endpoints listening");
    let server = Server::bind(&addr).serve(make_svc);
    if let Err(e) = server.await {
        tracing::warn!(error = %e, "buyer RPC endpoints stopped");
    }
    Ok(())
}

async fn handle(req: Request<Body>, store: Arc<BuyerStore>) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_owned();
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(_) => return Ok(bad_request()),
    };

    let response = match path.as_str() {
        "/announce_price" => match wire::unmarshal::<AnnouncePriceRequest>(&body) {
            Ok(r) => {
                let success = store.apply_announce(r.auction_id, r.round_id, r.price, &r.buyer_status);
                encode(&AnnouncePriceResponse { success })
            }
            Err(_) => bad_request(),
        },
        "/finish_auction" => match wire::unmarshal::<FinishAuctionRequest>(&body) {
            Ok(r) => {
                let success = store.apply_finish(r.auction_id, &r.winner_username, r.price, &r.buyer_status);
                encode(&FinishAuctionResponse { success })
            }
            Err(_) => bad_request(),
        },
        _ => Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()).unwrap(),
    };

    Ok(response)
}

fn encode<T: serde::Serialize>(value: &T) -> Response<Body> {
    match wire::marshal(value) {
        Ok(bytes) => Response::new(Body::from(bytes)),
        Err(_) => Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty()).unwrap(),
    }
}

fn bad_request() -> Response<Body> {
    Response::builder().status(StatusCode::BAD_REQUEST).body(Body::empty()).unwrap()
}
