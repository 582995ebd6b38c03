//! Seller's inbound RPC endpoint: `withdraw(auction_id, username) ->
//! (success, message)`, invoked by a buyer that wants to leave a live
//! auction.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use common::live::{WithdrawRequest, WithdrawResponse};
use common::wire;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};

use crate::driver::SellerRuntime;

pub async fn serve_withdraw(addr: SocketAddr, runtime: Arc<SellerRuntime>) -> std::io::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let runtime = runtime.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, runtime.clone()))) }
    });

    tracing::info!(%addr, "seller withdraw endpoint listening");
    let server = Server::bind(&addr).serve(make_svc);
    if let Err(e) = server.await {
        tracing::warn!(error = %e, "seller withdraw endpoint stopped");
    }
    Ok(())
}

async fn handle(req: Request<Body>, runtime: Arc<SellerRuntime>) -> Result<Response<Body>, Infallible> {
    if req.uri().path() != "/withdraw" {
        return Ok(Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()).unwrap());
    }

    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(_) => return Ok(bad_request()),
    };

    let request: WithdrawRequest = match wire::unmarshal(&body) {
        Ok(r) => r,
        Err(_) => return Ok(bad_request()),
    };

    let reply = runtime.withdraw_and_react(request.auction_id, &request.username).await;
    let response = WithdrawResponse { success: reply.success, message: reply.message };

    Ok(match wire::marshal(&response) {
        Ok(bytes) => Response::new(Body::from(bytes)),
        Err(_) => Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty()).unwrap(),
    })
}

fn bad_request() -> Response<Body> {
    Response::builder().status(StatusCode::BAD_REQUEST).body(Body::empty()).unwrap()
}
