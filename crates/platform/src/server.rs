//! Client-facing RPC: a single `POST /` endpoint accepting a wire-encoded
//! `Command` and replying with a wire-encoded `PlatformResponse`. Mirrors
//! `raft::rpc::serve_peer`'s hyper plumbing but speaks `Command` instead of
//! the raft peer protocol.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use common::command::PlatformResponse;
use common::wire;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};

use crate::facade::Facade;

pub async fn serve_clients(addr: SocketAddr, facade: Arc<Facade>) -> std::io::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let facade = facade.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, facade.clone()))) }
    });

    tracing::info!(%addr, "platform client RPC server listening");
    let server = Server::bind(&addr).serve(make_svc);
    if let Err(e) = server.await {
        tracing::warn!(error = %e, "platform client RPC server stopped");
    }
    Ok(())
}

async fn handle(req: Request<Body>, facade: Arc<Facade>) -> Result<Response<Body>, Infallible> {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(_) => return Ok(bad_request()),
    };

    let command = match wire::unmarshal(&body) {
        Ok(c) => c,
        Err(_) => return Ok(bad_request()),
    };

    let resp = facade.serve(command).await;
    let wire_resp = PlatformResponse {
        is_leader: resp.is_leader,
        reply: resp.reply,
        leader_hint: resp.leader_hint,
    };

    Ok(match wire::marshal(&wire_resp) {
        Ok(bytes) => Response::new(Body::from(bytes)),
        Err(_) => Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty()).unwrap(),
    })
}

fn bad_request() -> Response<Body> {
    Response::builder().status(StatusCode::BAD_REQUEST).body(Body::empty()).unwrap()
}
