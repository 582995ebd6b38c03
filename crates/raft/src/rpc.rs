//! Peer-facing consensus RPC transport. A hand-rolled envelope over `hyper`
//! (server) and `reqwest` (client) carrying MessagePack bodies, using the
//! same `marshal`/`unmarshal` wire-envelope convention from `common::wire`
//! that every RPC layer in this workspace shares — no `tonic`/protobuf
//! code generation.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{wire, TransportError};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};

use crate::types::{AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse};

/// Thin reqwest wrapper for the two peer RPCs. One instance is shared by a
/// `Node` across all peers; `reqwest::Client` internally pools connections
/// per destination so there's no need for a client-per-peer.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a plain timeout");
        PeerClient { http }
    }

    pub async fn append_entries(
        &self,
        peer_addr: &str,
        req: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        self.post(peer_addr, "/raft/append_entries", req).await
    }

    pub async fn request_vote(
        &self,
        peer_addr: &str,
        req: &RequestVoteRequest,
    ) -> Result<RequestVoteResponse, TransportError> {
        self.post(peer_addr, "/raft/request_vote", req).await
    }

    async fn post<Req, Resp>(&self, peer_addr: &str, path: &str, req: &Req) -> Result<Resp, TransportError>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let body = wire::marshal(req)?;
        let url = format!("http://{peer_addr}{path}");
        let resp = self
            .http
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        wire::unmarshal(&bytes)
    }
}

/// Callbacks the peer-facing server invokes on an inbound RPC. Implemented
/// by `crate::node::Node` so `rpc.rs` stays free of any locking/consensus
/// knowledge beyond "decode, dispatch, encode".
#[async_trait::async_trait]
pub trait PeerService: Send + Sync + 'static {
    async fn on_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse;
    async fn on_request_vote(&self, req: RequestVoteRequest) -> RequestVoteResponse;
}

pub async fn serve_peer<S: PeerService>(addr: SocketAddr, service: Arc<S>) -> std::io::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let service = service.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, service.clone()))) }
    });

    tracing::info!(%addr, "raft peer RPC server listening");
    let server = Server::bind(&addr).serve(make_svc);
    if let Err(e) = server.await {
        tracing::warn!(error = %e, "raft peer RPC server stopped");
    }
    Ok(())
}

async fn handle<S: PeerService>(req: Request<Body>, service: Arc<S>) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_owned();
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(_) => return Ok(bad_request()),
    };

    let response = match path.as_str() {
        "/raft/append_entries" => match wire::unmarshal::<AppendEntriesRequest>(&body) {
            Ok(r) => encode(&service.on_append_entries(r).await),
            Err(_) => bad_request(),
        },
        "/raft/request_vote" => match wire::unmarshal::<RequestVoteRequest>(&body) {
            Ok(r) => encode(&service.on_request_vote(r).await),
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
