//! Shared data model, wire envelope and cluster configuration used by every
//! process kind (Platform replica, seller, buyer). Deliberately has no
//! knowledge of networking or consensus — those live in `raft`/`platform`.

pub mod address_cache;
pub mod cluster;
pub mod command;
pub mod error;
pub mod live;
pub mod logging;
pub mod model;
pub mod platform_client;
pub mod reconcile;
pub mod wire;

pub use address_cache::AddressCache;
pub use cluster::{ClusterConfig, ReplicaInfo};
pub use command::{Command, PlatformResponse, Reply, ReplyPayload};
pub use error::{DomainError, TransportError};
pub use model::{Auction, AuctionId, AuctionView, Cents, Item, RoundId, ShieldedAuction};
pub use platform_client::PlatformClient;
