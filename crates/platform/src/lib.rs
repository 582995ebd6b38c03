//! The Platform replica: the Raft-backed replicated state machine. Binds
//! `raft::Node` (consensus) to `StateMachine` (the deterministic auction
//! model) through `Facade`, and exposes the client-facing RPC over
//! `server::serve_clients`.

pub mod facade;
pub mod server;
pub mod state_machine;

pub use facade::{Facade, FacadeResponse};
pub use state_machine::StateMachine;
