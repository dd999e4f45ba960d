//! courier - store-and-forward message relay over a compact binary protocol
//!
//! Clients register an identity and public key, discover other clients,
//! fetch their keys, deposit messages for a recipient, and later drain the
//! messages addressed to themselves. Each TCP connection carries exactly
//! one request/response exchange; no session state survives it.

pub mod cli;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod protocol;
pub mod response;
pub mod server;
pub mod store;

pub use cli::Cli;
pub use config::ServerConfig;
pub use connection::FrameDecoder;
pub use dispatch::{dispatch, Outcome};
pub use protocol::{ClientId, Request, RequestBody, RequestCode, Response, ResponseCode};
pub use server::Server;
pub use store::{ClientRecord, MessageStore, StoreError, StoredMessage};
