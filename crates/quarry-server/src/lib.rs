//! HTTP object-store server for Quarry.
//!
//! Serves a filesystem mirror over the protocol in
//! [`quarry_remote::protocol`], so `http(s)://` remotes have a first-party
//! counterpart. Uploads are verified against their key and finalized
//! atomically; there is no delete.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::BearerAuth;
pub use config::{ServerConfig, DEFAULT_BIND, DEFAULT_MAX_OBJECT_SIZE};
pub use error::{ServerError, ServerResult};
pub use server::QuarryServer;
