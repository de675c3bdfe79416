//! # Laptop catalog
//!
//! A gRPC laptop catalog with token-based authentication and role-based
//! access control.
//!
//! Callers exchange a username/password pair for a signed bearer token
//! ([`auth::TokenManager`]) and present it on every call. A tower middleware
//! ([`auth::AuthInterceptor`]) checks the token's role against a per-method
//! access table before the call reaches a handler.
//!
//! The catalog itself keeps three in-memory stores:
//! - [`store::LaptopStore`]: laptops keyed by UUID, with cancellable filtered search
//! - [`store::ImageStore`]: chunked image uploads persisted atomically to disk
//! - [`store::RatingStore`]: per-laptop rating aggregates
//!
//! ## Quick Start
//!
//! ```no_run
//! use laptop_catalog::server::{CatalogServer, ServerConfig};
//!
//! # async fn run() -> laptop_catalog::Result<()> {
//! let config = ServerConfig::default();
//! let listener = tokio::net::TcpListener::bind(config.addr().map_err(|e| {
//!     laptop_catalog::Error::InvalidArgument(e.to_string())
//! })?)
//! .await?;
//!
//! CatalogServer::from_config(config)?
//!     .serve(listener, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Tokens, identities and access control.
pub mod auth;

/// Client-side helpers for calling the catalog.
pub mod client;

/// Error types.
pub mod error;

/// Search filter matching.
pub mod filter;

/// Random sample laptops.
pub mod sample;

/// Binary and JSON encodings of catalog messages.
pub mod serializer;

/// gRPC server.
pub mod server;

/// In-memory catalog stores.
pub mod store;

/// Generated protobuf and gRPC types.
#[allow(missing_docs)]
pub mod proto {
    tonic::include_proto!("catalog");
}

pub use error::{Error, Result};
