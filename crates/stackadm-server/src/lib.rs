//! `stackadm` HTTP server.
//!
//! Wires the core services into an Axum router: the setup wizard at `/`,
//! maintenance pages for versions, backups, logs and identity-provider
//! users, and the session gate in front of them.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod views;

pub use routes::build_router;
