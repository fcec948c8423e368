//! Administrative dashboard for the firefly bot deployment helper.
//!
//! The binary in `src/bin/firefly-panel.rs` wires an [`http_server::AppState`]
//! and serves [`http_server::router`].

pub mod activity_log;
pub mod api;
pub mod auth;
pub mod bot;
pub mod config;
pub mod http_server;
pub mod session;
pub mod system;
