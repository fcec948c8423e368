//! Session management for the panel
//!
//! This module keeps the login state of browser clients between requests. It
//! defines a `SessionStore` trait that can be implemented by different storage
//! backends; the server is handed one instance at startup.

pub mod adapters;
pub mod store;

pub use adapters::InMemorySessionStore;
pub use store::{Session, SessionStore, SessionStoreError, SessionStoreRef};
