// Shared building blocks of the firefly panel:
// - Configuration document store (YAML on disk)
// - Reference credentials providers
// - Shared error types

// Export config module - Configuration document store
pub mod config;
pub use config::*;

// Export credentials module - Reference credentials providers
pub mod credentials;
pub use credentials::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;
