//! capvault-core: Shared infrastructure for the capvault client crates.
pub mod config;
pub mod error;
pub mod observability;

pub use error::{ClientError, ClientResult};

pub use tracing;
pub use uuid;
