//! Typed wrappers for the AC and storage server endpoints.
//!
//! Each function performs one request against one connection and checks the
//! response shape; nothing here fans out or collects tokens.

pub mod accesscontrol;
pub mod storage;

pub use accesscontrol::{
    bootstrap_account, create_permission, create_verifier, fetch_permission, fetch_verifier,
};
pub use storage::{create_collection, create_secret, fetch_secret_data};
