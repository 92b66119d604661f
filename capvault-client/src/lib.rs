//! capvault-client: capability broker and multi-server fan-out orchestration.
//!
//! Tokens are requested from every configured access-control (AC) server and
//! polled until each server's policy grants or denies them. The tokens then
//! authorize create/read calls replicated across every storage server, with
//! replica results reconciled under a fail-fast consistency rule.
//!
//! - [`connection`]: server connections, the transport seam and connection sets
//! - [`api`]: one typed call per AC or storage endpoint
//! - [`broker`]: request-and-poll for a single authorization
//! - [`aggregator`]: token collection across all AC servers
//! - [`fanout`]: replicated calls with identifier agreement
//! - [`orchestrator`]: verifier, permission, collection and secret workflows
//! - [`store`] / [`provisioning`]: config-store collaborator and account bootstrap

pub mod aggregator;
pub mod api;
pub mod broker;
pub mod connection;
pub mod constants;
pub mod dtos;
pub mod fanout;
pub mod orchestrator;
pub mod provisioning;
pub mod store;
#[cfg(test)]
mod testing;

pub use aggregator::{TokenSet, collect};
pub use broker::{AuthorizationOutcome, PollConfig, request_and_wait};
pub use connection::{
    ApiTransport, ClientIdentity, ConnectionSet, ServerConnection, ServerKind, TlsOptions,
};
pub use fanout::{FanoutConfig, broadcast, gather};
pub use orchestrator::CapabilityOrchestrator;
pub use store::{ConfigStore, MemoryConfigStore};

pub use capvault_core::{ClientError, ClientResult};
