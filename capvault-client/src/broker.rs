//! Authorization broker: request a token from one AC server and poll until the
//! server's policy grants or denies it.

use std::time::Duration;

use capvault_core::config::Settings;
use capvault_core::{ClientError, ClientResult};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::{ApiTransport, get, post};
use crate::constants::EP_AUTHORIZATIONS;
use crate::dtos::{
    Authorization, AuthorizationRequest, AuthorizationStatus, AuthorizationsCreated, single,
};

/// Polling behavior while an authorization is pending.
#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Maximum time an authorization may remain pending.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(60),
        }
    }
}

impl PollConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.poll_interval(),
            timeout: settings.auth_timeout(),
        }
    }
}

/// Terminal state of an authorization that did not time out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Granted { authorization: Uuid, token: String },
    Denied { authorization: Uuid },
}

impl AuthorizationOutcome {
    pub fn token(&self) -> Option<&str> {
        match self {
            AuthorizationOutcome::Granted { token, .. } => Some(token),
            AuthorizationOutcome::Denied { .. } => None,
        }
    }

    /// The granted token, or `AuthorizationDenied` attributed to `server`.
    pub fn into_token(self, server: &str) -> ClientResult<String> {
        match self {
            AuthorizationOutcome::Granted { token, .. } => Ok(token),
            AuthorizationOutcome::Denied { authorization } => {
                Err(ClientError::AuthorizationDenied {
                    server: server.to_string(),
                    authorization,
                })
            }
        }
    }
}

/// Create an authorization record and return its UID.
pub async fn request_authorization<T: ApiTransport + ?Sized>(
    conn: &T,
    request: &AuthorizationRequest,
) -> ClientResult<Uuid> {
    let created: AuthorizationsCreated = post(conn, EP_AUTHORIZATIONS, request, &[]).await?;
    single(created.authorizations, conn.name(), EP_AUTHORIZATIONS)
}

pub async fn fetch_authorization<T: ApiTransport + ?Sized>(
    conn: &T,
    authorization: Uuid,
) -> ClientResult<Authorization> {
    let endpoint = format!("{}/{}", EP_AUTHORIZATIONS, authorization);
    get(conn, &endpoint, &[]).await
}

/// Request an authorization and wait for a terminal status.
///
/// The status is checked right after the request and then every
/// `poll.interval`. An authorization still pending once `poll.timeout` has
/// elapsed yields `AuthorizationTimedOut` and is not polled again. Transport
/// errors are returned as-is.
pub async fn request_and_wait<T: ApiTransport + ?Sized>(
    conn: &T,
    request: &AuthorizationRequest,
    poll: &PollConfig,
) -> ClientResult<AuthorizationOutcome> {
    let authorization = request_authorization(conn, request).await?;
    let started = Instant::now();

    info!(
        server = conn.name(),
        authorization = %authorization,
        objtype = %request.objtype,
        objperm = %request.objperm,
        "Authorization requested"
    );

    loop {
        let record = fetch_authorization(conn, authorization).await?;
        match record.status {
            AuthorizationStatus::Granted => {
                let token = record
                    .token
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| {
                        ClientError::invalid_response(
                            conn.name(),
                            format!("authorization {} granted without a token", authorization),
                        )
                    })?;
                info!(
                    server = conn.name(),
                    authorization = %authorization,
                    "Authorization granted"
                );
                return Ok(AuthorizationOutcome::Granted {
                    authorization,
                    token,
                });
            }
            AuthorizationStatus::Denied => {
                warn!(server = conn.name(), authorization = %authorization, "Authorization denied");
                return Ok(AuthorizationOutcome::Denied { authorization });
            }
            AuthorizationStatus::Pending => {
                let elapsed = started.elapsed();
                let remaining = poll.timeout.saturating_sub(elapsed);
                if remaining.is_zero() {
                    warn!(
                        server = conn.name(),
                        authorization = %authorization,
                        elapsed_ms = elapsed.as_millis(),
                        "Authorization timed out while pending"
                    );
                    return Err(ClientError::AuthorizationTimedOut {
                        server: conn.name().to_string(),
                        authorization,
                        elapsed_ms: elapsed.as_millis(),
                    });
                }
                debug!(
                    server = conn.name(),
                    authorization = %authorization,
                    "Authorization pending"
                );
                sleep(poll.interval.min(remaining)).await;
            }
        }
    }
}
