//! Replicated calls across every connection of a set.
//!
//! Calls are issued in set order with up to `max_in_flight` outstanding, and
//! responses are consumed in that same order. The first failure or identifier
//! disagreement ends the fan-out: calls not yet issued never are, and calls
//! that already succeeded are not compensated.

use std::fmt;
use std::future::Future;

use capvault_core::config::Settings;
use capvault_core::{ClientError, ClientResult};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::connection::{ApiTransport, ConnectionSet};

#[derive(Clone, Debug)]
pub struct FanoutConfig {
    /// Maximum concurrent per-server calls. `1` runs strictly in sequence.
    pub max_in_flight: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self { max_in_flight: 8 }
    }
}

impl FanoutConfig {
    pub fn sequential() -> Self {
        Self { max_in_flight: 1 }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_in_flight: settings.max_in_flight,
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.max_in_flight.max(1)
    }
}

fn ensure_not_empty<T: ApiTransport>(set: &ConnectionSet<T>) -> ClientResult<()> {
    if set.is_empty() {
        return Err(ClientError::configuration(
            "fan-out requires at least one connection",
        ));
    }
    Ok(())
}

/// Run `operation` against every connection and require identical identifiers.
///
/// With `expected` set, every response must equal it. Otherwise the first
/// connection's response becomes the reference for the rest. Returns the
/// agreed identifier.
pub async fn broadcast<'a, T, I, F, Fut>(
    set: &'a ConnectionSet<T>,
    config: &FanoutConfig,
    expected: Option<I>,
    operation: F,
) -> ClientResult<I>
where
    T: ApiTransport,
    I: PartialEq + fmt::Display,
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = ClientResult<I>>,
{
    ensure_not_empty(set)?;

    let mut responses = stream::iter(set.iter())
        .map(|conn| {
            let call = operation(conn);
            async move { (conn.name(), call.await) }
        })
        .buffered(config.limit());

    let mut agreed = expected;
    while let Some((server, result)) = responses.next().await {
        let uid = result.inspect_err(|e| {
            warn!(server = server, error = %e, "Fan-out call failed, aborting");
        })?;

        if let Some(reference) = &agreed {
            if *reference != uid {
                warn!(
                    server = server,
                    expected = %reference,
                    actual = %uid,
                    "Replica returned a mismatched identifier, aborting"
                );
                return Err(ClientError::Consistency {
                    server: server.to_string(),
                    expected: reference.to_string(),
                    actual: uid.to_string(),
                });
            }
        } else {
            agreed = Some(uid);
        }
        debug!(server = server, "Fan-out call succeeded");
    }

    agreed.ok_or_else(|| ClientError::configuration("fan-out produced no responses"))
}

/// Run `operation` against every connection and return each server's result
/// in set order, without comparing them.
pub async fn gather<'a, T, R, F, Fut>(
    set: &'a ConnectionSet<T>,
    config: &FanoutConfig,
    operation: F,
) -> ClientResult<Vec<(String, R)>>
where
    T: ApiTransport,
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = ClientResult<R>>,
{
    ensure_not_empty(set)?;

    let mut responses = stream::iter(set.iter())
        .map(|conn| {
            let call = operation(conn);
            async move { (conn.name(), call.await) }
        })
        .buffered(config.limit());

    let mut results = Vec::with_capacity(set.len());
    while let Some((server, result)) = responses.next().await {
        let value = result.inspect_err(|e| {
            warn!(server = server, error = %e, "Fan-out read failed, aborting");
        })?;
        results.push((server.to_string(), value));
    }
    Ok(results)
}
