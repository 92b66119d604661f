//! Token aggregation across every AC server of a connection set.

use std::collections::BTreeMap;

use capvault_core::{ClientError, ClientResult};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::broker::{PollConfig, request_and_wait};
use crate::connection::{ApiTransport, ConnectionSet};
use crate::dtos::AuthorizationRequest;
use crate::fanout::FanoutConfig;

/// Per-server results of one token collection round.
///
/// Both maps may be non-empty at once; deciding whether partial success is
/// acceptable is left to the caller.
#[derive(Debug, Default)]
pub struct TokenSet {
    pub tokens: BTreeMap<String, String>,
    pub errors: BTreeMap<String, ClientError>,
}

impl TokenSet {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Granted tokens ordered by server name, or `NoValidTokens` when no
    /// server granted one.
    pub fn require_tokens(&self, request: &AuthorizationRequest) -> ClientResult<Vec<String>> {
        if self.tokens.is_empty() {
            return Err(ClientError::NoValidTokens {
                objtype: request.objtype.clone(),
                objperm: request.objperm.clone(),
                failures: self.errors.len(),
            });
        }
        Ok(self.tokens.values().cloned().collect())
    }
}

/// Run the broker once against every connection in `ac`.
///
/// Each server's request is independent: a denial, timeout or transport error
/// on one server lands in [`TokenSet::errors`] and never cuts short the polls
/// running against the others. No implicit caching: every call issues fresh
/// authorization requests.
pub async fn collect<T: ApiTransport>(
    ac: &ConnectionSet<T>,
    request: &AuthorizationRequest,
    poll: &PollConfig,
    fanout: &FanoutConfig,
) -> TokenSet {
    let mut outcomes = stream::iter(ac.iter())
        .map(|conn| async move {
            let result = request_and_wait(conn, request, poll)
                .await
                .and_then(|outcome| outcome.into_token(conn.name()));
            (conn.name().to_string(), result)
        })
        .buffer_unordered(fanout.limit());

    let mut token_set = TokenSet::default();
    while let Some((server, result)) = outcomes.next().await {
        match result {
            Ok(token) => {
                token_set.tokens.insert(server, token);
            }
            Err(err) => {
                warn!(
                    server = %server,
                    objtype = %request.objtype,
                    objperm = %request.objperm,
                    error = %err,
                    "No token from AC server"
                );
                token_set.errors.insert(server, err);
            }
        }
    }

    info!(
        objtype = %request.objtype,
        objperm = %request.objperm,
        granted = token_set.tokens.len(),
        failed = token_set.errors.len(),
        "Token collection finished"
    );
    token_set
}
