//! Multi-step workflows over an AC connection set and a storage connection set.
//!
//! Every step collects fresh tokens from the AC servers before issuing its
//! fan-out, and every step is fail-fast: a failure part-way through leaves
//! already-created objects in place on the servers that accepted them.

use std::collections::{BTreeMap, BTreeSet};

use capvault_core::config::Settings;
use capvault_core::{ClientError, ClientResult};
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::collect;
use crate::api;
use crate::broker::PollConfig;
use crate::connection::{ApiTransport, ConnectionSet, ServerConnection};
use crate::constants::{
    ACTION_DEFAULT, PERM_CREATE, PERM_READ, TYPE_COL, TYPE_SRV_AC, TYPE_SRV_STORAGE,
};
use crate::dtos::{
    AuthorizationRequest, CollectionCreateRequest, PermissionCreateRequest, PermissionKey,
    SecretCreateRequest, SecretVersion, UserData, VerifierCreateRequest,
};
use crate::fanout::{FanoutConfig, broadcast, gather};

pub struct CapabilityOrchestrator<'a, T = ServerConnection> {
    ac: &'a ConnectionSet<T>,
    storage: &'a ConnectionSet<T>,
    /// Account the caller acts as; default member of new verifiers.
    account_uid: Uuid,
    poll: PollConfig,
    fanout: FanoutConfig,
}

impl<'a, T: ApiTransport> CapabilityOrchestrator<'a, T> {
    pub fn new(ac: &'a ConnectionSet<T>, storage: &'a ConnectionSet<T>, account_uid: Uuid) -> Self {
        Self {
            ac,
            storage,
            account_uid,
            poll: PollConfig::default(),
            fanout: FanoutConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_fanout_config(mut self, fanout: FanoutConfig) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_settings(self, settings: &Settings) -> Self {
        self.with_poll_config(PollConfig::from_settings(settings))
            .with_fanout_config(FanoutConfig::from_settings(settings))
    }

    async fn tokens_for(
        &self,
        objtype: &str,
        objperm: &str,
        objuid: Option<Uuid>,
    ) -> ClientResult<Vec<String>> {
        let request = AuthorizationRequest::new(objtype, objperm, objuid)?;
        collect(self.ac, &request, &self.poll, &self.fanout)
            .await
            .require_tokens(&request)
    }

    /// Create the same verifier on every AC server.
    ///
    /// `accounts` defaults to the caller's own account and `authenticators`
    /// to none.
    pub async fn setup_verifier(
        &self,
        verifier_uid: Option<Uuid>,
        accounts: Option<BTreeSet<Uuid>>,
        authenticators: Option<BTreeSet<Uuid>>,
    ) -> ClientResult<Uuid> {
        let uid = verifier_uid.unwrap_or_else(Uuid::new_v4);
        let request = VerifierCreateRequest {
            uid: Some(uid),
            accounts: accounts.unwrap_or_else(|| BTreeSet::from([self.account_uid])),
            authenticators: authenticators.unwrap_or_default(),
            userdata: UserData::new(),
        };

        let tokens = self.tokens_for(TYPE_SRV_AC, PERM_CREATE, None).await?;
        let uid = broadcast(self.ac, &self.fanout, Some(uid), |conn| {
            api::create_verifier(conn, &tokens, &request)
        })
        .await?;

        info!(verifier = %uid, servers = self.ac.len(), "Verifier set up");
        Ok(uid)
    }

    /// Create a permission on every AC server naming `verifiers` as its
    /// default grantors. A fresh verifier is set up when none are given.
    /// Returns the verifiers used.
    pub async fn setup_permissions(
        &self,
        objtype: &str,
        objuid: Option<Uuid>,
        verifiers: Option<Vec<Uuid>>,
    ) -> ClientResult<Vec<Uuid>> {
        let verifiers = match verifiers {
            Some(verifiers) if !verifiers.is_empty() => verifiers,
            _ => vec![self.setup_verifier(None, None, None).await?],
        };

        let key = PermissionKey::new(objtype, objuid);
        let request = PermissionCreateRequest {
            key: key.clone(),
            verifiers: BTreeMap::from([(ACTION_DEFAULT.to_string(), verifiers.clone())]),
        };

        let tokens = self.tokens_for(TYPE_SRV_AC, PERM_CREATE, None).await?;
        broadcast(self.ac, &self.fanout, Some(key.clone()), |conn| {
            api::create_permission(conn, &tokens, &request)
        })
        .await?;

        info!(permission = %key, verifiers = verifiers.len(), "Permissions set up");
        Ok(verifiers)
    }

    /// Create a collection on every storage server, guarded by a fresh
    /// permission on every AC server. Returns the collection UID and the
    /// verifiers allowed to grant access to it.
    pub async fn setup_collection(&self, col_uid: Option<Uuid>) -> ClientResult<(Uuid, Vec<Uuid>)> {
        let col_uid = col_uid.unwrap_or_else(Uuid::new_v4);
        let verifiers = self.setup_permissions(TYPE_COL, Some(col_uid), None).await?;

        let request = CollectionCreateRequest {
            uid: Some(col_uid),
            ac_servers: self.ac.server_urls(),
            verifiers: verifiers.clone(),
            userdata: UserData::new(),
        };

        let tokens = self.tokens_for(TYPE_SRV_STORAGE, PERM_CREATE, None).await?;
        let col_uid = broadcast(self.storage, &self.fanout, Some(col_uid), |conn| {
            api::create_collection(conn, &tokens, &request)
        })
        .await?;

        info!(collection = %col_uid, servers = self.storage.len(), "Collection set up");
        Ok((col_uid, verifiers))
    }

    /// Store `data` as a secret on every storage server, creating a
    /// collection first when `col_uid` is `None`.
    ///
    /// The secret UID is chosen here when not supplied so every replica is
    /// asked to store the same identifier.
    pub async fn store_secret(
        &self,
        data: &str,
        col_uid: Option<Uuid>,
        sec_uid: Option<Uuid>,
    ) -> ClientResult<(Uuid, Uuid)> {
        let col_uid = match col_uid {
            Some(uid) => uid,
            None => self.setup_collection(None).await?.0,
        };
        let sec_uid = sec_uid.unwrap_or_else(Uuid::new_v4);
        let request = SecretCreateRequest {
            uid: Some(sec_uid),
            data: data.to_string(),
            userdata: UserData::new(),
        };

        let tokens = self.tokens_for(TYPE_COL, PERM_CREATE, Some(col_uid)).await?;
        let sec_uid = broadcast(self.storage, &self.fanout, Some(sec_uid), |conn| {
            api::create_secret(conn, &tokens, col_uid, &request)
        })
        .await?;

        info!(collection = %col_uid, secret = %sec_uid, "Secret stored");
        Ok((col_uid, sec_uid))
    }

    /// Read the latest version of a secret from every storage server.
    pub async fn fetch_secret(&self, col_uid: Uuid, sec_uid: Uuid) -> ClientResult<String> {
        self.fetch_secret_version(col_uid, sec_uid, SecretVersion::Latest)
            .await
    }

    /// Read one version of a secret from every storage server.
    ///
    /// Replica values are not reconciled: the last server in set order wins
    /// and any divergence is only logged.
    pub async fn fetch_secret_version(
        &self,
        col_uid: Uuid,
        sec_uid: Uuid,
        version: SecretVersion,
    ) -> ClientResult<String> {
        let tokens = self.tokens_for(TYPE_COL, PERM_READ, Some(col_uid)).await?;
        let mut replicas = gather(self.storage, &self.fanout, |conn| {
            api::fetch_secret_data(conn, &tokens, col_uid, sec_uid, version)
        })
        .await?;

        if let Some((_, first)) = replicas.first()
            && replicas.iter().any(|(_, data)| data != first)
        {
            warn!(
                collection = %col_uid,
                secret = %sec_uid,
                servers = ?replicas.iter().map(|(server, _)| server.as_str()).collect::<Vec<_>>(),
                "Storage replicas returned diverging secret data"
            );
        }

        replicas
            .pop()
            .map(|(_, data)| data)
            .ok_or_else(|| ClientError::configuration("no storage servers configured"))
    }
}
