//! Config-store collaborator: server URLs, default identifiers and per-client
//! credential material.
//!
//! Persistence is left to the implementor; [`MemoryConfigStore`] keeps
//! everything in process.

use std::collections::HashMap;

use capvault_core::{ClientError, ClientResult};
use secrecy::{ExposeSecret, Secret};
use uuid::Uuid;

use crate::connection::ServerKind;

pub trait ConfigStore: Send + Sync {
    fn server_url(&self, kind: ServerKind, name: &str) -> Option<String>;
    fn set_server_url(&mut self, kind: ServerKind, name: &str, url: &str);

    fn default_server(&self, kind: ServerKind) -> Option<String>;
    fn set_default_server(&mut self, kind: ServerKind, name: &str);

    fn default_account(&self) -> Option<Uuid>;
    fn set_default_account(&mut self, account_uid: Uuid);

    fn default_client(&self) -> Option<Uuid>;
    fn set_default_client(&mut self, client_uid: Uuid);

    fn client_key(&self, account_uid: Uuid, client_uid: Uuid) -> Option<Secret<String>>;
    fn set_client_key(&mut self, account_uid: Uuid, client_uid: Uuid, key_pem: Secret<String>);

    fn client_csr(&self, account_uid: Uuid, client_uid: Uuid, server: &str) -> Option<String>;
    fn set_client_csr(&mut self, account_uid: Uuid, client_uid: Uuid, server: &str, csr_pem: &str);

    fn client_crt(&self, account_uid: Uuid, client_uid: Uuid, server: &str) -> Option<String>;
    fn set_client_crt(&mut self, account_uid: Uuid, client_uid: Uuid, server: &str, crt_pem: &str);

    /// Private CA certificate for a server, if it is not publicly trusted.
    fn ca_cert(&self, _kind: ServerKind, _name: &str) -> Option<String> {
        None
    }
}

pub fn require_default_account<S: ConfigStore + ?Sized>(store: &S) -> ClientResult<Uuid> {
    store
        .default_account()
        .ok_or_else(|| ClientError::configuration("missing default account UID"))
}

pub fn require_default_client<S: ConfigStore + ?Sized>(store: &S) -> ClientResult<Uuid> {
    store
        .default_client()
        .ok_or_else(|| ClientError::configuration("missing default client UID"))
}

type ClientKey = (Uuid, Uuid);
type ServerClientKey = (Uuid, Uuid, String);

#[derive(Default)]
pub struct MemoryConfigStore {
    server_urls: HashMap<(ServerKind, String), String>,
    default_servers: HashMap<ServerKind, String>,
    default_account: Option<Uuid>,
    default_client: Option<Uuid>,
    keys: HashMap<ClientKey, Secret<String>>,
    csrs: HashMap<ServerClientKey, String>,
    crts: HashMap<ServerClientKey, String>,
    ca_certs: HashMap<(ServerKind, String), String>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ca_cert(&mut self, kind: ServerKind, name: &str, ca_pem: &str) {
        self.ca_certs
            .insert((kind, name.to_string()), ca_pem.to_string());
    }
}

impl ConfigStore for MemoryConfigStore {
    fn server_url(&self, kind: ServerKind, name: &str) -> Option<String> {
        self.server_urls.get(&(kind, name.to_string())).cloned()
    }

    fn set_server_url(&mut self, kind: ServerKind, name: &str, url: &str) {
        self.server_urls
            .insert((kind, name.to_string()), url.to_string());
    }

    fn default_server(&self, kind: ServerKind) -> Option<String> {
        self.default_servers.get(&kind).cloned()
    }

    fn set_default_server(&mut self, kind: ServerKind, name: &str) {
        self.default_servers.insert(kind, name.to_string());
    }

    fn default_account(&self) -> Option<Uuid> {
        self.default_account
    }

    fn set_default_account(&mut self, account_uid: Uuid) {
        self.default_account = Some(account_uid);
    }

    fn default_client(&self) -> Option<Uuid> {
        self.default_client
    }

    fn set_default_client(&mut self, client_uid: Uuid) {
        self.default_client = Some(client_uid);
    }

    fn client_key(&self, account_uid: Uuid, client_uid: Uuid) -> Option<Secret<String>> {
        self.keys
            .get(&(account_uid, client_uid))
            .map(|key| Secret::new(key.expose_secret().clone()))
    }

    fn set_client_key(&mut self, account_uid: Uuid, client_uid: Uuid, key_pem: Secret<String>) {
        self.keys.insert((account_uid, client_uid), key_pem);
    }

    fn client_csr(&self, account_uid: Uuid, client_uid: Uuid, server: &str) -> Option<String> {
        self.csrs
            .get(&(account_uid, client_uid, server.to_string()))
            .cloned()
    }

    fn set_client_csr(&mut self, account_uid: Uuid, client_uid: Uuid, server: &str, csr_pem: &str) {
        self.csrs.insert(
            (account_uid, client_uid, server.to_string()),
            csr_pem.to_string(),
        );
    }

    fn client_crt(&self, account_uid: Uuid, client_uid: Uuid, server: &str) -> Option<String> {
        self.crts
            .get(&(account_uid, client_uid, server.to_string()))
            .cloned()
    }

    fn set_client_crt(&mut self, account_uid: Uuid, client_uid: Uuid, server: &str, crt_pem: &str) {
        self.crts.insert(
            (account_uid, client_uid, server.to_string()),
            crt_pem.to_string(),
        );
    }

    fn ca_cert(&self, kind: ServerKind, name: &str) -> Option<String> {
        self.ca_certs.get(&(kind, name.to_string())).cloned()
    }
}
