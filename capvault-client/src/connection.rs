//! Server connections and the transport seam used by every operation.
//!
//! Operations are free functions generic over [`ApiTransport`], so the same
//! broker and fan-out code drives real HTTPS connections and test doubles.
//! A [`ServerConnection`] owns one HTTP session; a [`ConnectionSet`] owns an
//! ordered, uniquely named group of connections of one server kind.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use capvault_core::config::Settings;
use capvault_core::observability::trace_headers;
use capvault_core::{ClientError, ClientResult};
use reqwest::{Certificate, Identity, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::constants::{API_BASE, API_VERSION, TOKENS_DELIMITER, TOKENS_HEADER};
use crate::store::{ConfigStore, require_default_account, require_default_client};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKind {
    AccessControl,
    Storage,
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKind::AccessControl => write!(f, "ac"),
            ServerKind::Storage => write!(f, "storage"),
        }
    }
}

/// JSON-over-HTTP capability a server connection provides.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    fn name(&self) -> &str;

    fn server_url(&self) -> &str;

    async fn post_json(&self, endpoint: &str, body: &Value, tokens: &[String])
    -> ClientResult<Value>;

    async fn get_json(&self, endpoint: &str, tokens: &[String]) -> ClientResult<Value>;
}

/// POST a typed body and decode a typed response.
pub async fn post<T, B, R>(conn: &T, endpoint: &str, body: &B, tokens: &[String]) -> ClientResult<R>
where
    T: ApiTransport + ?Sized,
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let body = serde_json::to_value(body).map_err(|e| {
        ClientError::configuration(format!("failed to encode {} request: {}", endpoint, e))
    })?;
    let value = conn.post_json(endpoint, &body, tokens).await?;
    decode(conn.name(), endpoint, value)
}

/// GET and decode a typed response.
pub async fn get<T, R>(conn: &T, endpoint: &str, tokens: &[String]) -> ClientResult<R>
where
    T: ApiTransport + ?Sized,
    R: DeserializeOwned,
{
    let value = conn.get_json(endpoint, tokens).await?;
    decode(conn.name(), endpoint, value)
}

fn decode<R: DeserializeOwned>(server: &str, endpoint: &str, value: Value) -> ClientResult<R> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::invalid_response(server, format!("{}: {}", endpoint, e)))
}

/// Render tokens as the single delimited header value servers expect.
pub fn tokens_header_value(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(TOKENS_DELIMITER)
}

/// Client certificate and key presented for mutual TLS.
pub struct ClientIdentity {
    pub cert_pem: String,
    pub key_pem: Secret<String>,
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("cert_pem", &format!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct TlsOptions {
    /// Extra root certificate for servers signed by a private CA.
    pub ca_cert_pem: Option<String>,
    pub client_identity: Option<ClientIdentity>,
}

/// A named connection to one AC or storage server.
///
/// The HTTP session is built by [`open`](Self::open) and dropped by
/// [`close`](Self::close); requests on a closed connection fail.
#[derive(Debug)]
pub struct ServerConnection {
    name: String,
    kind: ServerKind,
    base_url: String,
    tls: TlsOptions,
    connect_timeout: Duration,
    request_timeout: Duration,
    session: Option<reqwest::Client>,
}

impl ServerConnection {
    pub fn new(name: impl Into<String>, kind: ServerKind, base_url: impl Into<String>) -> Self {
        let settings = Settings::default();
        Self {
            name: name.into(),
            kind,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tls: TlsOptions::default(),
            connect_timeout: settings.connect_timeout(),
            request_timeout: settings.request_timeout(),
            session: None,
        }
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, request_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.request_timeout = request_timeout;
        self
    }

    /// Build a connection from the config store.
    ///
    /// Falls back to the store's default server when `name` is `None`. AC
    /// connections authenticate with the default account's client
    /// certificate; storage connections do not present one.
    pub fn from_store<S: ConfigStore + ?Sized>(
        store: &S,
        kind: ServerKind,
        name: Option<&str>,
        settings: &Settings,
    ) -> ClientResult<Self> {
        let name = match name {
            Some(name) => name.to_string(),
            None => store.default_server(kind).ok_or_else(|| {
                ClientError::configuration(format!("missing default {} server name", kind))
            })?,
        };
        let url = store.server_url(kind, &name).ok_or_else(|| {
            ClientError::configuration(format!("missing URL for {} server '{}'", kind, name))
        })?;

        let client_identity = match kind {
            ServerKind::AccessControl => {
                let account_uid = require_default_account(store)?;
                let client_uid = require_default_client(store)?;
                let key_pem = store.client_key(account_uid, client_uid).ok_or_else(|| {
                    ClientError::configuration(format!(
                        "missing client key for account {} client {}",
                        account_uid, client_uid
                    ))
                })?;
                let cert_pem = store
                    .client_crt(account_uid, client_uid, &name)
                    .ok_or_else(|| {
                        ClientError::configuration(format!(
                            "missing client certificate for server '{}'",
                            name
                        ))
                    })?;
                Some(ClientIdentity { cert_pem, key_pem })
            }
            ServerKind::Storage => None,
        };

        let tls = TlsOptions {
            ca_cert_pem: store.ca_cert(kind, &name),
            client_identity,
        };

        Ok(Self::new(name, kind, url)
            .with_tls(tls)
            .with_timeouts(settings.connect_timeout(), settings.request_timeout()))
    }

    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Build the HTTP session. Opening an open connection is a no-op.
    pub fn open(&mut self) -> ClientResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout);

        if let Some(ca_pem) = &self.tls.ca_cert_pem {
            let ca = Certificate::from_pem(ca_pem.as_bytes()).map_err(|e| self.transport_error(e))?;
            builder = builder.add_root_certificate(ca);
        }

        if let Some(identity) = &self.tls.client_identity {
            let mut pem = identity.cert_pem.clone().into_bytes();
            pem.push(b'\n');
            pem.extend_from_slice(identity.key_pem.expose_secret().as_bytes());
            let identity = Identity::from_pem(&pem).map_err(|e| self.transport_error(e))?;
            builder = builder.identity(identity);
        }

        let session = builder.build().map_err(|e| self.transport_error(e))?;
        self.session = Some(session);

        debug!(server = %self.name, kind = %self.kind, url = %self.base_url, "Connection opened");
        Ok(())
    }

    pub fn close(&mut self) {
        if self.session.take().is_some() {
            debug!(server = %self.name, "Connection closed");
        }
    }

    pub fn api_url(&self) -> String {
        format!("{}/{}/{}", self.base_url, API_BASE, API_VERSION)
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}/", self.api_url(), endpoint)
    }

    fn session(&self) -> ClientResult<&reqwest::Client> {
        self.session
            .as_ref()
            .ok_or_else(|| ClientError::NotOpen(self.name.clone()))
    }

    fn transport_error(&self, source: reqwest::Error) -> ClientError {
        ClientError::Connection {
            server: self.name.clone(),
            source,
        }
    }

    async fn send(&self, request: RequestBuilder, tokens: &[String]) -> ClientResult<Value> {
        let response = request
            .headers(trace_headers())
            .header(TOKENS_HEADER, tokens_header_value(tokens))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?
            .error_for_status()
            .map_err(|e| self.transport_error(e))?;

        response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::invalid_response(&self.name, e))
    }
}

#[async_trait]
impl ApiTransport for ServerConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn server_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: &Value,
        tokens: &[String],
    ) -> ClientResult<Value> {
        let url = self.endpoint_url(endpoint);
        debug!(server = %self.name, url = %url, "POST");
        let request = self.session()?.post(&url).json(body);
        self.send(request, tokens).await
    }

    async fn get_json(&self, endpoint: &str, tokens: &[String]) -> ClientResult<Value> {
        let url = self.endpoint_url(endpoint);
        debug!(server = %self.name, url = %url, "GET");
        let request = self.session()?.get(&url);
        self.send(request, tokens).await
    }
}

/// An ordered collection of uniquely named connections.
///
/// Fan-out visits connections in insertion order.
#[derive(Debug)]
pub struct ConnectionSet<T = ServerConnection> {
    connections: Vec<T>,
}

impl<T> Default for ConnectionSet<T> {
    fn default() -> Self {
        Self {
            connections: Vec::new(),
        }
    }
}

impl<T: ApiTransport> ConnectionSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set in iteration order. A repeated name is a configuration
    /// error, never a silently smaller set.
    pub fn try_from_iter<I: IntoIterator<Item = T>>(connections: I) -> ClientResult<Self> {
        let mut set = Self::new();
        for connection in connections {
            set.insert(connection)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, connection: T) -> ClientResult<()> {
        if self.get(connection.name()).is_some() {
            return Err(ClientError::configuration(format!(
                "duplicate server name '{}'",
                connection.name()
            )));
        }
        self.connections.push(connection);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.connections.iter().find(|c| c.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.connections.iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn server_urls(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|c| c.server_url().to_string())
            .collect()
    }
}

impl ConnectionSet<ServerConnection> {
    /// Build a set from the config store; an empty `names` selects the
    /// store's default server for `kind`.
    pub fn from_store<S: ConfigStore + ?Sized>(
        store: &S,
        kind: ServerKind,
        names: &[&str],
        settings: &Settings,
    ) -> ClientResult<Self> {
        let mut set = Self::new();
        if names.is_empty() {
            set.insert(ServerConnection::from_store(store, kind, None, settings)?)?;
        }
        for name in names {
            set.insert(ServerConnection::from_store(
                store,
                kind,
                Some(name),
                settings,
            )?)?;
        }
        Ok(set)
    }

    pub fn open_all(&mut self) -> ClientResult<()> {
        for connection in &mut self.connections {
            connection.open()?;
        }
        Ok(())
    }

    pub fn close_all(&mut self) {
        for connection in &mut self.connections {
            connection.close();
        }
    }
}
