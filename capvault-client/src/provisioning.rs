//! Server registration and first-time account bootstrap against an AC server.

use capvault_core::config::Settings;
use capvault_core::{ClientError, ClientResult};
use secrecy::{ExposeSecret, Secret};
use tracing::info;
use uuid::Uuid;

use crate::api;
use crate::connection::{ApiTransport, ServerConnection, ServerKind, TlsOptions};
use crate::dtos::{BootstrapAccountRequest, UserData, single};
use crate::store::ConfigStore;

/// Produces client key material. Key and CSR formats are PEM.
pub trait CredentialGenerator: Send + Sync {
    fn generate_private_key(&self, params: &KeyParams) -> anyhow::Result<Secret<String>>;

    fn generate_csr(&self, key_pem: &Secret<String>, subject: &CsrSubject)
    -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParams {
    pub bits: u32,
    pub public_exponent: u32,
}

impl Default for KeyParams {
    fn default() -> Self {
        Self {
            bits: 4096,
            public_exponent: 65537,
        }
    }
}

/// Distinguished name fields for a client certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrSubject {
    pub common_name: String,
    pub email: Option<String>,
    pub country: String,
    pub state: String,
    pub locality: String,
    pub organization: String,
    pub organizational_unit: String,
}

impl Default for CsrSubject {
    fn default() -> Self {
        Self {
            common_name: "new_client_cert".to_string(),
            email: None,
            country: "US".to_string(),
            state: "Colorado".to_string(),
            locality: "Boulder".to_string(),
            organization: "libtutamen_client".to_string(),
            organizational_unit: "libtutamen_client_account".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapOptions {
    /// AC server to enroll with; the store's default when `None`.
    pub server_name: Option<String>,
    pub account_uid: Option<Uuid>,
    pub client_uid: Option<Uuid>,
    pub key_params: KeyParams,
    pub subject: CsrSubject,
    pub account_userdata: UserData,
    pub client_userdata: UserData,
}

#[derive(Debug, Clone)]
pub struct BootstrapResult {
    pub server_name: String,
    pub account_uid: Uuid,
    pub client_uid: Uuid,
    pub client_crt: String,
}

/// Record a server URL under `name`.
///
/// Re-registering the same URL is a no-op; a different URL is refused. The
/// server becomes the default for its kind when no default is set yet.
pub fn register_server<S: ConfigStore + ?Sized>(
    store: &mut S,
    kind: ServerKind,
    name: &str,
    url: &str,
) -> ClientResult<()> {
    match store.server_url(kind, name) {
        Some(existing) if existing != url => {
            return Err(ClientError::configuration(format!(
                "{} server '{}' already configured with a different URL ({})",
                kind, name, existing
            )));
        }
        Some(_) => {}
        None => store.set_server_url(kind, name, url),
    }

    if store.default_server(kind).is_none() {
        store.set_default_server(kind, name);
    }

    info!(kind = %kind, server = name, url = url, "Server registered");
    Ok(())
}

pub fn register_ac_server<S: ConfigStore + ?Sized>(
    store: &mut S,
    name: &str,
    url: &str,
) -> ClientResult<()> {
    register_server(store, ServerKind::AccessControl, name, url)
}

pub fn register_storage_server<S: ConfigStore + ?Sized>(
    store: &mut S,
    name: &str,
    url: &str,
) -> ClientResult<()> {
    register_server(store, ServerKind::Storage, name, url)
}

/// Enroll a new client with an AC server and store its certificate.
///
/// The request goes over a connection that presents no client certificate,
/// since the client does not have one yet.
pub async fn bootstrap_account<S, G>(
    store: &mut S,
    generator: &G,
    settings: &Settings,
    options: BootstrapOptions,
) -> ClientResult<BootstrapResult>
where
    S: ConfigStore + ?Sized,
    G: CredentialGenerator + ?Sized,
{
    let server_name = resolve_server_name(&*store, options.server_name.as_deref())?;
    let url = store
        .server_url(ServerKind::AccessControl, &server_name)
        .ok_or_else(|| {
            ClientError::configuration(format!("missing URL for ac server '{}'", server_name))
        })?;

    let mut conn = ServerConnection::new(&server_name, ServerKind::AccessControl, url)
        .with_tls(TlsOptions {
            ca_cert_pem: store.ca_cert(ServerKind::AccessControl, &server_name),
            client_identity: None,
        })
        .with_timeouts(settings.connect_timeout(), settings.request_timeout());
    conn.open()?;

    let options = BootstrapOptions {
        server_name: Some(server_name),
        ..options
    };
    let result = bootstrap_account_with(store, generator, &conn, options).await;
    conn.close();
    result
}

fn resolve_server_name<S: ConfigStore + ?Sized>(
    store: &S,
    server_name: Option<&str>,
) -> ClientResult<String> {
    match server_name {
        Some(name) => Ok(name.to_string()),
        None => store
            .default_server(ServerKind::AccessControl)
            .ok_or_else(|| ClientError::configuration("missing default ac server name")),
    }
}

pub(crate) async fn bootstrap_account_with<S, G, T>(
    store: &mut S,
    generator: &G,
    conn: &T,
    options: BootstrapOptions,
) -> ClientResult<BootstrapResult>
where
    S: ConfigStore + ?Sized,
    G: CredentialGenerator + ?Sized,
    T: ApiTransport + ?Sized,
{
    let server_name = resolve_server_name(&*store, options.server_name.as_deref())?;
    let account_uid = options
        .account_uid
        .or_else(|| store.default_account())
        .unwrap_or_else(Uuid::new_v4);
    let client_uid = options
        .client_uid
        .or_else(|| store.default_client())
        .unwrap_or_else(Uuid::new_v4);

    if store
        .client_crt(account_uid, client_uid, &server_name)
        .is_some()
    {
        return Err(ClientError::configuration(format!(
            "client {} already configured for server '{}'",
            client_uid, server_name
        )));
    }

    if store.default_account().is_none() {
        store.set_default_account(account_uid);
    }
    if store.default_client().is_none() {
        store.set_default_client(client_uid);
    }

    let key_pem = match store.client_key(account_uid, client_uid) {
        Some(key_pem) => key_pem,
        None => {
            let key_pem = generator
                .generate_private_key(&options.key_params)
                .map_err(|e| {
                    ClientError::Configuration(e.context("failed to generate client key"))
                })?;
            store.set_client_key(
                account_uid,
                client_uid,
                Secret::new(key_pem.expose_secret().clone()),
            );
            key_pem
        }
    };

    let csr_pem = generator
        .generate_csr(&key_pem, &options.subject)
        .map_err(|e| ClientError::Configuration(e.context("failed to generate client CSR")))?;
    store.set_client_csr(account_uid, client_uid, &server_name, &csr_pem);

    let request = BootstrapAccountRequest {
        account_uid: Some(account_uid),
        client_uid: Some(client_uid),
        client_csr: csr_pem,
        account_userdata: options.account_userdata,
        client_userdata: options.client_userdata,
    };
    let response = api::bootstrap_account(conn, &request).await?;

    let echoed_account = single(response.accounts, conn.name(), "accounts")?;
    ensure_echo(conn.name(), account_uid, echoed_account)?;
    let echoed_client = single(response.clients, conn.name(), "clients")?;
    ensure_echo(conn.name(), client_uid, echoed_client)?;

    let client_crt = response
        .client_crt
        .filter(|crt| !crt.trim().is_empty())
        .ok_or_else(|| {
            ClientError::invalid_response(
                conn.name(),
                "bootstrap response carried no certificate",
            )
        })?;
    store.set_client_crt(account_uid, client_uid, &server_name, &client_crt);

    info!(
        server = %server_name,
        account = %account_uid,
        client = %client_uid,
        "Account bootstrapped"
    );
    Ok(BootstrapResult {
        server_name,
        account_uid,
        client_uid,
        client_crt,
    })
}

fn ensure_echo(server: &str, expected: Uuid, actual: Uuid) -> ClientResult<()> {
    if expected != actual {
        return Err(ClientError::Consistency {
            server: server.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
