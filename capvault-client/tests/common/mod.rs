//! Shared harness for integration tests: tracing setup and wiremock-backed
//! AC and storage servers.

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use capvault_client::{ConnectionSet, PollConfig, ServerConnection, ServerKind};
use serde_json::{Map, Value, json};
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

static INIT: Once = Once::new();

/// Initialize tracing once per test binary; output goes through the test writer.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub const AUTHORIZATION_STATUS_PATH: &str = r"^/api/v1/authorizations/[0-9a-f-]+/$";

pub fn api_path(endpoint: &str) -> String {
    format!("/api/v1/{}/", endpoint)
}

pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(2),
    }
}

/// Answers creation requests with `{key: [<uid from the request body>]}`.
pub struct EchoUid(pub &'static str);

impl Respond for EchoUid {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().unwrap_or_default();
        let mut response = Map::new();
        response.insert(self.0.to_string(), json!([body["uid"]]));
        ResponseTemplate::new(200).set_body_json(Value::Object(response))
    }
}

/// Answers `POST permissions` with the permission key from the request body.
pub struct EchoPermission;

impl Respond for EchoPermission {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({
            "permissions": [{ "objtype": body["objtype"], "objuid": body["objuid"] }]
        }))
    }
}

/// Mount authorization endpoints that immediately resolve to `status`.
pub async fn mount_authorizations(server: &MockServer, status: &str, token: Option<&str>) {
    Mock::given(method("POST"))
        .and(path(api_path("authorizations")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "authorizations": [Uuid::new_v4()] })),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(AUTHORIZATION_STATUS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": status, "token": token })),
        )
        .mount(server)
        .await;
}

/// An AC server that grants every authorization with `token` and echoes
/// created verifiers and permissions.
pub async fn granting_ac_server(token: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_authorizations(&server, "granted", Some(token)).await;

    Mock::given(method("POST"))
        .and(path(api_path("verifiers")))
        .respond_with(EchoUid("verifiers"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(api_path("permissions")))
        .respond_with(EchoPermission)
        .mount(&server)
        .await;

    server
}

pub async fn denying_ac_server() -> MockServer {
    let server = MockServer::start().await;
    mount_authorizations(&server, "denied", None).await;
    server
}

/// Open connections named `{prefix}-1`, `{prefix}-2`, ... in server order.
pub fn connect(kind: ServerKind, prefix: &str, servers: &[&MockServer]) -> ConnectionSet {
    let connections = servers.iter().enumerate().map(|(i, server)| {
        ServerConnection::new(format!("{}-{}", prefix, i + 1), kind, server.uri())
    });
    let mut set = ConnectionSet::try_from_iter(connections).expect("server names are unique");
    set.open_all().expect("connections should open");
    set
}
