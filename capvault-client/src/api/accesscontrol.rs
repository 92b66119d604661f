use capvault_core::{ClientError, ClientResult};
use tracing::debug;
use uuid::Uuid;

use crate::connection::{ApiTransport, get, post};
use crate::constants::{EP_BOOTSTRAP_ACCOUNTS, EP_PERMISSIONS, EP_VERIFIERS};
use crate::dtos::{
    BootstrapAccountRequest, BootstrapAccountResponse, Permission, PermissionCreateRequest,
    PermissionKey, PermissionsCreated, Verifier, VerifierCreateRequest, VerifiersCreated, single,
};

pub async fn create_verifier<T: ApiTransport + ?Sized>(
    conn: &T,
    tokens: &[String],
    request: &VerifierCreateRequest,
) -> ClientResult<Uuid> {
    let created: VerifiersCreated = post(conn, EP_VERIFIERS, request, tokens).await?;
    let uid = single(created.verifiers, conn.name(), EP_VERIFIERS)?;
    debug!(server = conn.name(), verifier = %uid, "Verifier created");
    Ok(uid)
}

pub async fn fetch_verifier<T: ApiTransport + ?Sized>(
    conn: &T,
    tokens: &[String],
    uid: Uuid,
) -> ClientResult<Verifier> {
    let endpoint = format!("{}/{}", EP_VERIFIERS, uid);
    let verifier: Verifier = get(conn, &endpoint, tokens).await?;
    if verifier.uid != uid {
        return Err(ClientError::invalid_response(
            conn.name(),
            format!("requested verifier {} but received {}", uid, verifier.uid),
        ));
    }
    Ok(verifier)
}

pub async fn create_permission<T: ApiTransport + ?Sized>(
    conn: &T,
    tokens: &[String],
    request: &PermissionCreateRequest,
) -> ClientResult<PermissionKey> {
    let created: PermissionsCreated = post(conn, EP_PERMISSIONS, request, tokens).await?;
    let key = single(created.permissions, conn.name(), EP_PERMISSIONS)?;
    debug!(server = conn.name(), permission = %key, "Permission created");
    Ok(key)
}

/// Read a permission record; `objuid` of `None` addresses the type-level one.
pub async fn fetch_permission<T: ApiTransport + ?Sized>(
    conn: &T,
    tokens: &[String],
    objtype: &str,
    objuid: Option<Uuid>,
) -> ClientResult<Permission> {
    let key = PermissionKey::new(objtype, objuid);
    let permission: Permission = get(conn, &key.endpoint(EP_PERMISSIONS), tokens).await?;
    if permission.key != key {
        return Err(ClientError::invalid_response(
            conn.name(),
            format!("requested permission {} but received {}", key, permission.key),
        ));
    }
    Ok(permission)
}

/// Register a new account and client. Sent without tokens; the server
/// authenticates the request through its bootstrap policy alone.
pub async fn bootstrap_account<T: ApiTransport + ?Sized>(
    conn: &T,
    request: &BootstrapAccountRequest,
) -> ClientResult<BootstrapAccountResponse> {
    post(conn, EP_BOOTSTRAP_ACCOUNTS, request, &[]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use serde_json::json;

    use crate::dtos::UserData;
    use crate::testing::FakeTransport;

    fn tokens() -> Vec<String> {
        vec!["tok-a".to_string()]
    }

    #[tokio::test]
    async fn test_create_verifier_posts_body_with_tokens() {
        let uid = Uuid::new_v4();
        let account = Uuid::new_v4();
        let conn = FakeTransport::new("ac-1", move |_| Ok(json!({ "verifiers": [uid] })));
        let request = VerifierCreateRequest {
            uid: Some(uid),
            accounts: BTreeSet::from([account]),
            authenticators: BTreeSet::new(),
            userdata: UserData::new(),
        };

        let created = create_verifier(&conn, &tokens(), &request).await.unwrap();
        assert_eq!(created, uid);

        let calls = conn.calls();
        assert_eq!(calls[0].method, "POST");
        assert_eq!(calls[0].endpoint, "verifiers");
        assert_eq!(calls[0].tokens, tokens());
        let body = calls[0].body.as_ref().unwrap();
        assert_eq!(body["uid"], json!(uid.to_string()));
        assert_eq!(body["accounts"], json!([account.to_string()]));
        assert_eq!(body["authenticators"], json!([]));
    }

    #[tokio::test]
    async fn test_create_verifier_rejects_malformed_response() {
        let conn = FakeTransport::new("ac-1", |_| Ok(json!({ "verifiers": [] })));
        let request = VerifierCreateRequest {
            uid: None,
            accounts: BTreeSet::new(),
            authenticators: BTreeSet::new(),
            userdata: UserData::new(),
        };
        let err = create_verifier(&conn, &[], &request).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse { server, .. } if server == "ac-1"));
    }

    #[tokio::test]
    async fn test_fetch_verifier_checks_uid() {
        let uid = Uuid::new_v4();
        let account = Uuid::new_v4();
        let conn = FakeTransport::new("ac-1", move |_| {
            Ok(json!({ "uid": uid, "accounts": [account], "authenticators": [] }))
        });

        let verifier = fetch_verifier(&conn, &tokens(), uid).await.unwrap();
        assert_eq!(verifier.accounts, BTreeSet::from([account]));
        assert_eq!(conn.calls()[0].endpoint, format!("verifiers/{}", uid));

        let err = fetch_verifier(&conn, &tokens(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_create_permission_returns_key() {
        let col = Uuid::new_v4();
        let verifier = Uuid::new_v4();
        let conn = FakeTransport::new("ac-1", move |_| {
            Ok(json!({ "permissions": [{ "objtype": "collection", "objuid": col }] }))
        });
        let request = PermissionCreateRequest {
            key: PermissionKey::new("collection", Some(col)),
            verifiers: BTreeMap::from([("default".to_string(), vec![verifier])]),
        };

        let key = create_permission(&conn, &tokens(), &request).await.unwrap();
        assert_eq!(key, PermissionKey::new("collection", Some(col)));
        assert_eq!(conn.calls()[0].endpoint, "permissions");
    }

    #[tokio::test]
    async fn test_fetch_type_level_permission() {
        let verifier = Uuid::new_v4();
        let conn = FakeTransport::new("ac-1", move |_| {
            Ok(json!({ "objtype": "acserver", "verifiers": { "default": [verifier] } }))
        });

        let permission = fetch_permission(&conn, &tokens(), "acserver", None)
            .await
            .unwrap();
        assert_eq!(conn.calls()[0].endpoint, "permissions/acserver");
        assert_eq!(permission.verifiers["default"], vec![verifier]);
    }

    #[tokio::test]
    async fn test_bootstrap_account_sends_no_tokens() {
        let (account, client) = (Uuid::new_v4(), Uuid::new_v4());
        let conn = FakeTransport::new("ac-1", move |_| {
            Ok(json!({ "accounts": [account], "clients": [client], "client_crt": "CRT" }))
        });
        let request = BootstrapAccountRequest {
            account_uid: Some(account),
            client_uid: Some(client),
            client_csr: "CSR".to_string(),
            account_userdata: UserData::new(),
            client_userdata: UserData::new(),
        };

        let response = bootstrap_account(&conn, &request).await.unwrap();
        assert_eq!(response.accounts, vec![account]);
        assert_eq!(response.client_crt.as_deref(), Some("CRT"));

        let calls = conn.calls();
        assert_eq!(calls[0].endpoint, "bootstrap/accounts");
        assert!(calls[0].tokens.is_empty());
        assert_eq!(calls[0].body.as_ref().unwrap()["client_csr"], "CSR");
    }
}
