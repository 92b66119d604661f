use capvault_core::ClientResult;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::connection::{ApiTransport, get, post};
use crate::constants::{EP_COLLECTIONS, EP_SECRETS, EP_VERSIONS};
use crate::dtos::{
    CollectionCreateRequest, CollectionsCreated, SecretCreateRequest, SecretData, SecretVersion,
    SecretsCreated, single,
};

pub async fn create_collection<T: ApiTransport + ?Sized>(
    conn: &T,
    tokens: &[String],
    request: &CollectionCreateRequest,
) -> ClientResult<Uuid> {
    request.validate()?;
    let created: CollectionsCreated = post(conn, EP_COLLECTIONS, request, tokens).await?;
    let uid = single(created.collections, conn.name(), EP_COLLECTIONS)?;
    debug!(server = conn.name(), collection = %uid, "Collection created");
    Ok(uid)
}

pub async fn create_secret<T: ApiTransport + ?Sized>(
    conn: &T,
    tokens: &[String],
    col_uid: Uuid,
    request: &SecretCreateRequest,
) -> ClientResult<Uuid> {
    let endpoint = format!("{}/{}/{}", EP_COLLECTIONS, col_uid, EP_SECRETS);
    let created: SecretsCreated = post(conn, &endpoint, request, tokens).await?;
    let uid = single(created.secrets, conn.name(), EP_SECRETS)?;
    debug!(server = conn.name(), collection = %col_uid, secret = %uid, "Secret created");
    Ok(uid)
}

pub async fn fetch_secret_data<T: ApiTransport + ?Sized>(
    conn: &T,
    tokens: &[String],
    col_uid: Uuid,
    sec_uid: Uuid,
    version: SecretVersion,
) -> ClientResult<String> {
    let endpoint = format!(
        "{}/{}/{}/{}/{}/{}",
        EP_COLLECTIONS, col_uid, EP_SECRETS, sec_uid, EP_VERSIONS, version
    );
    let secret: SecretData = get(conn, &endpoint, tokens).await?;
    Ok(secret.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capvault_core::ClientError;
    use serde_json::json;

    use crate::dtos::UserData;
    use crate::testing::FakeTransport;

    #[tokio::test]
    async fn test_create_collection_validates_before_sending() {
        let conn = FakeTransport::new("ss-1", |_| Ok(json!({ "collections": [] })));
        let request = CollectionCreateRequest {
            uid: None,
            ac_servers: vec![],
            verifiers: vec![],
            userdata: UserData::new(),
        };

        let err = create_collection(&conn, &[], &request).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(conn.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_secret_path_and_body() {
        let (col, sec) = (Uuid::new_v4(), Uuid::new_v4());
        let conn = FakeTransport::new("ss-1", move |_| Ok(json!({ "secrets": [sec] })));
        let request = SecretCreateRequest {
            uid: Some(sec),
            data: "hunter2".to_string(),
            userdata: UserData::new(),
        };

        let created = create_secret(&conn, &["t".to_string()], col, &request)
            .await
            .unwrap();
        assert_eq!(created, sec);

        let call = &conn.calls()[0];
        assert_eq!(call.endpoint, format!("collections/{}/secrets", col));
        assert_eq!(call.body.as_ref().unwrap()["data"], "hunter2");
    }

    #[tokio::test]
    async fn test_fetch_secret_data_latest_version() {
        let (col, sec) = (Uuid::new_v4(), Uuid::new_v4());
        let conn = FakeTransport::new("ss-1", |_| Ok(json!({ "data": "X" })));

        let data = fetch_secret_data(&conn, &[], col, sec, SecretVersion::Latest)
            .await
            .unwrap();
        assert_eq!(data, "X");
        assert_eq!(
            conn.calls()[0].endpoint,
            format!("collections/{}/secrets/{}/versions/latest", col, sec)
        );
    }

    #[tokio::test]
    async fn test_fetch_secret_data_missing_field() {
        let conn = FakeTransport::new("ss-1", |_| Ok(json!({ "value": "X" })));
        let (col, sec) = (Uuid::new_v4(), Uuid::new_v4());
        let err = fetch_secret_data(&conn, &[], col, sec, SecretVersion::Number(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse { .. }));
    }
}
