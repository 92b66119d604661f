use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use capvault_core::ClientResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::UserData;

/// Request for a token granting `objperm` on an object type or instance.
///
/// An absent `objuid` asks for a type-level authorization.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct AuthorizationRequest {
    #[validate(length(min = 1))]
    pub objtype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objuid: Option<Uuid>,
    #[validate(length(min = 1))]
    pub objperm: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub userdata: UserData,
}

impl AuthorizationRequest {
    pub fn new(
        objtype: impl Into<String>,
        objperm: impl Into<String>,
        objuid: Option<Uuid>,
    ) -> ClientResult<Self> {
        let request = Self {
            objtype: objtype.into(),
            objuid,
            objperm: objperm.into(),
            userdata: UserData::new(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_userdata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.userdata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationsCreated {
    pub authorizations: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    #[serde(alias = "approved")]
    Granted,
    Denied,
}

/// Server-side authorization record as observed by polling.
#[derive(Debug, Clone, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub uid: Option<Uuid>,
    pub status: AuthorizationStatus,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifierCreateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    pub accounts: BTreeSet<Uuid>,
    pub authenticators: BTreeSet<Uuid>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub userdata: UserData,
}

#[derive(Debug, Deserialize)]
pub struct VerifiersCreated {
    pub verifiers: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verifier {
    pub uid: Uuid,
    #[serde(default)]
    pub accounts: BTreeSet<Uuid>,
    #[serde(default)]
    pub authenticators: BTreeSet<Uuid>,
}

/// Identity of a permission record: an object type plus optional instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub objtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objuid: Option<Uuid>,
}

impl PermissionKey {
    pub fn new(objtype: impl Into<String>, objuid: Option<Uuid>) -> Self {
        Self {
            objtype: objtype.into(),
            objuid,
        }
    }

    pub(crate) fn endpoint(&self, base: &str) -> String {
        match self.objuid {
            Some(uid) => format!("{}/{}/{}", base, self.objtype, uid),
            None => format!("{}/{}", base, self.objtype),
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.objuid {
            Some(uid) => write!(f, "{}/{}", self.objtype, uid),
            None => write!(f, "{}", self.objtype),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionCreateRequest {
    #[serde(flatten)]
    pub key: PermissionKey,
    /// Verifiers allowed to grant each action.
    pub verifiers: BTreeMap<String, Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsCreated {
    pub permissions: Vec<PermissionKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Permission {
    #[serde(flatten)]
    pub key: PermissionKey,
    #[serde(default)]
    pub verifiers: BTreeMap<String, Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapAccountRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_uid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uid: Option<Uuid>,
    pub client_csr: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub account_userdata: UserData,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub client_userdata: UserData,
}

#[derive(Debug, Deserialize)]
pub struct BootstrapAccountResponse {
    pub accounts: Vec<Uuid>,
    pub clients: Vec<Uuid>,
    #[serde(default)]
    pub client_crt: Option<String>,
}
