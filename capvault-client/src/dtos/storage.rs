use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::UserData;

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CollectionCreateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    /// AC servers the storage server consults before serving the collection.
    #[validate(length(min = 1))]
    pub ac_servers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verifiers: Vec<Uuid>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub userdata: UserData,
}

#[derive(Debug, Deserialize)]
pub struct CollectionsCreated {
    pub collections: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecretCreateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    pub data: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub userdata: UserData,
}

#[derive(Debug, Deserialize)]
pub struct SecretsCreated {
    pub secrets: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretData {
    pub data: String,
}

/// Which version of a secret to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretVersion {
    #[default]
    Latest,
    Number(u64),
}

impl fmt::Display for SecretVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretVersion::Latest => write!(f, "latest"),
            SecretVersion::Number(n) => write!(f, "{}", n),
        }
    }
}
