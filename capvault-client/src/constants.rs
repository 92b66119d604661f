//! Object types, permissions and wire keys understood by AC and storage servers.

pub const TYPE_SRV_AC: &str = "acserver";
pub const TYPE_SRV_STORAGE: &str = "storageserver";
pub const TYPE_COL: &str = "collection";

pub const PERM_CREATE: &str = "create";
pub const PERM_READ: &str = "read";

/// Action key under which a permission's default grantors are recorded.
pub const ACTION_DEFAULT: &str = "default";

pub const API_BASE: &str = "api";
pub const API_VERSION: &str = "v1";

pub const TOKENS_HEADER: &str = "tutamen-tokens";
pub const TOKENS_DELIMITER: &str = ":";

pub const EP_AUTHORIZATIONS: &str = "authorizations";
pub const EP_VERIFIERS: &str = "verifiers";
pub const EP_PERMISSIONS: &str = "permissions";
pub const EP_BOOTSTRAP_ACCOUNTS: &str = "bootstrap/accounts";
pub const EP_COLLECTIONS: &str = "collections";
pub const EP_SECRETS: &str = "secrets";
pub const EP_VERSIONS: &str = "versions";
