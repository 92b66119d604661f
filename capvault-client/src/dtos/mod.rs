//! Request and response records for the AC and storage server endpoints.

pub mod accesscontrol;
pub mod storage;

pub use accesscontrol::*;
pub use storage::*;

use std::collections::BTreeMap;

use capvault_core::{ClientError, ClientResult};

/// Free-form metadata attached to created objects.
pub type UserData = BTreeMap<String, String>;

/// Creation endpoints answer with a one-element list under the object's key.
pub(crate) fn single<T>(items: Vec<T>, server: &str, key: &str) -> ClientResult<T> {
    let count = items.len();
    let mut items = items.into_iter();
    match (items.next(), count) {
        (Some(item), 1) => Ok(item),
        _ => Err(ClientError::invalid_response(
            server,
            format!("expected exactly one entry under '{}', got {}", key, count),
        )),
    }
}
