// SPDX-License-Identifier: MPL-2.0

mod durable;
mod records;
mod schema;
mod session;
pub mod sync;

pub use durable::DurableTier;
pub use records::LocalMirror;
pub use session::SessionTier;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("mirror path error: {0}")]
    Path(String),
}

/// Collection keys. Values stored under them are always JSON-encoded
/// arrays of records, except the user record and sync timestamp which
/// are single values.
pub(crate) const KEY_POSTS: &str = "softspot:posts";
pub(crate) const KEY_CONVERSATIONS: &str = "softspot:conversations";
pub(crate) const KEY_USER: &str = "softspot:user";
pub(crate) const KEY_LAST_SYNC: &str = "softspot:last_sync";

/// String-keyed storage behind the mirror, browser-storage shaped.
///
/// Tiers never surface errors: a failed read is `None`, a failed write
/// is logged and dropped. The mirror is a convenience cache and callers
/// must not be able to hard-fail on it.
pub trait StorageTier: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}
