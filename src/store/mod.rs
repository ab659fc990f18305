// SPDX-License-Identifier: MPL-2.0

mod messages;
mod posts;
mod users;

pub use messages::MessageStore;
pub use posts::PostStore;
pub use users::UserStore;

use crate::config::RemoteConfig;
use crate::mirror::{LocalMirror, MirrorError};
use crate::remote::{BucketClient, RemoteClient, RemoteError};
use crate::retry::RetryPolicy;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The data-integrity class: surfaced to the UI instead of being
    /// absorbed by a fallback.
    #[error("record not found")]
    NotFound,
    #[error("invalid listing: {0}")]
    InvalidListing(String),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Local,
}

/// Where a mutation actually landed. `fell_back` marks a write that
/// wanted the remote but degraded to local-only persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub backend: Backend,
    pub fell_back: bool,
}

impl SaveOutcome {
    pub(crate) fn remote() -> Self {
        Self {
            backend: Backend::Remote,
            fell_back: false,
        }
    }

    pub(crate) fn local() -> Self {
        Self {
            backend: Backend::Local,
            fell_back: false,
        }
    }

    pub(crate) fn fallback() -> Self {
        Self {
            backend: Backend::Local,
            fell_back: true,
        }
    }
}

/// Handle to both backends plus the retry policy.
///
/// Backend selection happens exactly once, at construction: pass a
/// `RemoteConfig` (or let `from_env` find one) and every operation uses
/// the remote with mirror fallback; pass `None` and everything is
/// mirror-only. Call sites never inspect the environment themselves.
pub struct Store {
    pub(crate) mirror: LocalMirror,
    pub(crate) remote: Option<RemoteClient>,
    pub(crate) bucket: Option<BucketClient>,
    pub(crate) policy: RetryPolicy,
}

impl Store {
    pub fn open(user_id: &str, config: Option<RemoteConfig>) -> Result<Self, StoreError> {
        let mirror = LocalMirror::open(user_id)?;
        Ok(Self::assemble(mirror, config))
    }

    /// Open with the mirror at an explicit directory.
    pub fn open_at(dir: &Path, config: Option<RemoteConfig>) -> Result<Self, StoreError> {
        let mirror = LocalMirror::open_at(dir)?;
        Ok(Self::assemble(mirror, config))
    }

    pub fn from_env(user_id: &str) -> Result<Self, StoreError> {
        Self::open(user_id, RemoteConfig::from_env())
    }

    /// Like `open`, but probes the remote first and treats an
    /// unreachable backend as unconfigured, so a dead connection costs
    /// at most the probe timeout instead of a retry sequence per call.
    pub async fn open_with_probe(
        user_id: &str,
        config: Option<RemoteConfig>,
    ) -> Result<Self, StoreError> {
        let store = Self::open(user_id, config)?;
        Ok(store.demote_if_unreachable().await)
    }

    /// Treat an unreachable remote as unconfigured.
    async fn demote_if_unreachable(self) -> Self {
        if let Some(remote) = &self.remote
            && !remote.probe().await
        {
            info!("remote store unreachable, running local-only");
            return Self {
                remote: None,
                bucket: None,
                ..self
            };
        }
        self
    }

    fn assemble(mirror: LocalMirror, config: Option<RemoteConfig>) -> Self {
        let (remote, bucket) = match config {
            Some(config) => (
                Some(RemoteClient::new(config.clone())),
                Some(BucketClient::new(config)),
            ),
            None => (None, None),
        };
        Self {
            mirror,
            remote,
            bucket,
            policy: RetryPolicy::default(),
        }
    }

    pub fn posts(&self) -> PostStore<'_> {
        PostStore::new(self)
    }

    pub fn messages(&self) -> MessageStore<'_> {
        MessageStore::new(self)
    }

    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(self)
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;

    #[test]
    fn test_local_only_store_has_no_remote() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path(), None).unwrap();
        assert!(!store.is_remote_configured());
    }

    #[test]
    fn test_configured_store_has_remote_and_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let config = RemoteConfig::new("https://db.example.com", "anon-key");
        let store = Store::open_at(dir.path(), config).unwrap();
        assert!(store.is_remote_configured());
        assert!(store.bucket.is_some());
    }

    #[tokio::test]
    async fn test_probe_demotes_unreachable_remote() {
        let dir = tempfile::tempdir().unwrap();
        let config = RemoteConfig::new("http://127.0.0.1:9", "anon-key");
        let store = Store::open_at(dir.path(), config).unwrap();
        assert!(store.is_remote_configured());

        let store = store.demote_if_unreachable().await;
        assert!(!store.is_remote_configured());
    }

    #[test]
    fn test_blocking_callers_share_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path(), None).unwrap();

        let outcome = crate::runtime::block_on(
            store.posts().add_post(Post::new("u1", "ana", "first plushie")),
        )
        .unwrap();
        assert_eq!(outcome.backend, Backend::Local);
        assert!(!outcome.fell_back);
    }
}
