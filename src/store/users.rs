// SPDX-License-Identifier: MPL-2.0

use crate::models::{Presence, UserRecord};
use crate::remote::RemoteError;
use crate::retry::with_retry;
use crate::store::{SaveOutcome, Store, StoreError};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

const USERS_TABLE: &str = "users";

/// Operations on the signed-in user's record.
///
/// Identity itself belongs to the hosted provider; this only keeps the
/// client's cached view (id, username, provider tag, presence) and
/// shadows it into the remote `users` table when one is configured.
pub struct UserStore<'a> {
    store: &'a Store,
}

impl<'a> UserStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Cache the record on sign-in and shadow it remotely.
    pub async fn sign_in(&self, record: UserRecord) -> Result<SaveOutcome, StoreError> {
        self.store.mirror.set_user(&record);

        let Some(remote) = &self.store.remote else {
            return Ok(SaveOutcome::local());
        };

        let row = user_row(&record);
        let rows = std::slice::from_ref(&row);
        match with_retry(&self.store.policy, || remote.upsert_rows(USERS_TABLE, rows)).await {
            Ok(()) => {
                self.store.mirror.touch_sync();
                Ok(SaveOutcome::remote())
            }
            Err(e) => {
                warn!("remote user upsert failed, cached locally: {}", e);
                Ok(SaveOutcome::fallback())
            }
        }
    }

    /// Update presence for the signed-in user. Fails with `NotFound`
    /// when nobody is signed in.
    pub async fn set_presence(&self, presence: Presence) -> Result<SaveOutcome, StoreError> {
        let Some(mut record) = self.store.mirror.user() else {
            return Err(StoreError::NotFound);
        };
        record.presence = presence;
        record.updated_at = Utc::now();
        self.store.mirror.set_user(&record);

        let Some(remote) = &self.store.remote else {
            return Ok(SaveOutcome::local());
        };

        let patch = json!({ "presence": presence, "updated_at": record.updated_at });
        match with_retry(&self.store.policy, || {
            remote.update_row(USERS_TABLE, &record.user_id, &patch)
        })
        .await
        {
            Ok(()) => {
                self.store.mirror.touch_sync();
                Ok(SaveOutcome::remote())
            }
            Err(RemoteError::NotFound) => Err(StoreError::NotFound),
            Err(e) => {
                warn!("remote presence update failed, cached locally: {}", e);
                Ok(SaveOutcome::fallback())
            }
        }
    }

    /// The cached record, if anyone is signed in. Never touches the
    /// network.
    pub fn current_user(&self) -> Option<UserRecord> {
        self.store.mirror.user()
    }

    /// Clear the cached record and best-effort flip the remote presence
    /// to offline. Sign-out itself never fails on the network.
    pub async fn sign_out(&self) -> Result<SaveOutcome, StoreError> {
        let record = self.store.mirror.user();
        self.store.mirror.clear_user();

        let (Some(remote), Some(record)) = (&self.store.remote, record) else {
            return Ok(SaveOutcome::local());
        };

        let patch = json!({ "presence": Presence::Offline, "updated_at": Utc::now() });
        match with_retry(&self.store.policy, || {
            remote.update_row(USERS_TABLE, &record.user_id, &patch)
        })
        .await
        {
            Ok(()) => {
                self.store.mirror.touch_sync();
                Ok(SaveOutcome::remote())
            }
            Err(e) => {
                warn!("remote offline flip failed on sign-out: {}", e);
                Ok(SaveOutcome::fallback())
            }
        }
    }
}

fn user_row(record: &UserRecord) -> Value {
    json!({
        "id": record.user_id,
        "username": record.username,
        "provider": record.provider,
        "presence": record.presence,
        "updated_at": record.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Backend;

    fn local_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path(), None).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_sign_in_caches_record() {
        let (_dir, store) = local_store();
        assert!(store.users().current_user().is_none());

        let outcome = store
            .users()
            .sign_in(UserRecord::new("u1", "ana", "clerk"))
            .await
            .unwrap();
        assert_eq!(outcome.backend, Backend::Local);

        let user = store.users().current_user().unwrap();
        assert_eq!(user.username, "ana");
        assert_eq!(user.presence, Presence::Online);
    }

    #[tokio::test]
    async fn test_presence_change_persists() {
        let (_dir, store) = local_store();
        store
            .users()
            .sign_in(UserRecord::new("u1", "ana", "clerk"))
            .await
            .unwrap();

        store.users().set_presence(Presence::Away).await.unwrap();
        assert_eq!(store.users().current_user().unwrap().presence, Presence::Away);
    }

    #[tokio::test]
    async fn test_presence_without_sign_in_is_not_found() {
        let (_dir, store) = local_store();
        let err = store.users().set_presence(Presence::Busy).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_sign_out_clears_record() {
        let (_dir, store) = local_store();
        store
            .users()
            .sign_in(UserRecord::new("u1", "ana", "clerk"))
            .await
            .unwrap();

        store.users().sign_out().await.unwrap();
        assert!(store.users().current_user().is_none());

        // Signing out twice is harmless
        store.users().sign_out().await.unwrap();
    }
}
