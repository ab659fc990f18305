// SPDX-License-Identifier: MPL-2.0

use crate::models::Post;
use crate::remote::RemoteError;
use crate::retry::with_retry;
use crate::store::{SaveOutcome, Store, StoreError};
use serde_json::{Value, json};
use tracing::{debug, warn};

const POSTS_TABLE: &str = "posts";

/// Post and marketplace-listing operations.
///
/// There is exactly one persistence path for posts whether or not they
/// are for sale: one table, id/user_id/created_at columns plus the full
/// record in a `content` JSON column. Listing calls are filters and
/// validation over that same path.
pub struct PostStore<'a> {
    store: &'a Store,
}

impl<'a> PostStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Persist a new post: remote when configured, mirror otherwise,
    /// mirror fallback when the remote write cannot be completed.
    pub async fn add_post(&self, post: Post) -> Result<SaveOutcome, StoreError> {
        let Some(remote) = &self.store.remote else {
            self.store.mirror.upsert_posts(std::slice::from_ref(&post));
            return Ok(SaveOutcome::local());
        };

        let row = post_row(&post);
        match with_retry(&self.store.policy, || remote.insert_row(POSTS_TABLE, &row)).await {
            Ok(()) => {
                self.store.mirror.upsert_posts(&[post]);
                Ok(SaveOutcome::remote())
            }
            Err(e) => {
                warn!("remote insert failed, keeping post locally: {}", e);
                self.store.mirror.upsert_posts(&[post]);
                Ok(SaveOutcome::fallback())
            }
        }
    }

    /// Update an existing post. A missing record is the one failure
    /// that propagates instead of degrading.
    pub async fn update_post(&self, post: Post) -> Result<SaveOutcome, StoreError> {
        let Some(remote) = &self.store.remote else {
            let known = self.store.mirror.load_posts();
            if !known.iter().any(|p| p.id == post.id) {
                return Err(StoreError::NotFound);
            }
            self.store.mirror.upsert_posts(std::slice::from_ref(&post));
            return Ok(SaveOutcome::local());
        };

        let row = post_row(&post);
        match with_retry(&self.store.policy, || {
            remote.update_row(POSTS_TABLE, &post.id, &row)
        })
        .await
        {
            Ok(()) => {
                self.store.mirror.upsert_posts(&[post]);
                Ok(SaveOutcome::remote())
            }
            Err(RemoteError::NotFound) => Err(StoreError::NotFound),
            Err(e) => {
                warn!("remote update failed, keeping post locally: {}", e);
                self.store.mirror.upsert_posts(&[post]);
                Ok(SaveOutcome::fallback())
            }
        }
    }

    /// Delete a post. The uploaded image goes first; losing that fight
    /// is logged and does not block the record delete.
    pub async fn delete_post(&self, id: &str) -> Result<SaveOutcome, StoreError> {
        self.remove_image_for(id).await;

        let Some(remote) = &self.store.remote else {
            self.store.mirror.remove_post(id);
            return Ok(SaveOutcome::local());
        };

        match with_retry(&self.store.policy, || remote.delete_row(POSTS_TABLE, id)).await {
            Ok(()) => {
                self.store.mirror.remove_post(id);
                Ok(SaveOutcome::remote())
            }
            Err(e) => {
                warn!("remote delete failed, removing post locally: {}", e);
                self.store.mirror.remove_post(id);
                Ok(SaveOutcome::fallback())
            }
        }
    }

    /// Persist a batch (remote upsert merges on id conflicts).
    pub async fn save_posts(&self, posts: &[Post]) -> Result<SaveOutcome, StoreError> {
        let Some(remote) = &self.store.remote else {
            self.store.mirror.upsert_posts(posts);
            return Ok(SaveOutcome::local());
        };

        let rows: Vec<Value> = posts.iter().map(post_row).collect();
        match with_retry(&self.store.policy, || remote.upsert_rows(POSTS_TABLE, &rows)).await {
            Ok(()) => {
                self.store.mirror.upsert_posts(posts);
                Ok(SaveOutcome::remote())
            }
            Err(e) => {
                warn!("remote batch save failed, keeping posts locally: {}", e);
                self.store.mirror.upsert_posts(posts);
                Ok(SaveOutcome::fallback())
            }
        }
    }

    /// All posts by one user, newest first. The mirror answers when it
    /// can; only an empty mirror goes to the remote, and what comes
    /// back is mirrored before returning.
    pub async fn get_all_user_posts(&self, user_id: &str) -> Result<Vec<Post>, StoreError> {
        let local: Vec<Post> = self
            .store
            .mirror
            .load_posts()
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect();
        if !local.is_empty() {
            return Ok(local);
        }

        let Some(remote) = &self.store.remote else {
            return Ok(local);
        };

        let filter = format!("eq.{}", user_id);
        let filters = [("user_id", filter.as_str())];
        let rows = match with_retry(&self.store.policy, || {
            remote.select_rows(POSTS_TABLE, &filters)
        })
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("remote fetch failed, serving mirror: {}", e);
                return Ok(local);
            }
        };

        let fetched: Vec<Post> = rows.iter().filter_map(row_to_post).collect();
        self.store.mirror.upsert_posts(&fetched);
        Ok(self
            .store
            .mirror
            .load_posts()
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect())
    }

    /// The whole feed, newest first.
    pub async fn get_feed(&self) -> Result<Vec<Post>, StoreError> {
        let local = self.store.mirror.load_posts();
        if !local.is_empty() {
            return Ok(local);
        }

        let Some(remote) = &self.store.remote else {
            return Ok(local);
        };

        let rows = match with_retry(&self.store.policy, || remote.select_rows(POSTS_TABLE, &[]))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("remote fetch failed, serving mirror: {}", e);
                return Ok(local);
            }
        };

        let fetched: Vec<Post> = rows.iter().filter_map(row_to_post).collect();
        self.store.mirror.upsert_posts(&fetched);
        Ok(self.store.mirror.load_posts())
    }

    /// Persist a marketplace listing. Listings are posts; this only
    /// adds the commerce validation.
    pub async fn add_listing(&self, post: Post) -> Result<SaveOutcome, StoreError> {
        let Some(listing) = &post.listing else {
            return Err(StoreError::InvalidListing(
                "post carries no listing details".into(),
            ));
        };
        if !post.for_sale {
            return Err(StoreError::InvalidListing(
                "post is not marked for sale".into(),
            ));
        }
        if listing.price_cents < 0 {
            return Err(StoreError::InvalidListing("negative price".into()));
        }
        self.add_post(post).await
    }

    /// Marketplace view: for-sale posts of one brand, newest first.
    pub async fn get_brand_listings(&self, brand: &str) -> Result<Vec<Post>, StoreError> {
        let feed = self.get_feed().await?;
        Ok(feed
            .into_iter()
            .filter(|p| {
                p.for_sale
                    && p.listing
                        .as_ref()
                        .is_some_and(|l| l.brand.eq_ignore_ascii_case(brand))
            })
            .collect())
    }

    /// Upload image bytes for a post and return the public URL, or
    /// `None` when running local-only (nowhere to host them).
    pub async fn upload_image(
        &self,
        post_id: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<Option<String>, StoreError> {
        let Some(bucket) = &self.store.bucket else {
            return Ok(None);
        };
        let subtype = mime_type.rsplit('/').next().unwrap_or("bin");
        let name = format!("{}.{}", post_id, subtype);
        let url = bucket.upload_image(&name, bytes, mime_type).await?;
        self.store.mirror.touch_sync();
        Ok(Some(url))
    }

    /// Best-effort image removal ahead of a record delete. The mirror
    /// is asked first; on a fresh session the remote row is consulted
    /// so a post never seen locally still loses its image.
    async fn remove_image_for(&self, id: &str) {
        let Some(bucket) = &self.store.bucket else {
            return;
        };

        let mut image_url = self
            .store
            .mirror
            .load_posts()
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| p.image_url.clone());
        if image_url.is_none()
            && let Some(remote) = &self.store.remote
        {
            image_url = self.lookup_remote_image(remote, id).await;
        }

        let Some(url) = image_url else {
            return;
        };
        match bucket.object_name(&url) {
            Some(name) => {
                if let Err(e) = bucket.remove_image(&name).await {
                    warn!(
                        "image removal failed for {}, deleting record anyway: {}",
                        name, e
                    );
                }
            }
            None => debug!("post image not in our bucket, skipping removal: {}", url),
        }
    }

    /// Single-attempt row lookup for the image URL of a post the mirror
    /// does not know.
    async fn lookup_remote_image(
        &self,
        remote: &crate::remote::RemoteClient,
        id: &str,
    ) -> Option<String> {
        let filter = format!("eq.{}", id);
        match remote.select_rows(POSTS_TABLE, &[("id", filter.as_str())]).await {
            Ok(rows) => rows
                .iter()
                .filter_map(row_to_post)
                .next()
                .and_then(|p| p.image_url),
            Err(e) => {
                debug!("image lookup failed for {}, skipping removal: {}", id, e);
                None
            }
        }
    }
}

fn post_row(post: &Post) -> Value {
    json!({
        "id": post.id,
        "user_id": post.user_id,
        "created_at": post.created_at,
        "content": post,
    })
}

fn row_to_post(row: &Value) -> Option<Post> {
    let content = row.get("content")?;
    match serde_json::from_value(content.clone()) {
        Ok(post) => Some(post),
        Err(e) => {
            warn!("skipping undecodable post row: {}", e);
            None
        }
    }
}
