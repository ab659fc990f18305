// SPDX-License-Identifier: MPL-2.0

use crate::mirror::{
    DurableTier, KEY_CONVERSATIONS, KEY_LAST_SYNC, KEY_POSTS, KEY_USER, MirrorError, SessionTier,
    StorageTier, sync,
};
use crate::models::{Conversation, Post, UserRecord};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// The local mirror: typed collection storage over the two tiers.
///
/// Reads prefer the session tier and promote durable hits into it.
/// Writes go to both tiers and refresh the sync timestamp. Every
/// collection is deduplicated by id keeping the latest timestamp, so a
/// record rewritten by any writer wins by recency and nothing else
/// (last write wins; a cache policy, not a consistency guarantee).
///
/// Nothing in here returns an error after open: serialization and
/// storage failures are logged and read as "no data".
pub struct LocalMirror {
    session: SessionTier,
    durable: DurableTier,
}

impl LocalMirror {
    pub fn open(user_id: &str) -> Result<Self, MirrorError> {
        Ok(Self {
            session: SessionTier::new(),
            durable: DurableTier::open(user_id)?,
        })
    }

    /// Open with the durable tier at an explicit directory.
    pub fn open_at(dir: &Path) -> Result<Self, MirrorError> {
        Ok(Self {
            session: SessionTier::new(),
            durable: DurableTier::open_at(dir)?,
        })
    }

    // -- posts ---------------------------------------------------------

    /// Replace the post collection. Input is deduplicated by id keeping
    /// the newest `created_at` before serialization.
    pub fn save_posts(&self, posts: &[Post]) {
        let deduped = dedup_posts(posts.to_vec());
        self.write_collection(KEY_POSTS, &deduped);
    }

    /// Merge records into the existing collection (incoming entries win
    /// over mirrored ones of the same id only when newer).
    pub fn upsert_posts(&self, incoming: &[Post]) {
        let mut merged = self.load_posts();
        merged.extend_from_slice(incoming);
        self.save_posts(&merged);
    }

    /// Load posts newest-first. Corrupt data reads as empty.
    pub fn load_posts(&self) -> Vec<Post> {
        let Some(json) = self.read_key(KEY_POSTS) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<Post>>(&json) {
            // Dedup again defensively; older mirrors may predate it
            Ok(posts) => dedup_posts(posts),
            Err(e) => {
                warn!("discarding corrupt mirrored posts: {}", e);
                Vec::new()
            }
        }
    }

    pub fn remove_post(&self, id: &str) {
        let mut posts = self.load_posts();
        posts.retain(|p| p.id != id);
        self.write_collection(KEY_POSTS, &posts);
    }

    // -- conversations -------------------------------------------------

    pub fn save_conversations(&self, conversations: &[Conversation]) {
        let deduped = dedup_conversations(conversations.to_vec());
        self.write_collection(KEY_CONVERSATIONS, &deduped);
    }

    /// Insert or replace a single thread by id.
    pub fn upsert_conversation(&self, conversation: &Conversation) {
        let mut all = self.load_conversations();
        all.retain(|c| c.id != conversation.id);
        all.push(conversation.clone());
        self.save_conversations(&all);
    }

    pub fn load_conversations(&self) -> Vec<Conversation> {
        let Some(json) = self.read_key(KEY_CONVERSATIONS) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<Conversation>>(&json) {
            Ok(conversations) => dedup_conversations(conversations),
            Err(e) => {
                warn!("discarding corrupt mirrored conversations: {}", e);
                Vec::new()
            }
        }
    }

    // -- user record ---------------------------------------------------

    pub fn set_user(&self, record: &UserRecord) {
        match serde_json::to_string(record) {
            Ok(json) => self.write_key(KEY_USER, &json),
            Err(e) => warn!("failed to serialize user record: {}", e),
        }
    }

    pub fn user(&self) -> Option<UserRecord> {
        let json = self.read_key(KEY_USER)?;
        match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("discarding corrupt mirrored user record: {}", e);
                None
            }
        }
    }

    pub fn clear_user(&self) {
        self.session.remove(KEY_USER);
        self.durable.remove(KEY_USER);
        self.touch_sync();
    }

    // -- sync timestamp ------------------------------------------------

    /// Record "something was just written", here or remotely.
    pub fn touch_sync(&self) {
        let stamp = sync::now_stamp();
        self.durable.set(KEY_LAST_SYNC, &stamp);
        self.session.set(KEY_LAST_SYNC, &stamp);
    }

    pub fn last_sync(&self) -> Option<String> {
        self.session
            .get(KEY_LAST_SYNC)
            .or_else(|| self.durable.get(KEY_LAST_SYNC))
    }

    // -- internals -----------------------------------------------------

    fn write_collection<T: serde::Serialize>(&self, key: &str, records: &[T]) {
        match serde_json::to_string(records) {
            Ok(json) => self.write_key(key, &json),
            Err(e) => warn!("failed to serialize {}: {}", key, e),
        }
    }

    fn write_key(&self, key: &str, value: &str) {
        self.durable.set(key, value);
        self.session.set(key, value);
        self.touch_sync();
    }

    fn read_key(&self, key: &str) -> Option<String> {
        self.ensure_session_fresh();

        if let Some(value) = self.session.get(key) {
            return Some(value);
        }
        let value = self.durable.get(key)?;
        // Promote durable hits so repeat reads stay in memory
        self.session.set(key, &value);
        Some(value)
    }

    /// Discard the session tier if the last write is over a day old.
    fn ensure_session_fresh(&self) {
        if self.session.is_empty() {
            return;
        }
        let stamp = self
            .session
            .get(KEY_LAST_SYNC)
            .or_else(|| self.durable.get(KEY_LAST_SYNC));
        let stale = match stamp {
            Some(stamp) => sync::is_stale(&stamp, Utc::now()),
            None => true,
        };
        if stale {
            debug!("sync timestamp stale, discarding session tier");
            self.session.clear();
        }
    }
}

/// Keep the newest record per id, newest first overall.
fn dedup_posts(posts: Vec<Post>) -> Vec<Post> {
    let mut by_id: HashMap<String, Post> = HashMap::with_capacity(posts.len());
    for post in posts {
        match by_id.get(&post.id) {
            Some(existing) if existing.created_at > post.created_at => {}
            _ => {
                by_id.insert(post.id.clone(), post);
            }
        }
    }
    let mut deduped: Vec<Post> = by_id.into_values().collect();
    deduped.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    deduped
}

/// Same policy for threads, keyed on last activity.
fn dedup_conversations(conversations: Vec<Conversation>) -> Vec<Conversation> {
    let mut by_id: HashMap<String, Conversation> = HashMap::with_capacity(conversations.len());
    for conversation in conversations {
        match by_id.get(&conversation.id) {
            Some(existing) if existing.last_activity_at > conversation.last_activity_at => {}
            _ => {
                by_id.insert(conversation.id.clone(), conversation);
            }
        }
    }
    let mut deduped: Vec<Conversation> = by_id.into_values().collect();
    deduped.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then(a.id.cmp(&b.id))
    });
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mirror() -> (tempfile::TempDir, LocalMirror) {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::open_at(dir.path()).unwrap();
        (dir, mirror)
    }

    fn post(id: &str, minutes_ago: i64) -> Post {
        let mut p = Post::new("u1", "ana", id);
        p.id = id.to_string();
        p.created_at = Utc::now() - Duration::minutes(minutes_ago);
        p
    }

    #[test]
    fn test_load_after_save_is_unique_and_newest_first() {
        let (_dir, mirror) = mirror();
        mirror.save_posts(&[post("a", 30), post("b", 10), post("c", 20), post("b", 5)]);

        let loaded = mirror.load_posts();
        let ids: Vec<&str> = loaded.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_duplicate_id_keeps_later_timestamp() {
        let (_dir, mirror) = mirror();

        let mut older = post("p1", 60);
        older.title = "old title".to_string();
        let mut newer = post("p1", 1);
        newer.title = "new title".to_string();

        mirror.save_posts(&[older]);
        mirror.upsert_posts(&[newer]);

        let loaded = mirror.load_posts();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "new title");
    }

    #[test]
    fn test_stale_incoming_record_does_not_clobber() {
        let (_dir, mirror) = mirror();

        let mut newer = post("p1", 1);
        newer.title = "current".to_string();
        mirror.save_posts(&[newer]);

        let mut older = post("p1", 120);
        older.title = "from yesterday's tab".to_string();
        mirror.upsert_posts(&[older]);

        assert_eq!(mirror.load_posts()[0].title, "current");
    }

    #[test]
    fn test_remove_post() {
        let (_dir, mirror) = mirror();
        mirror.save_posts(&[post("a", 1), post("b", 2)]);
        mirror.remove_post("a");

        let loaded = mirror.load_posts();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "b");
    }

    #[test]
    fn test_corrupt_posts_read_as_empty() {
        let (_dir, mirror) = mirror();
        mirror.durable.set(KEY_POSTS, "{not json");
        assert!(mirror.load_posts().is_empty());
    }

    #[test]
    fn test_durable_hit_promoted_to_session() {
        let (_dir, mirror) = mirror();
        mirror.save_posts(&[post("a", 1)]);
        mirror.session.clear();

        assert_eq!(mirror.load_posts().len(), 1);
        assert!(!mirror.session.is_empty());
    }

    #[test]
    fn test_stale_sync_discards_session_tier() {
        let (_dir, mirror) = mirror();
        mirror.save_posts(&[post("a", 1)]);

        // Session holds newer data than durable; go behind the mirror's
        // back so only the session copy differs
        mirror.session.set(KEY_POSTS, "[]");
        let old = (Utc::now() - Duration::seconds(sync::SESSION_TTL_SECS + 60))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        mirror.session.set(KEY_LAST_SYNC, &old);
        mirror.durable.set(KEY_LAST_SYNC, &old);

        // Stale session is dropped, read falls through to durable
        assert_eq!(mirror.load_posts().len(), 1);
    }

    #[test]
    fn test_save_refreshes_sync_timestamp() {
        let (_dir, mirror) = mirror();
        assert!(mirror.last_sync().is_none());
        mirror.save_posts(&[post("a", 1)]);
        assert!(mirror.last_sync().is_some());
    }

    #[test]
    fn test_user_record_lifecycle() {
        let (_dir, mirror) = mirror();
        assert!(mirror.user().is_none());

        let record = crate::models::UserRecord::new("u1", "ana", "clerk");
        mirror.set_user(&record);
        assert_eq!(mirror.user().unwrap().username, "ana");

        mirror.clear_user();
        assert!(mirror.user().is_none());
    }

    #[test]
    fn test_conversation_upsert_replaces_by_id() {
        let (_dir, mirror) = mirror();
        let mut conv = Conversation::between("ana", "zoe");
        mirror.upsert_conversation(&conv);

        conv.messages.push(crate::models::Message::new("ana", "zoe", "hi"));
        conv.last_activity_at = Utc::now();
        mirror.upsert_conversation(&conv);

        let loaded = mirror.load_conversations();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].messages.len(), 1);
    }
}
