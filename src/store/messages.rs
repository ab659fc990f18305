// SPDX-License-Identifier: MPL-2.0

use crate::models::{Conversation, Message};
use crate::retry::with_retry;
use crate::store::{SaveOutcome, Store, StoreError};
use serde_json::{Value, json};
use tracing::warn;

const CONVERSATIONS_TABLE: &str = "conversations";
const MESSAGES_TABLE: &str = "messages";

/// Direct-message operations over the conversations/messages pair.
///
/// The mirror always holds the thread with its messages embedded; the
/// remote keeps the pair of tables. Append order is all there is: no
/// delivery receipts, no ordering across devices.
pub struct MessageStore<'a> {
    store: &'a Store,
}

impl<'a> MessageStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Find the thread between two users, creating it if absent. The
    /// same pair always resolves to the same thread.
    pub async fn get_or_create_conversation(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Conversation, StoreError> {
        if let Some(existing) = self
            .store
            .mirror
            .load_conversations()
            .into_iter()
            .find(|c| c.is_between(a, b))
        {
            return Ok(existing);
        }

        let conversation = Conversation::between(a, b);
        if let Some(remote) = &self.store.remote {
            let row = conversation_row(&conversation);
            if let Err(e) = with_retry(&self.store.policy, || {
                remote.insert_row(CONVERSATIONS_TABLE, &row)
            })
            .await
            {
                warn!("remote conversation create failed, keeping local: {}", e);
            }
        }
        self.store.mirror.upsert_conversation(&conversation);
        Ok(conversation)
    }

    /// Append a message to a thread. The mirror reflects the append in
    /// every case; the outcome says whether the remote saw it too.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<(Message, SaveOutcome), StoreError> {
        let mut conversations = self.store.mirror.load_conversations();
        let Some(conversation) = conversations.iter_mut().find(|c| c.id == conversation_id)
        else {
            return Err(StoreError::NotFound);
        };

        let message = Message::new(sender_id, receiver_id, content);
        conversation.messages.push(message.clone());
        conversation.last_activity_at = message.sent_at;
        let snapshot = conversation.clone();
        self.store.mirror.upsert_conversation(&snapshot);

        let Some(remote) = &self.store.remote else {
            return Ok((message, SaveOutcome::local()));
        };

        let row = message_row(conversation_id, &message);
        match with_retry(&self.store.policy, || {
            remote.insert_row(MESSAGES_TABLE, &row)
        })
        .await
        {
            Ok(()) => {
                self.touch_activity(remote, conversation_id, &message).await;
                self.store.mirror.touch_sync();
                Ok((message, SaveOutcome::remote()))
            }
            Err(e) => {
                warn!("remote message send failed, kept locally: {}", e);
                Ok((message, SaveOutcome::fallback()))
            }
        }
    }

    /// Keep the remote thread row's activity stamp in step with the
    /// message that was just appended. Other devices order threads by
    /// this column. Best effort, single attempt.
    async fn touch_activity(
        &self,
        remote: &crate::remote::RemoteClient,
        conversation_id: &str,
        message: &Message,
    ) {
        let patch = activity_patch(message);
        if let Err(e) = remote
            .update_row(CONVERSATIONS_TABLE, conversation_id, &patch)
            .await
        {
            warn!("thread activity update failed for {}: {}", conversation_id, e);
        }
    }

    /// Mark everything addressed to `reader_id` in a thread as read.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<SaveOutcome, StoreError> {
        let mut conversations = self.store.mirror.load_conversations();
        let Some(conversation) = conversations.iter_mut().find(|c| c.id == conversation_id)
        else {
            return Err(StoreError::NotFound);
        };

        let mut changed = false;
        for message in &mut conversation.messages {
            if message.receiver_id == reader_id && !message.read {
                message.read = true;
                changed = true;
            }
        }
        if changed {
            let snapshot = conversation.clone();
            self.store.mirror.upsert_conversation(&snapshot);
        }

        let Some(remote) = &self.store.remote else {
            return Ok(SaveOutcome::local());
        };

        let conversation_filter = format!("eq.{}", conversation_id);
        let reader_filter = format!("eq.{}", reader_id);
        let filters = [
            ("conversation_id", conversation_filter.as_str()),
            ("receiver_id", reader_filter.as_str()),
            ("read", "eq.false"),
        ];
        let patch = json!({ "read": true });
        match with_retry(&self.store.policy, || {
            remote.update_rows(MESSAGES_TABLE, &filters, &patch)
        })
        .await
        {
            Ok(()) => {
                self.store.mirror.touch_sync();
                Ok(SaveOutcome::remote())
            }
            Err(e) => {
                warn!("remote read-flag update failed, kept locally: {}", e);
                Ok(SaveOutcome::fallback())
            }
        }
    }

    /// All threads involving a user, most recent activity first.
    pub async fn get_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let local: Vec<Conversation> = self
            .store
            .mirror
            .load_conversations()
            .into_iter()
            .filter(|c| c.involves(user_id))
            .collect();
        if !local.is_empty() {
            return Ok(local);
        }

        let Some(remote) = &self.store.remote else {
            return Ok(local);
        };

        let filter = format!("cs.{{{}}}", user_id);
        let filters = [("participants", filter.as_str())];
        let rows = match with_retry(&self.store.policy, || {
            remote.select_rows(CONVERSATIONS_TABLE, &filters)
        })
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("remote conversation fetch failed, serving mirror: {}", e);
                return Ok(local);
            }
        };

        let mut fetched = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(mut conversation) = row_to_conversation(row) else {
                continue;
            };
            let messages = self.fetch_messages(remote, &conversation.id).await;
            conversation.messages = messages;
            fetched.push(conversation);
        }

        self.store.mirror.save_conversations(&fetched);
        Ok(self
            .store
            .mirror
            .load_conversations()
            .into_iter()
            .filter(|c| c.involves(user_id))
            .collect())
    }

    async fn fetch_messages(
        &self,
        remote: &crate::remote::RemoteClient,
        conversation_id: &str,
    ) -> Vec<Message> {
        let filter = format!("eq.{}", conversation_id);
        let filters = [
            ("conversation_id", filter.as_str()),
            ("order", "sent_at.asc"),
        ];
        match with_retry(&self.store.policy, || {
            remote.select_rows(MESSAGES_TABLE, &filters)
        })
        .await
        {
            Ok(rows) => rows.iter().filter_map(row_to_message).collect(),
            Err(e) => {
                warn!("message fetch failed for thread {}: {}", conversation_id, e);
                Vec::new()
            }
        }
    }
}

fn activity_patch(message: &Message) -> Value {
    json!({ "last_activity_at": message.sent_at })
}

fn conversation_row(conversation: &Conversation) -> Value {
    json!({
        "id": conversation.id,
        "participants": conversation.participants,
        "last_activity_at": conversation.last_activity_at,
    })
}

fn message_row(conversation_id: &str, message: &Message) -> Value {
    json!({
        "id": message.id,
        "conversation_id": conversation_id,
        "sender_id": message.sender_id,
        "receiver_id": message.receiver_id,
        "content": message.content,
        "read": message.read,
        "sent_at": message.sent_at,
    })
}

fn row_to_conversation(row: &Value) -> Option<Conversation> {
    match serde_json::from_value(row.clone()) {
        Ok(conversation) => Some(conversation),
        Err(e) => {
            warn!("skipping undecodable conversation row: {}", e);
            None
        }
    }
}

fn row_to_message(row: &Value) -> Option<Message> {
    match serde_json::from_value(row.clone()) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("skipping undecodable message row: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path(), None).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_same_pair_resolves_to_same_thread() {
        let (_dir, store) = local_store();

        let first = store
            .messages()
            .get_or_create_conversation("ana", "zoe")
            .await
            .unwrap();
        let second = store
            .messages()
            .get_or_create_conversation("zoe", "ana")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let third = store
            .messages()
            .get_or_create_conversation("ana", "mel")
            .await
            .unwrap();
        assert_ne!(first.id, third.id);
    }

    #[tokio::test]
    async fn test_send_appends_in_order() {
        let (_dir, store) = local_store();
        let conv = store
            .messages()
            .get_or_create_conversation("ana", "zoe")
            .await
            .unwrap();

        store
            .messages()
            .send_message(&conv.id, "ana", "zoe", "is the bunny still available?")
            .await
            .unwrap();
        store
            .messages()
            .send_message(&conv.id, "zoe", "ana", "it is!")
            .await
            .unwrap();

        let threads = store.messages().get_conversations("ana").await.unwrap();
        assert_eq!(threads.len(), 1);
        let messages = &threads[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "is the bunny still available?");
        assert_eq!(messages[1].content, "it is!");
    }

    #[tokio::test]
    async fn test_send_to_unknown_thread_is_not_found() {
        let (_dir, store) = local_store();
        let err = store
            .messages()
            .send_message("no-such-thread", "ana", "zoe", "hello?")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_mark_read_only_flips_receiver_side() {
        let (_dir, store) = local_store();
        let conv = store
            .messages()
            .get_or_create_conversation("ana", "zoe")
            .await
            .unwrap();
        store
            .messages()
            .send_message(&conv.id, "ana", "zoe", "ping")
            .await
            .unwrap();
        store
            .messages()
            .send_message(&conv.id, "zoe", "ana", "pong")
            .await
            .unwrap();

        store.messages().mark_read(&conv.id, "zoe").await.unwrap();

        let threads = store.messages().get_conversations("zoe").await.unwrap();
        assert_eq!(threads[0].unread_count("zoe"), 0);
        assert_eq!(threads[0].unread_count("ana"), 1);
    }

    #[tokio::test]
    async fn test_send_advances_thread_activity_stamp() {
        let (_dir, store) = local_store();
        let conv = store
            .messages()
            .get_or_create_conversation("ana", "zoe")
            .await
            .unwrap();
        let created_at = conv.last_activity_at;

        let (message, _) = store
            .messages()
            .send_message(&conv.id, "ana", "zoe", "new arrival!")
            .await
            .unwrap();

        // The thread's stamp and the remote patch both carry the
        // appended message's send time, so every replica orders threads
        // the same way.
        let threads = store.messages().get_conversations("ana").await.unwrap();
        assert_eq!(threads[0].last_activity_at, message.sent_at);
        assert!(threads[0].last_activity_at >= created_at);
        assert_eq!(
            activity_patch(&message)["last_activity_at"],
            json!(message.sent_at)
        );
    }

    #[tokio::test]
    async fn test_threads_ordered_by_activity() {
        let (_dir, store) = local_store();
        let first = store
            .messages()
            .get_or_create_conversation("ana", "zoe")
            .await
            .unwrap();
        let second = store
            .messages()
            .get_or_create_conversation("ana", "mel")
            .await
            .unwrap();

        // Activity in the older thread bumps it to the top
        store
            .messages()
            .send_message(&first.id, "ana", "zoe", "bump")
            .await
            .unwrap();

        let threads = store.messages().get_conversations("ana").await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, first.id);
        assert_eq!(threads[1].id, second.id);
    }
}
