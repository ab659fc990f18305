// SPDX-License-Identifier: MPL-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A feed item. Doubles as a marketplace listing when `for_sale` is set
/// and `listing` carries the commerce fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub comment_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub for_sale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<ListingDetails>,
}

impl Post {
    pub fn new(user_id: &str, username: &str, title: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            title: title.to_string(),
            description: String::new(),
            image_url: None,
            tags: Vec::new(),
            like_count: 0,
            comment_count: 0,
            created_at: Utc::now(),
            for_sale: false,
            listing: None,
        }
    }

    /// Mark this post as a marketplace listing.
    pub fn with_listing(mut self, listing: ListingDetails) -> Self {
        self.for_sale = true;
        self.listing = Some(listing);
        self
    }
}

/// Commerce fields carried by a post that is for sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingDetails {
    pub price_cents: i64,
    pub brand: String,
    pub condition: Condition,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub delivery_cents: Option<i64>,
    #[serde(default)]
    pub delivery_method: Option<String>,
    #[serde(default)]
    pub discount_percent: Option<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
    WellLoved,
}

/// A direct-message thread between two collectors.
///
/// Messages are plain append order. Nothing here guarantees delivery or
/// cross-device ordering; the thread is whatever was last written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty thread. Participants are stored sorted so the
    /// same pair always maps to the same thread regardless of who
    /// opened it.
    pub fn between(a: &str, b: &str) -> Self {
        let mut participants = vec![a.to_string(), b.to_string()];
        participants.sort();
        Self {
            id: Uuid::new_v4().to_string(),
            participants,
            messages: Vec::new(),
            last_activity_at: Utc::now(),
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// Whether this thread is between exactly this pair of users.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        let mut pair = vec![a.to_string(), b.to_string()];
        pair.sort();
        self.participants == pair
    }

    pub fn unread_count(&self, reader_id: &str) -> usize {
        self.messages
            .iter()
            .filter(|m| m.receiver_id == reader_id && !m.read)
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender_id: &str, receiver_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            read: false,
            sent_at: Utc::now(),
        }
    }
}

/// Locally cached identity and presence of the signed-in user.
///
/// Created on sign-in, mutated on presence or provider updates, cleared
/// on sign-out. The hosted identity provider is the authority; this is
/// only the client's view of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub provider: String,
    pub presence: Presence,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(user_id: &str, username: &str, provider: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            provider: provider.to_string(),
            presence: Presence::Online,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
    Away,
    Busy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_pair_is_order_independent() {
        let conv = Conversation::between("zoe", "ana");
        assert_eq!(conv.participants, vec!["ana", "zoe"]);
        assert!(conv.is_between("zoe", "ana"));
        assert!(conv.is_between("ana", "zoe"));
        assert!(!conv.is_between("ana", "mel"));
    }

    #[test]
    fn test_unread_count_only_counts_receiver() {
        let mut conv = Conversation::between("ana", "zoe");
        conv.messages.push(Message::new("ana", "zoe", "hi"));
        conv.messages.push(Message::new("zoe", "ana", "hey"));
        let mut read = Message::new("ana", "zoe", "still there?");
        read.read = true;
        conv.messages.push(read);

        assert_eq!(conv.unread_count("zoe"), 1);
        assert_eq!(conv.unread_count("ana"), 1);
    }

    #[test]
    fn test_condition_serializes_snake_case() {
        let json = serde_json::to_string(&Condition::WellLoved).unwrap();
        assert_eq!(json, "\"well_loved\"");
    }

    #[test]
    fn test_listing_roundtrip_keeps_commerce_fields() {
        let post = Post::new("u1", "ana", "Jellycat bunny").with_listing(ListingDetails {
            price_cents: 2500,
            brand: "Jellycat".to_string(),
            condition: Condition::LikeNew,
            material: Some("plush".to_string()),
            delivery_cents: Some(400),
            delivery_method: Some("tracked".to_string()),
            discount_percent: None,
        });

        let json = serde_json::to_string(&post).unwrap();
        let back: Post = serde_json::from_str(&json).unwrap();
        assert!(back.for_sale);
        assert_eq!(back.listing.unwrap().brand, "Jellycat");
    }
}
