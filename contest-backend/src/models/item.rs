//! Items as seen from the remote item store (messages, in Discord terms)

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
}

/// Emoji of a reaction: unicode, or a custom emoji addressed by id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EmojiKey {
    Unicode(String),
    Custom { id: String, name: Option<String> },
}

impl EmojiKey {
    /// Key used for reaction lookups and voting emoji configuration
    pub fn key(&self) -> &str {
        match self {
            EmojiKey::Unicode(s) => s,
            EmojiKey::Custom { id, .. } => id,
        }
    }

    /// Parse a configured emoji: all-digit strings are custom emoji ids
    pub fn from_config(value: &str) -> Self {
        if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            EmojiKey::Custom {
                id: value.to_string(),
                name: None,
            }
        } else {
            EmojiKey::Unicode(value.to_string())
        }
    }
}

/// A live item fetched from the remote store
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    /// How to reference the author in published output
    pub author_mention: String,
    pub author_is_bot: bool,
    pub channel_id: String,
    /// Server the item was posted in, `None` for private conversations
    pub group_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Reaction counts keyed by `EmojiKey::key`, in display order
    pub reactions: Vec<(String, u64)>,
    pub attachments: Vec<Attachment>,
    pub content: String,
    pub permalink: String,
}

impl CandidateItem {
    /// Current count for an emoji key, 0 when nobody reacted with it
    pub fn reaction_count(&self, emoji: &str) -> u64 {
        self.reactions
            .iter()
            .find(|(key, _)| key == emoji)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// Inline links: whitespace separated words starting with `http`
    pub fn links(&self) -> Vec<&str> {
        self.content
            .split_whitespace()
            .filter(|word| word.starts_with("http"))
            .collect()
    }
}

/// A reaction added by a user
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub channel_id: String,
    pub item_id: String,
    pub group_id: Option<String>,
    pub user_id: Option<String>,
    pub emoji: EmojiKey,
}

impl ReactionEvent {
    /// Whether the emoji is one of the module's voting emojis, by name or id
    pub fn is_voting_emoji(&self, emojis: &super::VotingEmojis) -> bool {
        match &self.emoji {
            EmojiKey::Unicode(s) => emojis.contains(s),
            EmojiKey::Custom { id, name } => {
                emojis.contains(id) || name.as_deref().is_some_and(|n| emojis.contains(n))
            }
        }
    }
}

/// Reference to a message the engine published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedItem {
    pub id: String,
    pub channel_id: String,
}

/// Parameters for opening a thread on an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRequest {
    pub name: String,
    pub auto_archive_minutes: Option<u16>,
    pub rate_limit_per_user: Option<u16>,
    pub reason: Option<String>,
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VotingEmojis;

    #[test]
    fn test_reaction_count_missing_is_zero() {
        let item = fixtures::item("1", Utc::now(), &[("👍", 4)]);
        assert_eq!(item.reaction_count("👍"), 4);
        assert_eq!(item.reaction_count("👎"), 0);
    }

    #[test]
    fn test_links() {
        let mut item = fixtures::item("1", Utc::now(), &[]);
        item.content = "look https://imgur.com/gallery/a and\nhttp://x.y/z not-a-link".to_string();
        assert_eq!(item.links(), vec!["https://imgur.com/gallery/a", "http://x.y/z"]);
    }

    #[test]
    fn test_voting_emoji_by_name_or_id() {
        let emojis = VotingEmojis {
            upvote: "👍".to_string(),
            downvote: "998877".to_string(),
        };
        let mut event = ReactionEvent {
            channel_id: "c".to_string(),
            item_id: "i".to_string(),
            group_id: None,
            user_id: Some("u".to_string()),
            emoji: EmojiKey::Unicode("👍".to_string()),
        };
        assert!(event.is_voting_emoji(&emojis));

        event.emoji = EmojiKey::Custom {
            id: "998877".to_string(),
            name: Some("downvote".to_string()),
        };
        assert!(event.is_voting_emoji(&emojis));

        event.emoji = EmojiKey::Unicode("🔥".to_string());
        assert!(!event.is_voting_emoji(&emojis));
    }

    #[test]
    fn test_emoji_from_config() {
        assert_eq!(EmojiKey::from_config("👍"), EmojiKey::Unicode("👍".to_string()));
        assert_eq!(
            EmojiKey::from_config("123"),
            EmojiKey::Custom {
                id: "123".to_string(),
                name: None
            }
        );
    }
}
