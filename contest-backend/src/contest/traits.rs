//! Collaborator seams the engine talks to

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ContestResult;
use crate::models::{CandidateItem, EmojiKey, PublishedItem, ThreadRequest};

/// One page request against the remote item history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest<'a> {
    /// Only items older than this one; `None` starts at the newest item
    pub before: Option<&'a str>,
    pub limit: u8,
    /// Keep the returned items in the store's local cache
    pub populate_cache: bool,
}

/// The remote, paginated item store (a chat platform's message API)
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetch a live item, `Ok(None)` when it no longer exists
    async fn fetch_item(&self, channel_id: &str, item_id: &str)
    -> ContestResult<Option<CandidateItem>>;

    /// Items older than the cursor, newest first
    async fn fetch_page(
        &self,
        channel_id: &str,
        request: PageRequest<'_>,
    ) -> ContestResult<Vec<CandidateItem>>;

    async fn publish(&self, channel_id: &str, content: &str) -> ContestResult<PublishedItem>;

    async fn open_thread(
        &self,
        channel_id: &str,
        parent_item_id: &str,
        request: &ThreadRequest,
    ) -> ContestResult<()>;

    async fn add_reaction(&self, channel_id: &str, item_id: &str, emoji: &EmojiKey)
    -> ContestResult<()>;

    async fn remove_reaction(
        &self,
        channel_id: &str,
        item_id: &str,
        emoji: &EmojiKey,
        user_id: &str,
    ) -> ContestResult<()>;

    async fn delete_item(&self, channel_id: &str, item_id: &str) -> ContestResult<()>;

    /// Display name of a channel, `Ok(None)` when it cannot be resolved
    async fn channel_name(&self, channel_id: &str) -> ContestResult<Option<String>>;

    /// Previously seen version of an item, if the store kept one
    fn cached_item(&self, _item_id: &str) -> Option<CandidateItem> {
        None
    }

    /// Remember an item so later edits can be compared against it
    fn remember_item(&self, _item: &CandidateItem) {}
}

/// Private notification channel to a user
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, content: &str) -> ContestResult<()>;
}

/// Resolves the content type served at a URL
#[async_trait]
pub trait ContentTypeProbe: Send + Sync {
    /// `Ok(None)` when the server does not declare one
    async fn content_type(&self, url: &str) -> ContestResult<Option<String>>;
}

/// Upper bound for a single private notification
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Send a private notification without letting its outcome affect the caller.
///
/// Best effort: failures and timeouts are logged and swallowed.
pub async fn notify_best_effort(notifier: &Arc<dyn Notifier>, user_id: &str, content: &str) {
    match tokio::time::timeout(NOTIFY_TIMEOUT, notifier.notify(user_id, content)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::debug!("Failed to notify user {}: {}", user_id, e),
        Err(_) => log::debug!(
            "Notifying user {} timed out after {}s",
            user_id,
            NOTIFY_TIMEOUT.as_secs()
        ),
    }
}
