//! In-memory collaborators for engine tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::{ContentTypeProbe, ItemStore, Notifier, PageRequest};
use crate::error::{ContestError, ContestResult};
use crate::models::{CandidateItem, EmojiKey, PublishedItem, ThreadRequest};

/// Item store over a newest-first history, recording every side effect
#[derive(Default)]
pub struct FakeStore {
    pub history: Mutex<Vec<CandidateItem>>,
    pub failing_items: Mutex<HashSet<String>>,
    /// Artificial latency of `fetch_item`, per item id
    pub fetch_delays: HashMap<String, Duration>,
    /// Item ids in the order their `fetch_item` calls completed
    pub fetched: Mutex<Vec<String>>,
    /// Page request number (1-based) that fails
    pub fail_page: Option<usize>,
    pub page_calls: AtomicUsize,
    pub published: Mutex<Vec<(String, String)>>,
    pub threads: Mutex<Vec<(String, String, ThreadRequest)>>,
    pub reactions_added: Mutex<Vec<(String, String)>>,
    pub reactions_removed: Mutex<Vec<(String, String, String)>>,
    pub deleted: Mutex<Vec<String>>,
    pub cache: Mutex<HashMap<String, CandidateItem>>,
}

impl FakeStore {
    /// History given in any order; kept newest first
    pub fn with_items(mut items: Vec<CandidateItem>) -> Self {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self {
            history: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemStore for FakeStore {
    async fn fetch_item(
        &self,
        _channel_id: &str,
        item_id: &str,
    ) -> ContestResult<Option<CandidateItem>> {
        if let Some(delay) = self.fetch_delays.get(item_id) {
            tokio::time::sleep(*delay).await;
        }
        self.fetched.lock().unwrap().push(item_id.to_string());
        if self.failing_items.lock().unwrap().contains(item_id) {
            return Err(ContestError::transient("fetch failed"));
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == item_id)
            .cloned())
    }

    async fn fetch_page(
        &self,
        _channel_id: &str,
        request: PageRequest<'_>,
    ) -> ContestResult<Vec<CandidateItem>> {
        let call = self.page_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_page == Some(call) {
            return Err(ContestError::transient("page failed"));
        }

        let history = self.history.lock().unwrap();
        let start = match request.before {
            Some(before) => match history.iter().position(|i| i.id == before) {
                Some(pos) => pos + 1,
                None => history.len(),
            },
            None => 0,
        };
        let page: Vec<CandidateItem> = history
            .iter()
            .skip(start)
            .take(request.limit as usize)
            .cloned()
            .collect();

        if request.populate_cache {
            let mut cache = self.cache.lock().unwrap();
            for item in &page {
                cache.insert(item.id.clone(), item.clone());
            }
        }
        Ok(page)
    }

    async fn publish(&self, channel_id: &str, content: &str) -> ContestResult<PublishedItem> {
        let mut published = self.published.lock().unwrap();
        published.push((channel_id.to_string(), content.to_string()));
        Ok(PublishedItem {
            id: format!("published-{}", published.len()),
            channel_id: channel_id.to_string(),
        })
    }

    async fn open_thread(
        &self,
        channel_id: &str,
        parent_item_id: &str,
        request: &ThreadRequest,
    ) -> ContestResult<()> {
        self.threads.lock().unwrap().push((
            channel_id.to_string(),
            parent_item_id.to_string(),
            request.clone(),
        ));
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel_id: &str,
        item_id: &str,
        emoji: &EmojiKey,
    ) -> ContestResult<()> {
        self.reactions_added
            .lock()
            .unwrap()
            .push((item_id.to_string(), emoji.key().to_string()));
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel_id: &str,
        item_id: &str,
        emoji: &EmojiKey,
        user_id: &str,
    ) -> ContestResult<()> {
        self.reactions_removed.lock().unwrap().push((
            item_id.to_string(),
            emoji.key().to_string(),
            user_id.to_string(),
        ));
        Ok(())
    }

    async fn delete_item(&self, _channel_id: &str, item_id: &str) -> ContestResult<()> {
        self.deleted.lock().unwrap().push(item_id.to_string());
        Ok(())
    }

    async fn channel_name(&self, channel_id: &str) -> ContestResult<Option<String>> {
        Ok(Some(format!("#{}", channel_id)))
    }

    fn cached_item(&self, item_id: &str) -> Option<CandidateItem> {
        self.cache.lock().unwrap().get(item_id).cloned()
    }

    fn remember_item(&self, item: &CandidateItem) {
        self.cache
            .lock()
            .unwrap()
            .insert(item.id.clone(), item.clone());
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl FakeNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, user_id: &str, content: &str) -> ContestResult<()> {
        if self.fail {
            return Err(ContestError::transient("DMs disabled"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), content.to_string()));
        Ok(())
    }
}

/// Content types by URL; unknown URLs are served as HTML
#[derive(Default)]
pub struct FakeProbe {
    pub types: HashMap<String, String>,
}

impl FakeProbe {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        Self {
            types: pairs
                .iter()
                .map(|(url, ct)| (url.to_string(), ct.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl ContentTypeProbe for FakeProbe {
    async fn content_type(&self, url: &str) -> ContestResult<Option<String>> {
        Ok(Some(
            self.types
                .get(url)
                .cloned()
                .unwrap_or_else(|| "text/html".to_string()),
        ))
    }
}
