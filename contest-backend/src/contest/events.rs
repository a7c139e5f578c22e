//! Event bus entry points: item created, deleted, edited and reactions

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::admission::AdmissionGate;
use super::registry::ModuleRegistry;
use super::traits::{ContentTypeProbe, ItemStore, Notifier};
use crate::db::Database;
use crate::error::ContestResult;
use crate::models::{CandidateItem, EmojiKey, ModuleConfig, ReactionEvent, Submission};

pub struct ContestEvents {
    registry: Arc<ModuleRegistry>,
    db: Arc<Database>,
    store: Arc<dyn ItemStore>,
    gate: AdmissionGate,
}

impl ContestEvents {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        db: Arc<Database>,
        store: Arc<dyn ItemStore>,
        probe: Arc<dyn ContentTypeProbe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let gate = AdmissionGate::new(db.clone(), store.clone(), probe, notifier);
        Self {
            registry,
            db,
            store,
            gate,
        }
    }

    /// Whether a module collects submissions in this channel
    pub fn watches(&self, channel_id: &str) -> bool {
        self.registry.for_source_channel(channel_id).is_some()
    }

    /// Module collecting this item, if it is a human post in a group channel
    fn module_for(&self, item: &CandidateItem) -> Option<(Arc<ModuleConfig>, String)> {
        if item.author_is_bot {
            return None;
        }
        let group_id = item.group_id.clone()?;
        let module = self.registry.for_source_channel(&item.channel_id)?;
        Some((module, group_id))
    }

    /// Remove a rejected item when the module asks for it
    async fn delete_rejected(&self, module: &ModuleConfig, item: &CandidateItem, tag: &str) {
        if !module.delete_invalid_submissions {
            return;
        }
        if let Err(e) = self.store.delete_item(&item.channel_id, &item.id).await {
            log::debug!("{} Failed to delete item: {}", tag, e);
        }
    }

    /// Screen a new item and admit it as a submission
    pub async fn on_item_created(
        &self,
        item: &CandidateItem,
        now: DateTime<Utc>,
    ) -> ContestResult<Option<Submission>> {
        let Some((module, group_id)) = self.module_for(item) else {
            return Ok(None);
        };
        let tag = module.tag(&item.id);
        log::debug!("{} New item from {}", tag, item.author_id);

        let admitted = self
            .gate
            .screen(&module, item, &group_id, &now, || {
                self.delete_rejected(&module, item, &tag)
            })
            .await?;
        if !admitted {
            return Ok(None);
        }

        self.gate.admit(&module, item, &group_id, &now).await
    }

    /// Drop the submission of a deleted item. Returns whether one existed.
    pub async fn on_item_deleted(&self, channel_id: &str, item_id: &str) -> ContestResult<bool> {
        let Some(module) = self.registry.for_source_channel(channel_id) else {
            return Ok(false);
        };
        let tag = module.tag(&format!("delete/{}", item_id));

        let Some(submission) = self.db.get_submission_by_item(&module.id, item_id)? else {
            log::debug!("{} Submission not found", tag);
            return Ok(false);
        };

        self.db.delete_submission(submission.id)?;
        log::debug!("{} Submission deleted", tag);
        Ok(true)
    }

    /// Re-run the source checks on an edited submission. Returns whether the
    /// submission is still tracked.
    pub async fn on_item_edited(
        &self,
        old: Option<&CandidateItem>,
        new: &CandidateItem,
    ) -> ContestResult<bool> {
        let Some((module, _)) = self.module_for(new) else {
            return Ok(false);
        };
        let tag = module.tag(&format!("update/{}", new.id));

        let Some(submission) = self.db.get_submission_by_item(&module.id, &new.id)? else {
            log::debug!("{} Submission not found", tag);
            return Ok(false);
        };

        let previous = old.cloned().or_else(|| self.store.cached_item(&new.id));
        if let Some(previous) = previous {
            if previous.content == new.content && previous.attachments == new.attachments {
                log::debug!("{} Content unchanged, skipping", tag);
                return Ok(true);
            }
        }

        let current = match self.store.fetch_item(&new.channel_id, &new.id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                log::debug!("{} Unresolved item, skipping", tag);
                return Ok(true);
            }
            Err(e) => {
                log::debug!("{} Failed to fetch item: {}", tag, e);
                return Ok(true);
            }
        };
        self.store.remember_item(&current);

        self.gate
            .screen_sources(&module, &current, || async {
                self.delete_rejected(&module, &current, &tag).await;
                if let Err(e) = self.db.delete_submission(submission.id) {
                    log::debug!("{} Failed to delete submission: {}", tag, e);
                }
            })
            .await
    }

    /// Remove non-voting reactions in modules that restrict them. Returns
    /// whether a reaction was removed.
    pub async fn on_reaction_added(&self, reaction: &ReactionEvent) -> ContestResult<bool> {
        let Some(module) = self.registry.for_source_channel(&reaction.channel_id) else {
            return Ok(false);
        };
        if !module.restrict_reactions {
            return Ok(false);
        }

        let tag = module.tag(&format!("reaction-add/{}", reaction.item_id));
        if reaction.group_id.is_none() {
            log::debug!("{} Item not in a group", tag);
            return Ok(false);
        }
        let Some(user_id) = reaction.user_id.as_deref() else {
            return Ok(false);
        };
        if reaction.is_voting_emoji(&module.voting_emojis) {
            return Ok(false);
        }

        let shown = match &reaction.emoji {
            EmojiKey::Unicode(s) => s.as_str(),
            EmojiKey::Custom { id, name } => name.as_deref().unwrap_or(id),
        };
        log::debug!(
            "{} Reaction not in module voting emojis, removing \"{}\"",
            tag,
            shown
        );
        self.store
            .remove_reaction(&reaction.channel_id, &reaction.item_id, &reaction.emoji, user_id)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::registry::fixtures::module;
    use crate::contest::testing::{FakeNotifier, FakeProbe, FakeStore};
    use crate::models::item::fixtures::item;
    use crate::models::Attachment;
    use chrono::TimeZone;

    struct Harness {
        events: ContestEvents,
        db: Arc<Database>,
        store: Arc<FakeStore>,
        notifier: Arc<FakeNotifier>,
    }

    fn harness_with(modules: Vec<ModuleConfig>, store: FakeStore) -> Harness {
        let db = Arc::new(Database::in_memory().unwrap());
        let store = Arc::new(store);
        let notifier = Arc::new(FakeNotifier::default());
        let registry = Arc::new(ModuleRegistry::new(modules).unwrap());
        let events = ContestEvents::new(
            registry,
            db.clone(),
            store.clone(),
            Arc::new(FakeProbe::default()),
            notifier.clone(),
        );
        Harness {
            events,
            db,
            store,
            notifier,
        }
    }

    fn harness() -> Harness {
        harness_with(vec![module("cotw")], FakeStore::default())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn clip(id: &str) -> CandidateItem {
        let mut it = item(id, now(), &[]);
        it.attachments = vec![Attachment {
            url: format!("https://cdn.example/{}.mp4", id),
            filename: format!("{}.mp4", id),
            content_type: Some("video/mp4".to_string()),
        }];
        it
    }

    #[tokio::test]
    async fn test_created_valid_item_is_admitted() {
        let h = harness();
        let submission = h.events.on_item_created(&clip("1"), now()).await.unwrap().unwrap();
        assert_eq!(submission.module_id, "cotw");
        assert_eq!(submission.user_id, "author-1");
        assert!(h.db.get_submission_by_item("cotw", "1").unwrap().is_some());
        assert_eq!(h.store.reactions_added.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_created_invalid_item_is_deleted_and_author_notified() {
        let h = harness();
        let bare = item("1", now(), &[]);
        assert!(h.events.on_item_created(&bare, now()).await.unwrap().is_none());
        assert_eq!(h.store.deleted.lock().unwrap().clone(), vec!["1".to_string()]);
        assert_eq!(h.notifier.messages().len(), 1);
        assert!(h.db.get_submission_by_item("cotw", "1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_item_kept_when_deletion_disabled() {
        let mut m = module("cotw");
        m.delete_invalid_submissions = false;
        let h = harness_with(vec![m], FakeStore::default());
        assert!(h.events.on_item_created(&item("1", now(), &[]), now()).await.unwrap().is_none());
        assert!(h.store.deleted.lock().unwrap().is_empty());
        assert!(h.notifier.messages()[0].contains("was not accepted"));
    }

    #[tokio::test]
    async fn test_ignored_items() {
        let h = harness();

        let mut bot = clip("1");
        bot.author_is_bot = true;
        let mut dm = clip("2");
        dm.group_id = None;
        let mut elsewhere = clip("3");
        elsewhere.channel_id = "general".to_string();

        for it in [bot, dm, elsewhere] {
            assert!(h.events.on_item_created(&it, now()).await.unwrap().is_none());
        }
        assert!(h.store.reactions_added.lock().unwrap().is_empty());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_item_drops_submission() {
        let h = harness();
        h.events.on_item_created(&clip("1"), now()).await.unwrap();

        assert!(h.events.on_item_deleted("source", "1").await.unwrap());
        assert!(h.db.get_submission_by_item("cotw", "1").unwrap().is_none());
        assert!(!h.events.on_item_deleted("source", "1").await.unwrap());
        assert!(!h.events.on_item_deleted("general", "1").await.unwrap());
    }

    #[tokio::test]
    async fn test_edit_removing_media_drops_submission() {
        let edited = item("1", now(), &[]);
        let h = harness_with(vec![module("cotw")], FakeStore::with_items(vec![edited.clone()]));
        h.events.on_item_created(&clip("1"), now()).await.unwrap();

        assert!(!h.events.on_item_edited(None, &edited).await.unwrap());
        assert!(h.db.get_submission_by_item("cotw", "1").unwrap().is_none());
        assert_eq!(h.store.deleted.lock().unwrap().clone(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_edit_with_unchanged_media_is_skipped() {
        let h = harness();
        let original = clip("1");
        h.events.on_item_created(&original, now()).await.unwrap();

        // Admission cached the item; no previous version is supplied
        let mut edited = original.clone();
        edited.reactions = vec![("👍".to_string(), 3)];
        assert!(h.events.on_item_edited(None, &edited).await.unwrap());
        assert!(h.db.get_submission_by_item("cotw", "1").unwrap().is_some());
        assert!(h.store.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_of_untracked_item_is_ignored() {
        let h = harness();
        assert!(!h.events.on_item_edited(None, &clip("9")).await.unwrap());
    }

    fn reaction(emoji: EmojiKey) -> ReactionEvent {
        ReactionEvent {
            channel_id: "source".to_string(),
            item_id: "1".to_string(),
            group_id: Some("guild".to_string()),
            user_id: Some("voter".to_string()),
            emoji,
        }
    }

    #[tokio::test]
    async fn test_reaction_restriction() {
        let mut m = module("cotw");
        m.restrict_reactions = true;
        let h = harness_with(vec![m], FakeStore::default());

        assert!(!h
            .events
            .on_reaction_added(&reaction(EmojiKey::Unicode("👍".to_string())))
            .await
            .unwrap());
        assert!(h
            .events
            .on_reaction_added(&reaction(EmojiKey::Unicode("🔥".to_string())))
            .await
            .unwrap());
        assert!(h
            .events
            .on_reaction_added(&reaction(EmojiKey::Custom {
                id: "42".to_string(),
                name: Some("pepe".to_string()),
            }))
            .await
            .unwrap());

        let removed = h.store.reactions_removed.lock().unwrap().clone();
        assert_eq!(
            removed,
            vec![
                ("1".to_string(), "🔥".to_string(), "voter".to_string()),
                ("1".to_string(), "42".to_string(), "voter".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_reactions_unrestricted_by_default() {
        let h = harness();
        assert!(!h
            .events
            .on_reaction_added(&reaction(EmojiKey::Unicode("🔥".to_string())))
            .await
            .unwrap());
        assert!(h.store.reactions_removed.lock().unwrap().is_empty());
    }
}
