//! Admission of new submissions: source validation, quotas and cooldowns
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. at least one allowed media source, and no more linked sources than the
//!    module allows per submission
//! 2. every inline link serves the module's media kind
//! 3. attachment count within the per-submission limit
//! 4. every attachment declares the module's media kind
//! 5. group-wide quota, per-user quota and cooldown for the current period
//!
//! The gate never deletes anything itself. A rejection notifies the author
//! (best effort) and then runs the caller's reject action.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use super::period::PeriodCalculator;
use super::template;
use super::traits::{notify_best_effort, ContentTypeProbe, ItemStore, Notifier};
use crate::db::Database;
use crate::error::{ContestError, ContestResult};
use crate::models::{
    CandidateItem, EmojiKey, ModuleConfig, NewSubmission, Submission, ThreadRequest,
};

fn bullet_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("- {}", name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Why a submission was turned away; `Display` is the user-facing reason
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error(
        "it did not contain a valid media source. Please ensure your submission contains at least one of the following:\n\n{}",
        bullet_list(.allowed)
    )]
    NoMediaSource { allowed: Vec<String> },

    #[error(
        "it linked {found} media sources. Please ensure your submission contains no more than {limit}."
    )]
    TooManySources { found: usize, limit: u32 },

    #[error(
        "it did not contain a valid {expected} URL ({url} is {content_type}). Please ensure your submission contains a valid {expected} URL."
    )]
    InvalidLink {
        url: String,
        content_type: String,
        expected: &'static str,
    },

    #[error(
        "it contained too many attachments. Please ensure your submission contains no more than {limit} attachments."
    )]
    TooManyAttachments { limit: u32 },

    #[error(
        "it contained invalid attachments. Please ensure your submission only contains {expected} attachments."
    )]
    InvalidAttachments { expected: &'static str },

    #[error("the module has reached its submission limit. Please try again later.")]
    ModuleLimitReached { limit: u32 },

    #[error("you have reached your submission limit. Please try again later.")]
    UserLimitReached { limit: u32 },

    #[error("you are on cooldown. Please try again in {remaining_secs} seconds.")]
    Cooldown { remaining_secs: i64 },
}

/// Outcome of a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(Rejection),
}

/// Seconds until `ready_at`, rounded up
fn seconds_until(ready_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (ready_at - now).num_milliseconds();
    (ms + 999).div_euclid(1000)
}

/// When a cooldown started at `from` runs out, `None` without a cooldown
fn cooldown_end(
    module: &ModuleConfig,
    from: DateTime<Utc>,
) -> ContestResult<Option<DateTime<Utc>>> {
    let Some(cooldown) = module.cooldown()? else {
        return Ok(None);
    };
    from.checked_add_signed(cooldown).map(Some).ok_or_else(|| {
        ContestError::Configuration(format!(
            "cooldown of module '{}' overflows the calendar",
            module.id
        ))
    })
}

pub struct AdmissionGate {
    db: Arc<Database>,
    store: Arc<dyn ItemStore>,
    probe: Arc<dyn ContentTypeProbe>,
    notifier: Arc<dyn Notifier>,
}

impl AdmissionGate {
    pub fn new(
        db: Arc<Database>,
        store: Arc<dyn ItemStore>,
        probe: Arc<dyn ContentTypeProbe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            store,
            probe,
            notifier,
        }
    }

    /// Checks 1-4: media sources, link content types, attachments
    pub async fn check_sources(
        &self,
        module: &ModuleConfig,
        item: &CandidateItem,
    ) -> ContestResult<Verdict> {
        let expected: &'static str = module.kind.into();
        let links = item.links();
        let patterns: Vec<Regex> = module
            .allowed_sources
            .iter()
            .filter_map(|source| source.link_regex())
            .collect();

        let matched: HashSet<&str> = links
            .iter()
            .copied()
            .filter(|link| patterns.iter().any(|p| p.is_match(link)))
            .collect();
        let has_attachment_source = module.allows_attachments() && !item.attachments.is_empty();

        if matched.is_empty() && !has_attachment_source {
            return Ok(Verdict::Reject(Rejection::NoMediaSource {
                allowed: module
                    .allowed_sources
                    .iter()
                    .map(|s| s.name().to_string())
                    .collect(),
            }));
        }

        let limit = module.quotas.attachments_per_submission;
        if let Some(limit) = limit {
            if matched.len() > limit as usize {
                return Ok(Verdict::Reject(Rejection::TooManySources {
                    found: matched.len(),
                    limit,
                }));
            }
        }

        // One by one, first mismatch wins
        for url in &links {
            let content_type = self.probe.content_type(url).await?;
            match content_type {
                Some(ct) if module.kind.accepts(&ct) => {}
                other => {
                    return Ok(Verdict::Reject(Rejection::InvalidLink {
                        url: url.to_string(),
                        content_type: other.unwrap_or_else(|| "unknown".to_string()),
                        expected,
                    }));
                }
            }
        }

        if let Some(limit) = limit {
            if item.attachments.len() > limit as usize {
                return Ok(Verdict::Reject(Rejection::TooManyAttachments { limit }));
            }
        }

        let invalid_attachment = item.attachments.iter().any(|a| {
            !a.content_type
                .as_deref()
                .is_some_and(|ct| module.kind.accepts(ct))
        });
        if invalid_attachment {
            return Ok(Verdict::Reject(Rejection::InvalidAttachments { expected }));
        }

        Ok(Verdict::Accept)
    }

    /// Check 5: quotas and cooldown, scoped to the current period
    pub fn check_quota(
        &self,
        module: &ModuleConfig,
        item: &CandidateItem,
        group_id: &str,
        now: &DateTime<Utc>,
    ) -> ContestResult<Verdict> {
        let period = PeriodCalculator::for_module(module)?.current_period(now)?;

        let user_submissions = self.db.list_user_submissions_in_window(
            &module.id,
            &item.author_id,
            &item.channel_id,
            group_id,
            &period.start,
            &period.end,
        )?;
        let module_count = self.db.count_submissions_in_window(
            &module.id,
            &item.channel_id,
            group_id,
            &period.start,
            &period.end,
        )?;

        if let Some(limit) = module.quotas.max_total {
            if module_count >= i64::from(limit) {
                return Ok(Verdict::Reject(Rejection::ModuleLimitReached { limit }));
            }
        }

        if let Some(limit) = module.quotas.max_per_user {
            if user_submissions.len() >= limit as usize {
                return Ok(Verdict::Reject(Rejection::UserLimitReached { limit }));
            }
        }

        let latest = user_submissions.iter().max_by_key(|s| s.created_at);
        let ready_at = match latest {
            Some(latest) => cooldown_end(module, latest.created_at)?,
            None => None,
        };
        if let Some(ready_at) = ready_at {
            if ready_at > *now {
                return Ok(Verdict::Reject(Rejection::Cooldown {
                    remaining_secs: seconds_until(ready_at, *now),
                }));
            }
        }

        Ok(Verdict::Accept)
    }

    /// Notify the author about a rejection, then run the reject action
    pub async fn reject<F, Fut>(
        &self,
        module: &ModuleConfig,
        item: &CandidateItem,
        rejection: &Rejection,
        on_reject: F,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let outcome = if module.delete_invalid_submissions {
            "was removed"
        } else {
            "was not accepted"
        };
        let message = format!(
            "Your submission in {} {} because {}",
            module.name, outcome, rejection
        );
        notify_best_effort(&self.notifier, &item.author_id, &message).await;
        on_reject().await;
    }

    /// Run checks 1-4; on rejection notify and run `on_reject`.
    /// Returns whether the item passed.
    pub async fn screen_sources<F, Fut>(
        &self,
        module: &ModuleConfig,
        item: &CandidateItem,
        on_reject: F,
    ) -> ContestResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        match self.check_sources(module, item).await? {
            Verdict::Accept => Ok(true),
            Verdict::Reject(rejection) => {
                log::debug!("{} Rejected: {:?}", module.tag(&item.id), rejection);
                self.reject(module, item, &rejection, on_reject).await;
                Ok(false)
            }
        }
    }

    /// Run every check; on rejection notify and run `on_reject`.
    /// Returns whether the item may be admitted.
    pub async fn screen<F, Fut>(
        &self,
        module: &ModuleConfig,
        item: &CandidateItem,
        group_id: &str,
        now: &DateTime<Utc>,
        on_reject: F,
    ) -> ContestResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let verdict = match self.check_sources(module, item).await? {
            Verdict::Accept => self.check_quota(module, item, group_id, now)?,
            rejected => rejected,
        };

        match verdict {
            Verdict::Accept => Ok(true),
            Verdict::Reject(rejection) => {
                log::debug!("{} Rejected: {:?}", module.tag(&item.id), rejection);
                self.reject(module, item, &rejection, on_reject).await;
                Ok(false)
            }
        }
    }

    /// Record the submission, attach the voting reactions and open the
    /// feedback thread. The three run concurrently; only the ledger write
    /// decides the result.
    pub async fn admit(
        &self,
        module: &ModuleConfig,
        item: &CandidateItem,
        group_id: &str,
        now: &DateTime<Utc>,
    ) -> ContestResult<Option<Submission>> {
        let tag = module.tag(&item.id);
        let cooldown_expires_at = cooldown_end(module, *now)?;
        let new = NewSubmission {
            module_id: module.id.clone(),
            user_id: item.author_id.clone(),
            group_id: group_id.to_string(),
            item_id: item.id.clone(),
            channel_id: item.channel_id.clone(),
            created_at: *now,
            cooldown_expires_at,
        };

        let (created, _, _) = tokio::join!(
            async { self.db.create_submission(&new) },
            self.attach_voting(module, item, &tag),
            self.open_feedback_thread(module, item, &tag),
        );
        self.store.remember_item(item);

        let created = created?;
        match &created {
            Some(submission) => log::debug!("{} Submission {} recorded", tag, submission.id),
            None => log::debug!("{} Item is already tracked", tag),
        }
        Ok(created)
    }

    async fn attach_voting(&self, module: &ModuleConfig, item: &CandidateItem, tag: &str) {
        // Upvote first so the pair shows in a stable order
        for emoji in [&module.voting_emojis.upvote, &module.voting_emojis.downvote] {
            let key = EmojiKey::from_config(emoji);
            if let Err(e) = self.store.add_reaction(&item.channel_id, &item.id, &key).await {
                log::debug!("{} Failed to react with {}: {}", tag, emoji, e);
                return;
            }
        }
    }

    async fn open_feedback_thread(&self, module: &ModuleConfig, item: &CandidateItem, tag: &str) {
        let policy = &module.submission_thread;
        if !policy.enabled {
            return;
        }

        let tz = match PeriodCalculator::for_module(module) {
            Ok(calc) => calc.timezone(),
            Err(e) => {
                log::debug!("{} {}", tag, e);
                return;
            }
        };
        let channel_name = self
            .store
            .channel_name(&item.channel_id)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        let fields = template::item_fields(module, item, &channel_name, tz);

        let request = ThreadRequest {
            name: template::expand(&policy.name, &fields),
            auto_archive_minutes: policy.auto_archive_minutes,
            rate_limit_per_user: policy.rate_limit_per_user,
            reason: Some(
                "Submission feedback thread for organized discussion/feedback.".to_string(),
            ),
        };
        if let Err(e) = self
            .store
            .open_thread(&item.channel_id, &item.id, &request)
            .await
        {
            log::debug!("{} Failed to create thread: {}", tag, e);
        }
    }
}
