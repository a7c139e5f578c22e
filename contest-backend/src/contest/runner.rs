//! One contest cycle per trigger: resolve the closed window's submissions,
//! publish the winner and purge the rest

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::Arc;

use super::fetcher::fetch_window;
use super::period::PeriodCalculator;
use super::template;
use super::traits::ItemStore;
use super::winner::{select_winner, total_upvotes};
use crate::db::Database;
use crate::error::{ContestError, ContestResult};
use crate::models::{CandidateItem, ModuleConfig, PublishedItem, Submission, ThreadRequest};

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The module's previous run was still active
    Skipped,
    /// Nothing in the window resolved to a live item
    NoCandidates,
    /// The winning item lives outside a group
    NoGroupContext,
    Published {
        submission_id: i64,
        item_id: String,
        published: PublishedItem,
        deleted: usize,
    },
}

/// Holds a module's busy flag for the duration of a run
struct BusyGuard<'a> {
    busy: &'a DashMap<String, DateTime<Utc>>,
    module_id: String,
}

impl<'a> BusyGuard<'a> {
    fn acquire(
        busy: &'a DashMap<String, DateTime<Utc>>,
        module_id: &str,
        trigger: DateTime<Utc>,
    ) -> Result<Self, DateTime<Utc>> {
        match busy.entry(module_id.to_string()) {
            Entry::Occupied(running) => Err(*running.get()),
            Entry::Vacant(slot) => {
                slot.insert(trigger);
                Ok(Self {
                    busy,
                    module_id: module_id.to_string(),
                })
            }
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.remove(&self.module_id);
    }
}

/// Winner announcement posted to the output channel
pub fn winner_summary(
    module: &ModuleConfig,
    winner: &CandidateItem,
    candidates: &[CandidateItem],
) -> String {
    let upvote = &module.voting_emojis.upvote;
    let body = if winner.attachments.is_empty() {
        format!("**Content:** {}", winner.content)
    } else {
        winner
            .attachments
            .iter()
            .map(|a| a.url.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "## {} Winner\n\
         👑 **Winner:** {} - [Jump to original](<{}>)\n\
         🆙 **Votes:** {}\n\
         📥 **Submissions:** {}\n\
         🗳️ **Total Votes:** {}\n\
         \n\
         {}",
        module.name,
        winner.author_mention,
        winner.permalink,
        winner.reaction_count(upvote),
        candidates.len(),
        total_upvotes(candidates, upvote),
        body
    )
}

pub struct CycleRunner {
    db: Arc<Database>,
    store: Arc<dyn ItemStore>,
    /// Module id -> trigger instant of the run in progress
    busy: DashMap<String, DateTime<Utc>>,
}

impl CycleRunner {
    pub fn new(db: Arc<Database>, store: Arc<dyn ItemStore>) -> Self {
        Self {
            db,
            store,
            busy: DashMap::new(),
        }
    }

    pub fn is_running(&self, module_id: &str) -> bool {
        self.busy.contains_key(module_id)
    }

    /// Run one cycle for the window that closed at or before `trigger`
    pub async fn run_cycle(
        &self,
        module: &ModuleConfig,
        trigger: DateTime<Utc>,
    ) -> ContestResult<CycleOutcome> {
        let tag = module.tag("run");
        let _guard = match BusyGuard::acquire(&self.busy, &module.id, trigger) {
            Ok(guard) => guard,
            Err(running) => {
                log::info!(
                    "{} Previous run for trigger {} still active, skipping trigger {}",
                    tag,
                    running,
                    trigger
                );
                return Ok(CycleOutcome::Skipped);
            }
        };

        log::debug!("{} Running cycle at {}", tag, trigger);
        let window = PeriodCalculator::for_module(module)?.previous_period(&trigger)?;
        log::debug!(
            "{} Fetching submissions from {} to {}",
            tag,
            window.start,
            window.end
        );

        let submissions =
            self.db
                .list_open_submissions_in_window(&module.id, &window.start, &window.end)?;
        log::debug!(
            "{} Found {} submissions, resolving items",
            tag,
            submissions.len()
        );

        // join_all keeps ledger order
        let candidates: Vec<CandidateItem> =
            join_all(submissions.iter().map(|s| self.resolve(s, &tag)))
                .await
                .into_iter()
                .flatten()
                .collect();

        log::debug!("{} Resolved {} items", tag, candidates.len());
        let Some(winner) = select_winner(&candidates, &module.voting_emojis.upvote, &[]) else {
            log::debug!("{} No valid items to output", tag);
            return Ok(CycleOutcome::NoCandidates);
        };

        if winner.group_id.is_none() {
            log::debug!("{} Winner {} is not in a group, aborting", tag, winner.id);
            return Ok(CycleOutcome::NoGroupContext);
        }

        let submission = submissions
            .iter()
            .find(|s| s.item_id == winner.id)
            .ok_or_else(|| {
                ContestError::InvariantViolation(format!(
                    "winner {} of module {} has no ledger record",
                    winner.id, module.id
                ))
            })?;
        log::debug!(
            "{} Winner is {} with submission {}",
            tag,
            winner.id,
            submission.id
        );

        let content = winner_summary(module, winner, &candidates);
        let published = self
            .store
            .publish(&module.output_channel_id, &content)
            .await?;

        self.open_winner_thread(module, submission, winner, &published, &tag)
            .await;

        if !self
            .db
            .mark_submission_processed(submission.id, &Utc::now(), &published)?
        {
            log::debug!("{} Submission {} was already processed", tag, submission.id);
        }
        log::debug!("{} Winner submission processed: {}", tag, submission.id);

        let losers: Vec<i64> = submissions
            .iter()
            .filter(|s| s.id != submission.id)
            .map(|s| s.id)
            .collect();
        let deleted = self.db.delete_submissions(&module.id, &losers)?;
        log::debug!("{} Cleaned up {} submissions", tag, deleted);

        Ok(CycleOutcome::Published {
            submission_id: submission.id,
            item_id: winner.id.clone(),
            published,
            deleted,
        })
    }

    async fn resolve(&self, submission: &Submission, tag: &str) -> Option<CandidateItem> {
        match self
            .store
            .fetch_item(&submission.channel_id, &submission.item_id)
            .await
        {
            Ok(Some(item)) => Some(item),
            Ok(None) => {
                log::debug!("{} Submission item not found: {}", tag, submission.item_id);
                None
            }
            Err(e) => {
                log::debug!(
                    "{} Failed to resolve submission item {}: {}",
                    tag,
                    submission.item_id,
                    e
                );
                None
            }
        }
    }

    async fn open_winner_thread(
        &self,
        module: &ModuleConfig,
        submission: &Submission,
        winner: &CandidateItem,
        published: &PublishedItem,
        tag: &str,
    ) {
        let policy = &module.winner_thread;
        if !policy.enabled {
            return;
        }

        let tz = match PeriodCalculator::for_module(module) {
            Ok(calc) => calc.timezone(),
            Err(_) => chrono_tz::Tz::UTC,
        };
        let channel_name = self
            .store
            .channel_name(&winner.channel_id)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        let fields = template::submission_fields(module, submission, winner, &channel_name, tz);

        let request = ThreadRequest {
            name: template::expand(&policy.name, &fields),
            auto_archive_minutes: policy.auto_archive_minutes,
            rate_limit_per_user: policy.rate_limit_per_user,
            reason: None,
        };
        if let Err(e) = self
            .store
            .open_thread(&published.channel_id, &published.id, &request)
            .await
        {
            log::debug!("{} Failed to create winner thread: {}", tag, e);
        }
    }

    /// Walk the current period to fill the store's cache and drop open
    /// submissions whose items were deleted while offline.
    ///
    /// Returns the number of purged submissions.
    pub async fn warm_up(&self, module: &ModuleConfig, now: DateTime<Utc>) -> ContestResult<usize> {
        let tag = module.tag("fetch");
        let period = PeriodCalculator::for_module(module)?.current_period(&now)?;

        let fetched = fetch_window(
            self.store.as_ref(),
            &module.source_channel_id,
            &period,
            true,
            &tag,
        )
        .await;
        if !fetched.complete {
            log::debug!("{} History walk incomplete, skipping purge", tag);
            return Ok(0);
        }

        let open = self
            .db
            .list_open_submissions_in_window(&module.id, &period.start, &period.end)?;

        // Items missing from the walk may predate the window; confirm each one
        let mut stale = Vec::new();
        for submission in open
            .iter()
            .filter(|s| !fetched.items.contains_key(&s.item_id))
        {
            match self
                .store
                .fetch_item(&submission.channel_id, &submission.item_id)
                .await
            {
                Ok(None) => stale.push(submission.id),
                Ok(Some(_)) => {}
                Err(e) => log::debug!(
                    "{} Could not confirm item {}: {}",
                    tag,
                    submission.item_id,
                    e
                ),
            }
        }

        let purged = self.db.delete_submissions(&module.id, &stale)?;
        log::debug!(
            "{} Cached {} items, purged {} submissions",
            tag,
            fetched.items.len(),
            purged
        );
        Ok(purged)
    }
}
