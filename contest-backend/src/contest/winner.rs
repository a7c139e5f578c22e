//! Winner selection by upvote count

use crate::models::CandidateItem;

/// Pick the candidate with the most upvotes.
///
/// Ties go to the candidate that comes first in `candidates`, so callers must
/// pass them in ledger order. Items whose id is in `exclude` are skipped.
pub fn select_winner<'a>(
    candidates: &'a [CandidateItem],
    upvote_emoji: &str,
    exclude: &[&str],
) -> Option<&'a CandidateItem> {
    candidates
        .iter()
        .filter(|item| !exclude.contains(&item.id.as_str()))
        .fold(None, |best: Option<&CandidateItem>, item| match best {
            Some(best)
                if best.reaction_count(upvote_emoji) >= item.reaction_count(upvote_emoji) =>
            {
                Some(best)
            }
            _ => Some(item),
        })
}

/// Sum of upvotes across all candidates
pub fn total_upvotes(candidates: &[CandidateItem], upvote_emoji: &str) -> u64 {
    candidates
        .iter()
        .map(|item| item.reaction_count(upvote_emoji))
        .sum()
}
