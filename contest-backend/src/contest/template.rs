//! `{placeholder}` substitution for thread names and announcements

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use crate::models::{CandidateItem, ModuleConfig, Submission};

/// Replace every `{key}` occurrence for each known field.
///
/// Unknown placeholders are left untouched.
pub fn expand(template: &str, fields: &[(&str, String)]) -> String {
    fields.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// `d/m/yyyy` in the module's timezone
pub fn format_date(t: &DateTime<Utc>, tz: Tz) -> String {
    let local = t.with_timezone(&tz);
    format!("{}/{}/{}", local.day(), local.month(), local.year())
}

/// `HhM` in the module's timezone, e.g. `9h5`
pub fn format_time(t: &DateTime<Utc>, tz: Tz) -> String {
    let local = t.with_timezone(&tz);
    format!("{}h{}", local.hour(), local.minute())
}

/// Fields available once an item has been resolved
pub fn item_fields(
    module: &ModuleConfig,
    item: &CandidateItem,
    channel_name: &str,
    tz: Tz,
) -> Vec<(&'static str, String)> {
    vec![
        ("name", module.name.clone()),
        ("date", format_date(&item.created_at, tz)),
        ("time", format_time(&item.created_at, tz)),
        ("author", item.author_name.clone()),
        ("channel", channel_name.to_string()),
        ("link", item.permalink.clone()),
        (
            "upvotes",
            item.reaction_count(&module.voting_emojis.upvote).to_string(),
        ),
        (
            "downvotes",
            item.reaction_count(&module.voting_emojis.downvote).to_string(),
        ),
    ]
}

/// Item fields plus the ledger id of the submission
pub fn submission_fields(
    module: &ModuleConfig,
    submission: &Submission,
    item: &CandidateItem,
    channel_name: &str,
    tz: Tz,
) -> Vec<(&'static str, String)> {
    let mut fields = item_fields(module, item, channel_name, tz);
    fields.push(("id", submission.id.to_string()));
    fields
}
