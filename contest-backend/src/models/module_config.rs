//! Contest module configuration, loaded once from `config/modules.ron`

use chrono::Duration;
use regex::Regex;
use serde::Deserialize;

use crate::error::{ContestError, ContestResult};

/// What kind of media a module accepts.
///
/// Converts to the noun used in user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    #[strum(serialize = "media")]
    Either,
}

impl MediaKind {
    /// Whether a MIME content type is acceptable for this kind
    pub fn accepts(&self, content_type: &str) -> bool {
        let ct = content_type.trim().to_lowercase();
        match self {
            MediaKind::Image => ct.starts_with("image/"),
            MediaKind::Video => ct.starts_with("video/"),
            MediaKind::Either => ct.starts_with("image/") || ct.starts_with("video/"),
        }
    }
}

/// Pattern value that marks file attachments as an allowed source
pub const ATTACHMENT_PATTERN: &str = "attachment";

/// Longest accepted `cooldown_secs`, one leap year
pub const MAX_COOLDOWN_SECS: u64 = 366 * 24 * 60 * 60;

/// Where a submission's media may come from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum MediaSource {
    Discord,
    Imgur,
    Medal,
    Youtube,
    Custom { name: String, pattern: String },
}

impl MediaSource {
    pub fn name(&self) -> &str {
        match self {
            MediaSource::Discord => "Discord",
            MediaSource::Imgur => "Imgur",
            MediaSource::Medal => "Medal",
            MediaSource::Youtube => "Youtube",
            MediaSource::Custom { name, .. } => name,
        }
    }

    /// Either `attachment` or a URL template containing `{id}`
    pub fn pattern(&self) -> &str {
        match self {
            MediaSource::Discord => ATTACHMENT_PATTERN,
            MediaSource::Imgur => "https://imgur.com/gallery/{id}",
            MediaSource::Medal => "https://medal.tv/clips/{id}",
            MediaSource::Youtube => "https://www.youtube.com/watch?v={id}",
            MediaSource::Custom { pattern, .. } => pattern,
        }
    }

    pub fn is_attachment(&self) -> bool {
        self.pattern() == ATTACHMENT_PATTERN
    }

    /// Regex matching links of this source, `None` for the attachment source.
    ///
    /// The template is anchored at the start of the word; anything may follow
    /// the `{id}` segment (query strings, timestamps).
    pub fn link_regex(&self) -> Option<Regex> {
        if self.is_attachment() {
            return None;
        }
        let escaped = regex::escape(self.pattern()).replace(r"\{id\}", r"[^\s/?#&]+");
        Regex::new(&format!("^{}", escaped)).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Quotas {
    /// Submissions accepted per period across the whole group
    #[serde(default)]
    pub max_total: Option<u32>,
    /// Submissions accepted per period for one user
    #[serde(default)]
    pub max_per_user: Option<u32>,
    /// Attachments (and distinct linked sources) per submission
    #[serde(default)]
    pub attachments_per_submission: Option<u32>,
}

/// Policy for a discussion thread opened on a message
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThreadPolicy {
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub auto_archive_minutes: Option<u16>,
    #[serde(default)]
    pub rate_limit_per_user: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VotingEmojis {
    pub upvote: String,
    pub downvote: String,
}

impl VotingEmojis {
    /// Matches a unicode emoji or a custom emoji id
    pub fn contains(&self, key: &str) -> bool {
        self.upvote == key || self.downvote == key
    }
}

fn default_true() -> bool {
    true
}

/// One independently configured contest
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModuleConfig {
    pub id: String,
    pub name: String,
    pub kind: MediaKind,
    pub source_channel_id: String,
    pub output_channel_id: String,
    /// Cron expression, 5 or 6 fields
    pub schedule: String,
    /// IANA timezone name the schedule is evaluated in
    pub timezone: String,
    pub allowed_sources: Vec<MediaSource>,
    #[serde(default)]
    pub quotas: Quotas,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    pub voting_emojis: VotingEmojis,
    #[serde(default)]
    pub submission_thread: ThreadPolicy,
    #[serde(default)]
    pub winner_thread: ThreadPolicy,
    #[serde(default = "default_true")]
    pub delete_invalid_submissions: bool,
    #[serde(default)]
    pub restrict_reactions: bool,
}

impl ModuleConfig {
    pub fn allows_attachments(&self) -> bool {
        self.allowed_sources.iter().any(|s| s.is_attachment())
    }

    /// Wait between a user's submissions, `None` when disabled
    pub fn cooldown(&self) -> ContestResult<Option<Duration>> {
        let Some(secs) = self.cooldown_secs.filter(|c| *c > 0) else {
            return Ok(None);
        };
        if secs > MAX_COOLDOWN_SECS {
            return Err(ContestError::Configuration(format!(
                "cooldown of {} seconds exceeds the maximum of {}",
                secs, MAX_COOLDOWN_SECS
            )));
        }
        i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .map(Some)
            .ok_or_else(|| {
                ContestError::Configuration(format!("cooldown of {} seconds is out of range", secs))
            })
    }

    /// Bracketed log prefix, e.g. `[Clip of the Week/run]`
    pub fn tag(&self, scope: &str) -> String {
        format!("[{}/{}]", self.name, scope)
    }
}
