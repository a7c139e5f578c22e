use chrono::{DateTime, Utc};

/// A user's item tracked by a contest module
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: i64,
    pub module_id: String,
    pub user_id: String,
    pub group_id: String,
    pub item_id: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub published_item_id: Option<String>,
    pub published_channel_id: Option<String>,
    pub cooldown_expires_at: Option<DateTime<Utc>>,
}

/// Fields required to record a freshly admitted submission
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub module_id: String,
    pub user_id: String,
    pub group_id: String,
    pub item_id: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
    pub cooldown_expires_at: Option<DateTime<Utc>>,
}
