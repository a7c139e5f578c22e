pub mod item;
pub mod module_config;
pub mod submission;

pub use item::{Attachment, CandidateItem, EmojiKey, PublishedItem, ReactionEvent, ThreadRequest};
pub use module_config::{MediaKind, MediaSource, ModuleConfig, Quotas, ThreadPolicy, VotingEmojis};
pub use submission::{NewSubmission, Submission};
