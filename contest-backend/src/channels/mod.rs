pub mod content_probe;
pub mod discord;

pub use content_probe::HttpContentProbe;
pub use discord::{start_discord_listener, ContestHandler, DiscordItemStore};
