use std::env;
use std::path::{Path, PathBuf};

use crate::contest::{ModuleRegistry, PeriodCalculator};
use crate::error::{ContestError, ContestResult};
use crate::models::ModuleConfig;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub config_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> ContestResult<Self> {
        let discord_token = env::var("DISCORD_TOKEN")
            .map_err(|_| ContestError::Configuration("DISCORD_TOKEN must be set".to_string()))?;

        let config_dir = match env::var("CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => find_config_dir()?,
        };

        Ok(Self {
            discord_token,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "./.db/contest.db".to_string()),
            config_dir,
        })
    }
}

/// Check ./config first, then ../config (for running from a subdirectory)
fn find_config_dir() -> ContestResult<PathBuf> {
    ["./config", "../config"]
        .iter()
        .map(PathBuf::from)
        .find(|dir| dir.exists())
        .ok_or_else(|| {
            ContestError::Configuration(
                "Config directory not found in ./config or ../config".to_string(),
            )
        })
}

/// Reasons a module cannot be scheduled, empty when it is usable
fn validate_module(module: &ModuleConfig) -> Vec<String> {
    let mut problems = Vec::new();
    if module.id.trim().is_empty() {
        problems.push("empty id".to_string());
    }
    if module.source_channel_id.trim().is_empty() {
        problems.push("empty source_channel_id".to_string());
    }
    if module.output_channel_id.trim().is_empty() {
        problems.push("empty output_channel_id".to_string());
    }
    if module.allowed_sources.is_empty() {
        problems.push("no allowed_sources".to_string());
    }
    if module.voting_emojis.upvote.is_empty() || module.voting_emojis.downvote.is_empty() {
        problems.push("empty voting emoji".to_string());
    }
    if let Some(invalid) = module
        .allowed_sources
        .iter()
        .find(|s| !s.is_attachment() && s.link_regex().is_none())
    {
        problems.push(format!("unusable pattern for source {}", invalid.name()));
    }
    if let Err(e) = module.cooldown() {
        problems.push(e.to_string());
    }
    if let Err(e) = PeriodCalculator::for_module(module)
        .and_then(|calc| calc.current_period(&chrono::Utc::now()))
    {
        problems.push(e.to_string());
    }
    problems
}

/// Load `modules.ron` from the config directory.
///
/// Invalid modules are reported and skipped; a missing or unparseable file is
/// an error.
pub fn load_modules(config_dir: &Path) -> ContestResult<ModuleRegistry> {
    let modules_path = config_dir.join("modules.ron");

    let content = std::fs::read_to_string(&modules_path).map_err(|e| {
        ContestError::Configuration(format!("Failed to read {:?}: {}", modules_path, e))
    })?;

    let modules: Vec<ModuleConfig> = ron::from_str(&content).map_err(|e| {
        ContestError::Configuration(format!("Failed to parse {:?}: {}", modules_path, e))
    })?;

    let total = modules.len();
    let mut registry = ModuleRegistry::default();
    for module in modules {
        let problems = validate_module(&module);
        if !problems.is_empty() {
            log::error!(
                "[modules] Skipping module '{}': {}",
                module.id,
                problems.join(", ")
            );
            continue;
        }
        let id = module.id.clone();
        if let Err(e) = registry.insert(module) {
            log::error!("[modules] Skipping module '{}': {}", id, e);
        }
    }

    log::info!(
        "[modules] Loaded {} of {} modules from {:?}",
        registry.len(),
        total,
        modules_path
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MODULES: &str = r#"[
        (
            id: "cotw",
            name: "Clip of the Week",
            kind: video,
            source_channel_id: "100",
            output_channel_id: "200",
            schedule: "0 0 * * 1",
            timezone: "America/New_York",
            allowed_sources: [Discord, Medal, Custom(name: "Streamable", pattern: "https://streamable.com/{id}")],
            quotas: (max_per_user: Some(1)),
            cooldown_secs: Some(3600),
            voting_emojis: (upvote: "👍", downvote: "👎"),
            winner_thread: (enabled: true, name: "{name} winner {date}", auto_archive_minutes: Some(10080)),
        ),
        (
            id: "bad-tz",
            name: "Broken",
            kind: image,
            source_channel_id: "101",
            output_channel_id: "201",
            schedule: "0 0 * * 1",
            timezone: "Atlantis/Capital",
            allowed_sources: [Discord],
            voting_emojis: (upvote: "👍", downvote: "👎"),
        ),
        (
            id: "cotw",
            name: "Duplicate",
            kind: video,
            source_channel_id: "102",
            output_channel_id: "202",
            schedule: "0 0 * * *",
            timezone: "UTC",
            allowed_sources: [Discord],
            voting_emojis: (upvote: "👍", downvote: "👎"),
        ),
        (
            id: "no-channel",
            name: "No channel",
            kind: either,
            source_channel_id: "",
            output_channel_id: "203",
            schedule: "0 0 * * *",
            timezone: "UTC",
            allowed_sources: [Discord],
            voting_emojis: (upvote: "👍", downvote: "👎"),
        ),
        (
            id: "endless-cooldown",
            name: "Endless cooldown",
            kind: video,
            source_channel_id: "104",
            output_channel_id: "204",
            schedule: "0 0 * * *",
            timezone: "UTC",
            allowed_sources: [Discord],
            cooldown_secs: Some(10000000000000000),
            voting_emojis: (upvote: "👍", downvote: "👎"),
        ),
    ]"#;

    #[test]
    fn test_load_modules_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("modules.ron"), MODULES).unwrap();

        let registry = load_modules(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);

        let cotw = registry.get("cotw").unwrap();
        assert_eq!(cotw.name, "Clip of the Week");
        assert_eq!(cotw.quotas.max_per_user, Some(1));
        assert_eq!(cotw.cooldown_secs, Some(3600));
        assert!(cotw.winner_thread.enabled);
        assert_eq!(cotw.allowed_sources.len(), 3);
        assert!(registry.for_source_channel("100").is_some());
        assert!(registry.for_source_channel("102").is_none());
        assert!(registry.for_source_channel("104").is_none());
    }

    #[test]
    fn test_missing_or_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_modules(dir.path()),
            Err(ContestError::Configuration(_))
        ));

        fs::write(dir.path().join("modules.ron"), "[ (id: ").unwrap();
        assert!(matches!(
            load_modules(dir.path()),
            Err(ContestError::Configuration(_))
        ));
    }

    #[test]
    fn test_shipped_modules_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config");
        let registry = load_modules(&dir).unwrap();
        assert_eq!(registry.len(), 2);
    }
}
