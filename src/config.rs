//! Configuration loader and validator for the job relay.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub feed: Feed,
    pub trello: Trello,
    pub slack: Slack,
    #[serde(default)]
    pub categories: Categories,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_processed_jobs_file")]
    pub processed_jobs_file: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

/// Upstream posting feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feed {
    pub rss_url: String,
}

/// Trello board settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trello {
    pub api_key: String,
    pub token: String,
    pub board_id: String,
    #[serde(default)]
    pub lists: TrelloLists,
}

/// List ids per budget category. Empty ids are created on board initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrelloLists {
    #[serde(default)]
    pub quick_wins: String,
    #[serde(default)]
    pub medium_projects: String,
    #[serde(default)]
    pub high_value: String,
}

/// Slack incoming-webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slack {
    pub webhook_url: String,
    #[serde(default)]
    pub rate_limit: RateLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimit {
    pub messages_per_minute: u32,
    pub delay_between_messages_ms: u64,
    /// Cards closed concurrently per archive batch.
    pub batch_size: usize,
    pub batch_pause_ms: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            messages_per_minute: 50,
            delay_between_messages_ms: 1200,
            batch_size: 10,
            batch_pause_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Categories {
    #[serde(default)]
    pub budget_tiers: BudgetTiers,
    #[serde(default)]
    pub priority: PriorityThresholds,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetTiers {
    pub quick_wins: f64,
    pub medium_projects: f64,
}

impl Default for BudgetTiers {
    fn default() -> Self {
        Self {
            quick_wins: 300.0,
            medium_projects: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PriorityThresholds {
    pub verified_spent_high: f64,
    pub unverified_spent_low: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            verified_spent_high: 1000.0,
            unverified_spent_low: 100.0,
        }
    }
}

fn default_processed_jobs_file() -> String {
    "processed_jobs.json".to_string()
}

fn default_retention_days() -> u32 {
    7
}

fn default_http_timeout_seconds() -> u64 {
    30
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn processed_jobs_path(&self) -> PathBuf {
        Path::new(&self.app.data_dir).join(&self.app.processed_jobs_file)
    }

    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.app.retention_days))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.app.http_timeout_seconds)
    }

    /// Override secrets from the environment when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TRELLO_API_KEY") {
            self.trello.api_key = v;
        }
        if let Ok(v) = std::env::var("TRELLO_TOKEN") {
            self.trello.token = v;
        }
        if let Ok(v) = std::env::var("SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = v;
        }
        if let Ok(v) = std::env::var("UPWORK_RSS_FEED_URL") {
            self.feed.rss_url = v;
        }
    }
}

impl RateLimit {
    /// Minimum spacing between two chat messages: the stricter of the fixed
    /// delay and the per-minute budget.
    pub fn min_interval(&self) -> Duration {
        let per_minute = Duration::from_millis(60_000 / u64::from(self.messages_per_minute.max(1)));
        per_minute.max(Duration::from_millis(self.delay_between_messages_ms))
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.processed_jobs_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.processed_jobs_file must be non-empty"));
    }
    if cfg.app.retention_days == 0 {
        return Err(ConfigError::Invalid("app.retention_days must be > 0"));
    }

    if cfg.feed.rss_url.trim().is_empty() {
        return Err(ConfigError::Invalid("feed.rss_url must be non-empty"));
    }

    if cfg.trello.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("trello.api_key must be non-empty"));
    }
    if cfg.trello.token.trim().is_empty() {
        return Err(ConfigError::Invalid("trello.token must be non-empty"));
    }
    if cfg.trello.board_id.trim().is_empty() {
        return Err(ConfigError::Invalid("trello.board_id must be non-empty"));
    }

    if cfg.slack.webhook_url.trim().is_empty() {
        return Err(ConfigError::Invalid("slack.webhook_url must be non-empty"));
    }
    if cfg.slack.rate_limit.messages_per_minute == 0 {
        return Err(ConfigError::Invalid("slack.rate_limit.messages_per_minute must be > 0"));
    }
    if cfg.slack.rate_limit.batch_size == 0 {
        return Err(ConfigError::Invalid("slack.rate_limit.batch_size must be > 0"));
    }

    let tiers = &cfg.categories.budget_tiers;
    if !(tiers.quick_wins >= 0.0 && tiers.quick_wins < tiers.medium_projects) {
        return Err(ConfigError::Invalid(
            "categories.budget_tiers must satisfy 0 <= quick_wins < medium_projects",
        ));
    }
    let prio = &cfg.categories.priority;
    if prio.verified_spent_high < 0.0 || prio.unverified_spent_low < 0.0 {
        return Err(ConfigError::Invalid("categories.priority thresholds must be >= 0"));
    }

    Ok(())
}

/// Returns the example YAML shipped as `config.example.yaml`.
pub fn example() -> &'static str {
    include_str!("../config.example.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.retention_days, 7);
        assert_eq!(cfg.categories.budget_tiers.quick_wins, 300.0);
        assert!(cfg.trello.lists.quick_wins.is_empty());
    }

    #[test]
    fn optional_sections_fall_back_to_defaults() {
        let yaml = r#"app:
  data_dir: "./data"
feed:
  rss_url: "https://feed"
trello:
  api_key: "k"
  token: "t"
  board_id: "b"
slack:
  webhook_url: "https://hook"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.processed_jobs_file, "processed_jobs.json");
        assert_eq!(cfg.app.retention_days, 7);
        assert_eq!(cfg.slack.rate_limit, RateLimit::default());
        assert_eq!(cfg.categories.priority.verified_spent_high, 1000.0);
        assert_eq!(cfg.categories.budget_tiers.medium_projects, 1500.0);
    }

    #[test]
    fn min_interval_takes_the_stricter_limit() {
        let rl = RateLimit::default();
        assert_eq!(rl.min_interval(), Duration::from_millis(1200));

        let rl = RateLimit {
            messages_per_minute: 20,
            delay_between_messages_ms: 100,
            ..RateLimit::default()
        };
        assert_eq!(rl.min_interval(), Duration::from_millis(3000));

        let rl = RateLimit {
            messages_per_minute: 600,
            delay_between_messages_ms: 500,
            ..RateLimit::default()
        };
        assert_eq!(rl.min_interval(), Duration::from_millis(500));
    }

    #[test]
    fn invalid_credentials() {
        let mut cfg = example_cfg();
        cfg.trello.token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("trello.token")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.slack.webhook_url = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("webhook_url")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_tiers_and_limits() {
        let mut cfg = example_cfg();
        cfg.categories.budget_tiers.quick_wins = 2000.0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.slack.rate_limit.messages_per_minute = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.slack.rate_limit.batch_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.app.retention_days = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
        assert_eq!(cfg.processed_jobs_path(), data_path.join("processed_jobs.json"));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.trello.board_id, "TRELLO_BOARD_ID");
        assert_eq!(cfg.retention_window(), chrono::Duration::days(7));
    }
}
