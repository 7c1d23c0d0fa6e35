//! Configuration loading and validation.
//!
//! Loads `config.toml` from `$GROUPWARDEN_CONFIG` or `~/.groupwarden/`.
//! Every section has defaults, and `GROUPWARDEN_*` environment variables
//! override file values.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The bot account and the developers it obeys.
    pub bot: BotConfig,
    /// Optional assistant account used when the bot loses admin rights.
    pub assistant: AssistantConfig,
    /// Platform API settings.
    pub platform: PlatformConfig,
    /// Poll loop settings.
    pub polling: PollingConfig,
    /// Admin protection settings.
    pub protection: ProtectionConfig,
    /// Filesystem locations for state and logs.
    pub paths: PathsConfig,
}

impl Config {
    /// Load config from `path`, apply env overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting config is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string without env overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests do not touch the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("GROUPWARDEN_BOT_USER_ID") {
            self.bot.user_id = v;
        }
        if let Some(v) = env("GROUPWARDEN_DEVELOPERS") {
            self.bot.developers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = env("GROUPWARDEN_ASSISTANT_USER_ID") {
            self.assistant.user_id = Some(v);
        }
        if let Some(v) = env("GROUPWARDEN_BASE_URL") {
            self.platform.base_url = v;
        }
        if let Some(v) = env("GROUPWARDEN_POLL_INTERVAL_SECS") {
            match v.parse() {
                Ok(n) => self.polling.interval_secs = n,
                Err(_) => tracing::warn!(
                    var = "GROUPWARDEN_POLL_INTERVAL_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("GROUPWARDEN_STATE_DIR") {
            self.paths.state_dir = Some(PathBuf::from(v));
        }
    }

    /// Check values that have no safe default.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bot.user_id.trim().is_empty() {
            anyhow::bail!("bot.user_id must be set");
        }
        let url = url::Url::parse(&self.platform.base_url)
            .with_context(|| format!("platform.base_url is not a URL: {}", self.platform.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("platform.base_url must use http or https");
        }
        if self.platform.max_attempts == 0 {
            anyhow::bail!("platform.max_attempts must be at least 1");
        }
        if self.protection.kick_threshold == 0 {
            anyhow::bail!("protection.kick_threshold must be at least 1");
        }
        if self.polling.interval_secs == 0 {
            anyhow::bail!("polling.interval_secs must be at least 1");
        }
        Ok(())
    }
}

// ── Sections ────────────────────────────────────────────────────

/// The bot account and its developers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Platform user id of the bot account.
    pub user_id: String,
    /// Handle of the bot account, used in logs.
    pub handle: Option<String>,
    /// User ids with unconditional authority over activation and ownership.
    pub developers: Vec<String>,
}

/// Optional assistant account.
///
/// Its session id lives in the credentials file; only its user id is
/// configured here so losses of its admin right can be recognised.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Platform user id of the assistant account.
    pub user_id: Option<String>,
}

/// Platform API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// API base URL.
    pub base_url: String,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Application id header.
    pub app_id: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// First retry backoff in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Pause per attempt after a 429 response, in seconds.
    pub rate_limit_pause_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://i.instagram.com/api/v1".to_owned(),
            user_agent: "Instagram 219.0.0.12.117 Android".to_owned(),
            app_id: "567067343352427".to_owned(),
            request_timeout_secs: 15,
            max_attempts: 3,
            backoff_base_ms: 1000,
            rate_limit_pause_secs: 5,
        }
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between poll cycles in seconds.
    pub interval_secs: u64,
    /// Participant count (excluding the bot) at which a thread without an
    /// explicit group flag counts as a group.
    pub group_min_users: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 4,
            group_min_users: 3,
        }
    }
}

/// Admin protection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Sliding window for mass-removal detection, in seconds.
    pub kick_window_secs: u64,
    /// Removals inside the window that trigger a demotion.
    pub kick_threshold: usize,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            kick_window_secs: 60,
            kick_threshold: 5,
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for persisted documents. Defaults to `state/` beside the config file.
    pub state_dir: Option<PathBuf>,
    /// Directory for rotated log files. Defaults to `logs/` beside the config file.
    pub logs_dir: Option<PathBuf>,
    /// Persist the dedup ledger so restarts skip the last processed event.
    pub persist_ledger: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            logs_dir: None,
            persist_ledger: true,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────

/// Resolved runtime file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Directory holding persisted documents.
    pub state_dir: PathBuf,
    /// Directory holding log files.
    pub logs_dir: PathBuf,
    /// Credentials `.env` file.
    pub env_file: PathBuf,
    /// Privilege document.
    pub privileges: PathBuf,
    /// Admin snapshot document.
    pub snapshots: PathBuf,
    /// Dedup ledger document, when persistence is enabled.
    pub ledger: Option<PathBuf>,
}

/// Resolve the default config directory (`~/.groupwarden/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".groupwarden"))
}

/// Resolve the config file path using a custom env resolver.
///
/// `$GROUPWARDEN_CONFIG` wins; otherwise `~/.groupwarden/config.toml`.
///
/// # Errors
///
/// Returns an error if the home directory is needed and cannot be found.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(p) = env("GROUPWARDEN_CONFIG") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}

/// Resolve runtime paths relative to `base` (normally [`config_dir`]).
pub fn runtime_paths(config: &Config, base: &Path) -> RuntimePaths {
    let state_dir = config
        .paths
        .state_dir
        .clone()
        .unwrap_or_else(|| base.join("state"));
    let logs_dir = config
        .paths
        .logs_dir
        .clone()
        .unwrap_or_else(|| base.join("logs"));
    RuntimePaths {
        env_file: base.join(".env"),
        privileges: state_dir.join("privileges.json"),
        snapshots: state_dir.join("admin_snapshots.json"),
        ledger: config
            .paths
            .persist_ledger
            .then(|| state_dir.join("ledger.json")),
        state_dir,
        logs_dir,
    }
}
