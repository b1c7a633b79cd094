use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::credential::mask_token;
use crate::error::{NotifierError, Result};

pub const DEFAULT_LABEL: &str = "Family/お荷物滞留お知らせメール";
pub const DEFAULT_STATUS_PATH: &str = "/dev/null";
pub const DEFAULT_USER_ID: &str = "me";
pub const DEFAULT_NOTIFICATION_TITLE: &str = "新着メール (お荷物滞留お知らせ)";

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const LINE_API_BASE: &str = "https://api.line.me";
pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Reads one environment value. Empty values count as unset.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// The process environment, for use as a [`Lookup`].
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn get(env: Lookup, key: &str) -> Option<String> {
    env(key).filter(|v| !v.trim().is_empty())
}

fn require(env: Lookup, key: &str) -> Result<String> {
    get(env, key).ok_or_else(|| NotifierError::missing_env(key))
}

fn variant(key: &str, sandbox_mode: bool) -> String {
    if sandbox_mode {
        format!("{key}_SANDBOX")
    } else {
        key.to_string()
    }
}

pub fn is_sandbox(env: Lookup) -> bool {
    env("SANDBOX_MODE").is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Status sink path, also usable when the rest of the config is broken.
pub fn status_path(env: Lookup) -> PathBuf {
    PathBuf::from(get(env, "GITHUB_OUTPUT").unwrap_or_else(|| DEFAULT_STATUS_PATH.to_string()))
}

/// Non-secret settings read from an optional TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub label: Option<String>,
    pub user_id: Option<String>,
    pub notification_title: Option<String>,
    pub gmail_api_base: Option<String>,
    pub line_api_base: Option<String>,
    pub slack_api_base: Option<String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path).map_err(|e| {
            NotifierError::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        toml::from_str(&s).map_err(|e| {
            NotifierError::Config(format!("invalid settings {}: {e}", path.display()))
        })
    }

    /// Environment first, then the file, then the built-in default.
    fn pick(env: Lookup, key: &str, file: &Option<String>, default: &str) -> String {
        get(env, key)
            .or_else(|| file.clone())
            .unwrap_or_else(|| default.to_string())
    }
}

/// Mail API credential material. At least one of the two must be set.
#[derive(Clone)]
pub struct GoogleConfig {
    /// Pre-issued, base64-encoded credential record.
    pub oauth_token: Option<String>,
    /// OAuth client secrets, inline JSON or a path to a JSON file.
    pub oauth_credentials: Option<String>,
}

impl GoogleConfig {
    pub fn from_env(env: Lookup) -> Result<Self> {
        let cfg = Self {
            oauth_token: get(env, "GOOGLE_OAUTH_TOKEN"),
            oauth_credentials: get(env, "GOOGLE_OAUTH_CREDENTIALS"),
        };
        if cfg.oauth_token.is_none() && cfg.oauth_credentials.is_none() {
            return Err(NotifierError::Config(
                "Environment variable GOOGLE_OAUTH_TOKEN or GOOGLE_OAUTH_CREDENTIALS is required"
                    .into(),
            ));
        }
        Ok(cfg)
    }
}

#[derive(Clone)]
pub struct LineConfig {
    pub channel_access_token: String,
    pub user_id: String,
    pub title: String,
    pub api_base: String,
}

impl LineConfig {
    pub fn from_env(env: Lookup, sandbox_mode: bool, settings: &Settings) -> Result<Self> {
        Ok(Self {
            channel_access_token: require(env, &variant("LINE_CHANNEL_ACCESS_TOKEN", sandbox_mode))?,
            user_id: require(env, &variant("LINE_USER_ID", sandbox_mode))?,
            title: Settings::pick(
                env,
                "LINE_MESSAGE_TITLE",
                &settings.notification_title,
                DEFAULT_NOTIFICATION_TITLE,
            ),
            api_base: Settings::pick(env, "LINE_API_BASE_URL", &settings.line_api_base, LINE_API_BASE),
        })
    }
}

#[derive(Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub api_base: String,
}

impl SlackConfig {
    pub fn from_env(env: Lookup, sandbox_mode: bool, settings: &Settings) -> Result<Self> {
        Ok(Self {
            bot_token: require(env, &variant("SLACK_BOT_TOKEN", sandbox_mode))?,
            channel_id: require(env, &variant("SLACK_CHANNEL_ID", sandbox_mode))?,
            api_base: Settings::pick(
                env,
                "SLACK_API_BASE_URL",
                &settings.slack_api_base,
                SLACK_API_BASE,
            ),
        })
    }
}

fn masked(secret: &Option<String>) -> Option<String> {
    secret.as_deref().map(mask_token)
}

impl fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("oauth_token", &masked(&self.oauth_token))
            .field("oauth_credentials", &masked(&self.oauth_credentials))
            .finish()
    }
}

impl fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineConfig")
            .field("channel_access_token", &mask_token(&self.channel_access_token))
            .field("user_id", &self.user_id)
            .field("title", &self.title)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &mask_token(&self.bot_token))
            .field("channel_id", &self.channel_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Everything one run needs, built once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub sandbox_mode: bool,
    pub status_path: PathBuf,
    pub label: String,
    pub user_id: String,
    pub gmail_api_base: String,
    pub google: GoogleConfig,
    pub line: LineConfig,
    pub slack: SlackConfig,
}

impl Config {
    pub fn load(env: Lookup, settings: &Settings) -> Result<Self> {
        let sandbox_mode = is_sandbox(env);
        Ok(Self {
            sandbox_mode,
            status_path: status_path(env),
            label: Settings::pick(env, "GMAIL_LABEL", &settings.label, DEFAULT_LABEL),
            user_id: Settings::pick(env, "GMAIL_USER_ID", &settings.user_id, DEFAULT_USER_ID),
            gmail_api_base: Settings::pick(
                env,
                "GMAIL_API_BASE_URL",
                &settings.gmail_api_base,
                GMAIL_API_BASE,
            ),
            google: GoogleConfig::from_env(env)?,
            line: LineConfig::from_env(env, sandbox_mode, settings)?,
            slack: SlackConfig::from_env(env, sandbox_mode, settings)?,
        })
    }

    pub fn status_suffix(&self) -> &'static str {
        if self.sandbox_mode { "_sandbox" } else { "" }
    }

    pub fn mode_display(&self) -> &'static str {
        if self.sandbox_mode {
            "🧪 Running in SANDBOX mode"
        } else {
            "🚀 Running in PRODUCTION mode"
        }
    }
}
