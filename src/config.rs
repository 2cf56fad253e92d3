//! Settings read from the environment (after `.env` has been loaded).
//!
//! Everything goes through a lookup function so tests can supply their own
//! variables without touching the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::client::{DEFAULT_GITHUB_API, DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS, PollOptions, Repository};
use crate::error::ConfigError;

pub const DATA_DIR: &str = "PODRELAY_DATA_DIR";
pub const MEDIA_DIR: &str = "PODRELAY_MEDIA_DIR";
pub const USER_AGENT: &str = "PODRELAY_USER_AGENT";
pub const FEED_DELAY_MS: &str = "PODRELAY_FEED_DELAY_MS";
pub const TOP_LIMIT: &str = "PODRELAY_TOP_LIMIT";
pub const GITHUB_TOKEN: &str = "PODRELAY_GITHUB_TOKEN";
pub const FALLBACK_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const REPOSITORY: &str = "PODRELAY_REPOSITORY";
pub const PAGES_URL: &str = "PODRELAY_PAGES_URL";
pub const GITHUB_API: &str = "PODRELAY_GITHUB_API";
pub const POLL_ATTEMPTS: &str = "PODRELAY_POLL_ATTEMPTS";
pub const POLL_INTERVAL_SECS: &str = "PODRELAY_POLL_INTERVAL_SECS";

const DEFAULT_FEED_DELAY_MS: u64 = 1000;
const DEFAULT_TOP_LIMIT: usize = 50;

/// `podrelay/<version>`
pub fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Settings for a worker invocation
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Root of the blob store; records land under `<data_dir>/data/...`
    pub data_dir: PathBuf,
    /// Where downloaded episodes are stored
    pub media_dir: PathBuf,
    pub user_agent: String,
    pub feed_delay: Duration,
    pub top_limit: usize,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: non_empty(&lookup, DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            media_dir: non_empty(&lookup, MEDIA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("media")),
            user_agent: non_empty(&lookup, USER_AGENT).unwrap_or_else(default_user_agent),
            feed_delay: Duration::from_millis(
                parsed(&lookup, FEED_DELAY_MS)?.unwrap_or(DEFAULT_FEED_DELAY_MS),
            ),
            top_limit: parsed(&lookup, TOP_LIMIT)?.unwrap_or(DEFAULT_TOP_LIMIT),
        })
    }
}

/// Settings for the dispatching and polling side
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub token: Option<String>,
    pub repository: Option<Repository>,
    pub pages_url: Option<Url>,
    pub api_base: String,
    pub poll: PollOptions,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let repository = non_empty(&lookup, REPOSITORY)
            .map(|value| {
                value
                    .parse::<Repository>()
                    .map_err(|reason| ConfigError::Invalid {
                        key: REPOSITORY,
                        value,
                        reason,
                    })
            })
            .transpose()?;

        let pages_url = match non_empty(&lookup, PAGES_URL) {
            Some(value) => Some(parse_url(PAGES_URL, value)?),
            None => match &repository {
                Some(repo) => Some(parse_url(
                    PAGES_URL,
                    format!("https://{}.github.io/{}/", repo.owner, repo.name),
                )?),
                None => None,
            },
        };

        Ok(Self {
            token: non_empty(&lookup, GITHUB_TOKEN).or_else(|| non_empty(&lookup, FALLBACK_GITHUB_TOKEN)),
            repository,
            pages_url,
            api_base: non_empty(&lookup, GITHUB_API).unwrap_or_else(|| DEFAULT_GITHUB_API.to_string()),
            poll: PollOptions {
                max_attempts: parsed(&lookup, POLL_ATTEMPTS)?.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                interval: parsed(&lookup, POLL_INTERVAL_SECS)?
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_INTERVAL),
            },
            user_agent: non_empty(&lookup, USER_AGENT).unwrap_or_else(default_user_agent),
        })
    }

    /// The repository to dispatch to; required for dispatching
    pub fn repository(&self) -> Result<&Repository, ConfigError> {
        self.repository.as_ref().ok_or(ConfigError::Missing(REPOSITORY))
    }

    /// Base URL of the published store; required for polling and reading
    pub fn pages_url(&self) -> Result<&Url, ConfigError> {
        self.pages_url.as_ref().ok_or(ConfigError::Missing(PAGES_URL))
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    non_empty(lookup, key)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn parse_url(key: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(&value).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
