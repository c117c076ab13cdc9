use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use serde::Deserialize;

use crate::error::CrawlError;

pub const DEFAULT_USER_AGENT: &str = "wikicensus/0.1";
pub const DEFAULT_KEYS_FILE: &str = "keys.toml";
pub const DEFAULT_VIEWS_TIMEZONE: &str = "America/New_York";

pub const ENV_USER: &str = "CRAWL_USER";
pub const ENV_PASSWORD: &str = "CRAWL_PASSWORD";
pub const ENV_SITE: &str = "CRAWL_SITE";
pub const ENV_SESSION_TOKEN: &str = "CRAWL_SESSION_COOKIE_TOKEN";
pub const ENV_CLOUD_ID: &str = "CRAWL_CLOUD_ID";

/// Contents of the local keys file. Every entry is optional so that the
/// environment can fill the gaps.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct KeysFile {
    #[serde(rename = "USER")]
    pub user: Option<String>,
    #[serde(rename = "PASSWORD")]
    pub password: Option<String>,
    #[serde(rename = "SITE")]
    pub site: Option<String>,
    #[serde(rename = "CLOUD_SESSION_COOKIE_TOKEN")]
    pub session_token: Option<String>,
    #[serde(rename = "CLOUD_ID")]
    pub cloud_id: Option<String>,
}

pub fn load_keys_file(path: &Path) -> Result<KeysFile> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: KeysFile =
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed)
}

/// Explicit path must exist; otherwise `keys.toml` in the working directory is
/// used when present.
pub fn locate_keys_file(explicit: Option<&Path>) -> Result<Option<KeysFile>> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("keys file not found: {}", path.display());
        }
        return load_keys_file(path).map(Some);
    }
    let default_path = Path::new(DEFAULT_KEYS_FILE);
    if default_path.exists() {
        return load_keys_file(default_path).map(Some);
    }
    Ok(None)
}

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub session_token: Option<String>,
    pub cloud_id: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("cloud_id", &self.cloud_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub space_limit: usize,
    pub page_limit: usize,
    pub user_agent: String,
    pub views_years: u32,
    pub views_timezone: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl HttpSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            timeout_ms: number("CRAWL_HTTP_TIMEOUT_MS", 30_000),
            connect_timeout_ms: number("CRAWL_HTTP_CONNECT_TIMEOUT_MS", 10_000),
            max_retries: usize::try_from(number("CRAWL_HTTP_RETRIES", 0)).unwrap_or(0),
            retry_delay_ms: number("CRAWL_HTTP_RETRY_DELAY_MS", 500),
            space_limit: usize::try_from(number("CRAWL_SPACE_LIMIT", 10))
                .unwrap_or(10)
                .max(1),
            page_limit: usize::try_from(number("CRAWL_PAGE_LIMIT", 100))
                .unwrap_or(100)
                .max(1),
            user_agent: text("CRAWL_USER_AGENT", DEFAULT_USER_AGENT),
            views_years: u32::try_from(number("CRAWL_VIEWS_YEARS", 1)).unwrap_or(1),
            views_timezone: text("CRAWL_VIEWS_TIMEZONE", DEFAULT_VIEWS_TIMEZONE),
        }
    }
}

/// Everything a crawl needs, built once at startup.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Wiki root without a trailing slash, e.g. `https://acme.atlassian.net/wiki`.
    pub site: String,
    pub credentials: Credentials,
    pub http: HttpSettings,
}

impl CrawlConfig {
    pub fn from_env(keys_path: Option<&Path>) -> Result<Self> {
        let keys = locate_keys_file(keys_path)?;
        let mut config = Self::resolve(keys.as_ref(), |key| env::var(key).ok())?;
        config.http = HttpSettings::from_env();
        Ok(config)
    }

    /// Resolve credentials: keys file > environment.
    pub fn resolve(
        keys: Option<&KeysFile>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let pick = |from_file: Option<&String>, env_key: &str| -> Option<String> {
            from_file
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .or_else(|| {
                    lookup(env_key)
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty())
                })
        };

        let user = pick(keys.and_then(|k| k.user.as_ref()), ENV_USER)
            .ok_or_else(|| missing_credential("USER", ENV_USER))?;
        let password = pick(keys.and_then(|k| k.password.as_ref()), ENV_PASSWORD)
            .ok_or_else(|| missing_credential("PASSWORD", ENV_PASSWORD))?;
        let site = pick(keys.and_then(|k| k.site.as_ref()), ENV_SITE)
            .ok_or_else(|| missing_credential("SITE", ENV_SITE))?;
        let session_token = pick(keys.and_then(|k| k.session_token.as_ref()), ENV_SESSION_TOKEN);
        let cloud_id = pick(keys.and_then(|k| k.cloud_id.as_ref()), ENV_CLOUD_ID);

        Url::parse(&site).with_context(|| format!("invalid SITE url: {site}"))?;
        let site = site.trim_end_matches('/').to_string();

        Ok(Self {
            site,
            credentials: Credentials {
                user,
                password,
                session_token,
                cloud_id,
            },
            http: HttpSettings::default(),
        })
    }

    /// Scheme and host of the site, where the analytics gateway lives.
    pub fn site_origin(&self) -> Option<String> {
        let parsed = Url::parse(&self.site).ok()?;
        let host = parsed.host_str()?;
        Some(match parsed.port() {
            Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
            None => format!("{}://{host}", parsed.scheme()),
        })
    }
}

fn missing_credential(file_key: &str, env_key: &str) -> anyhow::Error {
    CrawlError::Auth(format!(
        "missing {file_key}: set it in {DEFAULT_KEYS_FILE} or the {env_key} environment variable"
    ))
    .into()
}
