use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::cache::MAX_TTL;
use crate::{Error, Result};

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_ocr_timeout_secs() -> u64 {
    300
}

/// Client settings, usually read from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for single-file OCR submissions.
    #[serde(default = "default_ocr_timeout_secs")]
    pub ocr_timeout_secs: u64,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
    /// Env/dotenv keys searched, in order, for a bearer token.
    #[serde(default)]
    pub auth_token_env: Vec<String>,
    #[serde(default)]
    pub poll: PollIntervals,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            ocr_timeout_secs: default_ocr_timeout_secs(),
            http_headers: BTreeMap::new(),
            auth_token_env: Vec::new(),
            poll: PollIntervals::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Poll interval per reported batch status, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollIntervals {
    pub queued_ms: u64,
    pub processing_ms: u64,
    /// Used for `paused` and `error`.
    pub idle_ms: u64,
    pub default_ms: u64,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            queued_ms: 5_000,
            processing_ms: 1_500,
            idle_ms: 10_000,
            default_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            sweep_interval_secs: 600,
            namespace: "sharepoint".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(raw).map_err(|err| Error::Config(format!("parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
            Error::Config(format!("read config {} failed: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".to_string()));
        }
        let poll = &self.poll;
        if [poll.queued_ms, poll.processing_ms, poll.idle_ms, poll.default_ms].contains(&0) {
            return Err(Error::Config(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 || self.ocr_timeout_secs == 0 {
            return Err(Error::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        let max_secs = MAX_TTL.as_secs();
        if self.cache.default_ttl_secs > max_secs || self.cache.sweep_interval_secs > max_secs {
            return Err(Error::Config(format!(
                "cache ttl and sweep interval must not exceed {max_secs} seconds"
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    /// Builds the shared HTTP client, adding a bearer token when one of `auth_token_env` resolves.
    pub fn build_http_client(&self, env: &Env) -> Result<reqwest::Client> {
        let mut headers = header_map_from_pairs(&self.http_headers)?;
        if let Some(token) = self.auth_token_env.iter().find_map(|key| env.get(key)) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|err| Error::Config(format!("invalid auth token: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(Error::Http)
    }
}

fn header_map_from_pairs(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| Error::Config(format!("invalid http header name {name:?}: {err}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            Error::Config(format!("invalid http header value for {name:?}: {err}"))
        })?;
        out.insert(header_name, header_value);
    }
    Ok(out)
}

/// Values from a `.env` file, falling back to the process environment.
#[derive(Clone, Default)]
pub struct Env {
    pub dotenv: BTreeMap<String, String>,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.dotenv.keys().map(String::as_str).collect();
        f.debug_struct("Env").field("dotenv_keys", &keys).finish()
    }
}

impl Env {
    pub fn parse_dotenv(contents: &str) -> Self {
        Self {
            dotenv: parse_dotenv(contents),
        }
    }

    pub async fn load_dotenv(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse_dotenv(&raw))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.dotenv.get(key) {
            return Some(value.clone());
        }
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

pub fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        if key.is_empty() || value.trim().is_empty() {
            continue;
        }
        out.insert(key.to_string(), value.to_string());
    }
    out
}
