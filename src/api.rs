use std::time::Duration;

use reqwest::Url;

use crate::config::{ClientConfig, Env};
use crate::{Error, Result};

/// Base URL plus the HTTP client shared by every endpoint group.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    ocr_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self {
            http,
            base_url: parse_base_url(base_url)?,
            ocr_timeout: Duration::from_secs(300),
        })
    }

    pub fn from_config(config: &ClientConfig, env: &Env) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http: config.build_http_client(env)?,
            base_url: parse_base_url(&config.base_url)?,
            ocr_timeout: config.ocr_timeout(),
        })
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_ocr_timeout(mut self, timeout: Duration) -> Self {
        self.ocr_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn ocr_timeout(&self) -> Duration {
        self.ocr_timeout
    }

    /// `<base>/api/<segments...>`, each segment percent-encoded.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                Error::Config(format!("base url cannot be a base: {}", self.base_url))
            })?;
            path.pop_if_empty().push("api").extend(segments);
        }
        Ok(url)
    }

    pub(crate) fn get(&self, segments: &[&str]) -> Result<reqwest::RequestBuilder> {
        Ok(self.http.get(self.endpoint(segments)?))
    }

    pub(crate) fn post(&self, segments: &[&str]) -> Result<reqwest::RequestBuilder> {
        Ok(self.http.post(self.endpoint(segments)?))
    }

    pub(crate) fn put(&self, segments: &[&str]) -> Result<reqwest::RequestBuilder> {
        Ok(self.http.put(self.endpoint(segments)?))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    // Accept both `http://host` and `http://host/api`.
    let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(Error::Config("base url must not be empty".to_string()));
    }
    let url = Url::parse(trimmed)
        .map_err(|err| Error::Config(format!("invalid base url {raw:?}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("base url cannot be a base: {raw}")));
    }
    Ok(url)
}
