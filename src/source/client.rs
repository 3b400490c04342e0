//! Blocking HTTP client for the book API: fixed browser-like headers, redirects left to the
//! caller, and separate timeouts for metadata calls and archive downloads.

use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://qimao.tutublog.eu.org";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://www.qimao.com/";
/// Timeout for link resolution, catalog and search requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
/// Timeout for the whole archive download.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const MAX_REDIRECTS: usize = 10;

/// Blocking client bound to one API base URL.
///
/// API calls never follow redirects: download link resolution needs to see the redirect
/// status and its `Location` header. Archive downloads go through a second client that does.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: reqwest::blocking::Client,
    follow: reqwest::blocking::Client,
    base: String,
    timeout: Duration,
    download_timeout: Duration,
}

impl ApiClient {
    /// Build a client with default headers, timeouts and API base.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Absolute URL for an API path such as `book/1/chapters`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// GET with the metadata timeout.
    pub fn get(&self, url: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        self.inner.get(url).timeout(self.timeout).send()
    }

    /// GET with query parameters and the metadata timeout.
    pub fn get_query(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::blocking::Response, reqwest::Error> {
        self.inner.get(url).query(query).timeout(self.timeout).send()
    }

    /// GET with the download timeout, for streaming large bodies.
    pub fn get_download(&self, url: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        self.follow.get(url).timeout(self.download_timeout).send()
    }
}

/// Builder for ApiClient with optional base URL, headers and timeouts.
#[derive(Debug)]
pub struct ApiClientBuilder {
    base: String,
    user_agent: Option<String>,
    referer: Option<String>,
    timeout_secs: u64,
    download_timeout_secs: u64,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            base: DEFAULT_API_BASE.to_string(),
            user_agent: None,
            referer: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

impl ApiClientBuilder {
    /// API base URL, without trailing slash (one is stripped if present).
    pub fn base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Set a custom User-Agent. If not set, a desktop browser string is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Timeout for metadata requests in seconds. Default 15.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Timeout for the archive download in seconds. Default 300.
    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.download_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<ApiClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let referer = self.referer.unwrap_or_else(|| DEFAULT_REFERER.to_string());
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&referer) {
            headers.insert(REFERER, v);
        }
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent.clone())
            .default_headers(headers.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let follow = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(ApiClient {
            inner,
            follow,
            base: self.base,
            timeout: Duration::from_secs(self.timeout_secs),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_path() -> Result<(), reqwest::Error> {
        let client = ApiClient::builder()
            .base_url("http://127.0.0.1:9/api/")
            .build()?;
        assert_eq!(
            client.endpoint("/book/7/chapters"),
            "http://127.0.0.1:9/api/book/7/chapters"
        );
        assert_eq!(client.endpoint("7"), "http://127.0.0.1:9/api/7");
        Ok(())
    }

    #[test]
    fn default_base_is_public_api() -> Result<(), reqwest::Error> {
        let client = ApiClient::new()?;
        assert_eq!(client.endpoint("search"), format!("{}/search", DEFAULT_API_BASE));
        Ok(())
    }
}
