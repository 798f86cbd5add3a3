use crate::core::config::ProxyConfig;
use crate::core::error::ResolveError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use url::Url;

/// Downloads remote catalog assets (music, sound effects, slide images).
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError>;
}

pub fn is_remote(location: &str) -> bool {
    let lower = location.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Fetches over HTTP, optionally through the same-origin catalog proxy.
pub struct HttpFetcher {
    client: reqwest::Client,
    proxy_base: Option<Url>,
    allowed_hosts: Vec<String>,
}

impl HttpFetcher {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .context("Failed to build HTTP client")?;
        let proxy_base = match config.base_url.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => {
                Some(Url::parse(base).with_context(|| format!("Invalid proxy url {}", base))?)
            }
            _ => None,
        };

        Ok(Self {
            client,
            proxy_base,
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .collect(),
        })
    }

    fn host_allowed(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.allowed_hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// The URL actually requested for `target`. Rejects non-catalog hosts.
    pub fn request_url(&self, target: &str) -> Result<Url, ResolveError> {
        let url = Url::parse(target.trim())
            .map_err(|_| ResolveError::InvalidLocation(target.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ResolveError::InvalidLocation(target.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ResolveError::InvalidLocation(target.to_string()))?;
        if !self.host_allowed(host) {
            return Err(ResolveError::HostNotAllowed(host.to_string()));
        }

        match &self.proxy_base {
            Some(base) => {
                let mut proxied = base.clone();
                proxied.query_pairs_mut().append_pair("url", url.as_str());
                Ok(proxied)
            }
            None => Ok(url),
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let request_url = self.request_url(url)?;
        let response = self
            .client
            .get(request_url)
            .send()
            .await
            .map_err(|e| ResolveError::fetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::fetch(format!("{} returned {}", url, status)));
        }

        debug!(
            "Fetched {} (content-type: {}, content-length: {})",
            url,
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown"),
            response
                .content_length()
                .map(|len| len.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ResolveError::fetch(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(base_url: Option<&str>) -> HttpFetcher {
        let config = ProxyConfig {
            base_url: base_url.map(str::to_string),
            ..ProxyConfig::default()
        };
        HttpFetcher::new(&config).unwrap()
    }

    #[test]
    fn proxy_wraps_target_as_query_parameter() {
        let fetcher = fetcher(Some("http://localhost:3000/api/proxy"));
        let url = fetcher
            .request_url("https://cdn.freesound.org/previews/1/1_hq.mp3?x=1&y=2")
            .unwrap();

        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.path(), "/api/proxy");
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "url");
        assert_eq!(value, "https://cdn.freesound.org/previews/1/1_hq.mp3?x=1&y=2");
    }

    #[test]
    fn direct_mode_keeps_url() {
        let url = fetcher(None)
            .request_url("https://prod-1.storage.jamendo.com/?trackid=168")
            .unwrap();
        assert_eq!(url.as_str(), "https://prod-1.storage.jamendo.com/?trackid=168");
    }

    #[test]
    fn foreign_hosts_are_rejected_before_any_request() {
        let fetcher = fetcher(Some("http://localhost:3000/api/proxy"));
        assert!(matches!(
            fetcher.request_url("https://evil.example.com/a.mp3"),
            Err(ResolveError::HostNotAllowed(host)) if host == "evil.example.com"
        ));
        assert!(matches!(
            fetcher.request_url("https://notfreesound.org/a.mp3"),
            Err(ResolveError::HostNotAllowed(_))
        ));
        assert!(matches!(
            fetcher.request_url("ftp://freesound.org/a.mp3"),
            Err(ResolveError::InvalidLocation(_))
        ));
        assert!(fetcher.request_url("https://sub.freesound.org/a.mp3").is_ok());
    }

    #[tokio::test]
    async fn fetch_of_disallowed_host_fails_fast() {
        let err = fetcher(None).fetch("https://example.com/a.mp3").await.unwrap_err();
        assert!(matches!(err, ResolveError::HostNotAllowed(_)));
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://a/b.mp3"));
        assert!(is_remote("HTTP://a/b.mp3"));
        assert!(!is_remote("build/speech/c1.mp3"));
    }
}
