//! Source image loading for the compositor.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use url::Url;

use crate::error::{Result, UserInfoError};

/// Fetches encoded image bytes for a source URL.
#[async_trait]
pub trait ImageLoader: Send + Sync + Debug {
    /// Raw bytes at `url`.
    async fn load(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP loader for avatar sources.
///
/// Requests are anonymous: no cookies and no `Referer`, so third-party avatar
/// hosts never learn which chat server a user is browsing.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: Client,
    base_url: Option<Url>,
}

impl HttpImageLoader {
    /// `base_url` resolves relative picture URLs such as `/static/a.png`.
    pub fn new(base_url: Option<Url>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(timeout)
            .referer(false)
            .build()
            .map_err(|e| UserInfoError::Network(e.to_string()))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Loader sharing an existing client.
    pub fn with_client(client: Client, base_url: Option<Url>) -> Self {
        Self { client, base_url }
    }

    /// Resolve `raw` to an absolute http(s) URL.
    pub fn resolve(&self, raw: &str) -> Result<Url> {
        let invalid = |reason: String| UserInfoError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    invalid("relative URL without a base".to_string())
                })?;
                base.join(raw).map_err(|e| invalid(e.to_string()))?
            }
            Err(e) => return Err(invalid(e.to_string())),
        };

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme '{other}'"))),
        }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = decode_data_url(url) {
            return bytes;
        }

        let resolved = self.resolve(url)?;
        log::debug!("Fetching avatar source {resolved}");

        let response = self.client.get(resolved.clone()).send().await?;
        if !response.status().is_success() {
            return Err(UserInfoError::Status {
                status: response.status(),
                url: resolved.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Inline `data:` sources never touch the network. Returns `None` for any
/// other scheme.
fn decode_data_url(url: &str) -> Option<Result<Vec<u8>>> {
    let rest = url.strip_prefix("data:")?;
    let Some((_, payload)) = rest.split_once(";base64,") else {
        return Some(Err(UserInfoError::InvalidUrl {
            url: url.chars().take(64).collect(),
            reason: "only base64 data URLs are supported".to_string(),
        }));
    };
    Some(
        BASE64
            .decode(payload.trim())
            .map_err(|e| UserInfoError::Decode(e.to_string())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(base: Option<&str>) -> HttpImageLoader {
        HttpImageLoader::with_client(
            Client::new(),
            base.map(|b| Url::parse(b).unwrap()),
        )
    }

    #[test]
    fn relative_urls_resolve_against_base() {
        let loader = loader(Some("http://chat.local:3030/"));
        assert_eq!(
            loader.resolve("/img/a.png").unwrap().as_str(),
            "http://chat.local:3030/img/a.png"
        );
        assert_eq!(
            loader.resolve("https://cdn.example/b.png").unwrap().as_str(),
            "https://cdn.example/b.png"
        );
    }

    #[test]
    fn relative_urls_need_a_base() {
        assert!(matches!(
            loader(None).resolve("img/a.png"),
            Err(UserInfoError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!(loader(None).resolve("file:///etc/passwd").is_err());
    }

    #[test]
    fn base64_data_urls_decode_inline() {
        let bytes = decode_data_url("data:image/png;base64,AQID")
            .unwrap()
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(decode_data_url("data:text/plain,hello").unwrap().is_err());
        assert!(decode_data_url("https://x/a.png").is_none());
    }
}
