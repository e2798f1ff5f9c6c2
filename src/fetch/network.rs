use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header;
use url::Url;

use crate::cache::StoredResponse;

/// A response as it came off the network, before any caching decision.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  /// False when redirects took the request off the configured origin.
  /// Such responses may be served but are never cached.
  pub same_origin: bool,
}

impl FetchedResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn into_stored(self) -> StoredResponse {
    StoredResponse {
      status: self.status,
      content_type: self.content_type,
      body: self.body,
    }
  }
}

/// Network access as the interceptor and the warm-up routine see it.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
  async fn fetch(&self, path: &str) -> Result<FetchedResponse>;

  /// Fetch bypassing intermediate HTTP caches. Used by explicit cache
  /// refreshes so a stale proxy copy cannot satisfy the request.
  async fn fetch_reload(&self, path: &str) -> Result<FetchedResponse>;
}

/// reqwest-backed fetcher resolving request paths against one origin.
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(origin: &str) -> Result<Self> {
    let origin = Url::parse(origin).map_err(|e| eyre!("Invalid origin {}: {}", origin, e))?;

    Ok(Self {
      client: reqwest::Client::new(),
      origin,
    })
  }

  async fn fetch_inner(&self, path: &str, reload: bool) -> Result<FetchedResponse> {
    let url = self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid request path {}: {}", path, e))?;

    let mut request = self.client.get(url);
    if reload {
      request = request
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::PRAGMA, "no-cache");
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request for {} failed: {}", path, e))?;

    let status = response.status().as_u16();
    let same_origin = response.url().origin() == self.origin.origin();
    let content_type = response
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", path, e))?
      .to_vec();

    Ok(FetchedResponse {
      status,
      content_type,
      body,
      same_origin,
    })
  }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
  async fn fetch(&self, path: &str) -> Result<FetchedResponse> {
    self.fetch_inner(path, false).await
  }

  async fn fetch_reload(&self, path: &str) -> Result<FetchedResponse> {
    self.fetch_inner(path, true).await
  }
}
