//! Cache-first request interception.
//!
//! The chain for every request: cached entry → network (opportunistically
//! cached) → offline fallback. The interceptor never returns an error; the
//! browser-facing contract is that a response always comes back.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheStore, StoredResponse};

use super::network::NetworkFetcher;

const OFFLINE_API_MESSAGE: &str = "You are offline; this action requires a network connection.";
const OFFLINE_HTML_BODY: &str =
  "<h1>Offline</h1><p>Network error: the app is currently offline.</p>";
const CACHE_FAILURE_BODY: &str = "Network error: the resource could not be loaded.";

/// API endpoints get a JSON offline answer instead of the offline page.
fn is_api_path(path: &str) -> bool {
  path.contains("/api/")
}

fn offline_api_response() -> StoredResponse {
  let body = serde_json::json!({
    "offline": true,
    "message": OFFLINE_API_MESSAGE,
  });

  StoredResponse {
    status: 503,
    content_type: Some("application/json".to_string()),
    body: body.to_string().into_bytes(),
  }
}

fn offline_html_response() -> StoredResponse {
  StoredResponse {
    status: 503,
    content_type: Some("text/html".to_string()),
    body: OFFLINE_HTML_BODY.as_bytes().to_vec(),
  }
}

fn cache_failure_response() -> StoredResponse {
  StoredResponse {
    status: 503,
    content_type: Some("text/plain".to_string()),
    body: CACHE_FAILURE_BODY.as_bytes().to_vec(),
  }
}

pub struct FetchInterceptor {
  store: Arc<CacheStore>,
  network: Arc<dyn NetworkFetcher>,
  offline_page: String,
}

impl FetchInterceptor {
  pub fn new(
    store: Arc<CacheStore>,
    network: Arc<dyn NetworkFetcher>,
    offline_page: impl Into<String>,
  ) -> Self {
    Self {
      store,
      network,
      offline_page: offline_page.into(),
    }
  }

  /// Serve one request. Infallible by contract: every failure inside the
  /// chain is converted into a synthesized 503.
  pub async fn handle(&self, request_key: &str) -> StoredResponse {
    match self.store.match_request(request_key) {
      Ok(Some(cached)) => return cached,
      Ok(None) => {}
      Err(err) => {
        warn!(key = request_key, error = %err, "cache lookup failed");
        return cache_failure_response();
      }
    }

    match self.network.fetch(request_key).await {
      Ok(response) if response.is_success() && response.same_origin => {
        let stored = response.into_stored();
        if let Err(err) = self.store.put(request_key, &stored) {
          warn!(key = request_key, error = %err, "failed to cache response");
        }
        stored
      }
      Ok(response) => {
        debug!(
          key = request_key,
          status = response.status,
          "unusable network response, serving fallback"
        );
        self.fallback(request_key)
      }
      Err(err) => {
        debug!(key = request_key, error = %err, "network fetch failed, serving fallback");
        self.fallback(request_key)
      }
    }
  }

  fn fallback(&self, request_key: &str) -> StoredResponse {
    if is_api_path(request_key) {
      return offline_api_response();
    }

    match self.store.match_request(&self.offline_page) {
      Ok(Some(page)) => page,
      Ok(None) => offline_html_response(),
      Err(err) => {
        warn!(key = %self.offline_page, error = %err, "offline page lookup failed");
        offline_html_response()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::testing::FakeNetwork;
  use std::sync::atomic::Ordering;

  fn interceptor_with(network: FakeNetwork) -> (FetchInterceptor, Arc<CacheStore>, Arc<FakeNetwork>) {
    let store = Arc::new(CacheStore::open_in_memory("v1").unwrap());
    let network = Arc::new(network);
    let interceptor = FetchInterceptor::new(
      Arc::clone(&store),
      Arc::clone(&network) as Arc<dyn NetworkFetcher>,
      "/offline.html",
    );
    (interceptor, store, network)
  }

  #[tokio::test]
  async fn cached_entry_skips_the_network() {
    let (interceptor, store, network) = interceptor_with(FakeNetwork::default());
    store
      .put(
        "/",
        &StoredResponse {
          status: 200,
          content_type: Some("text/html".to_string()),
          body: b"cached".to_vec(),
        },
      )
      .unwrap();

    let response = interceptor.handle("/").await;

    assert_eq!(response.body, b"cached");
    assert_eq!(network.fetch_calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn network_response_is_cached_for_next_time() {
    let network = FakeNetwork::default();
    network.serve("/app.js", FakeNetwork::page("console.log(1)"));
    let (interceptor, store, network) = interceptor_with(network);

    let first = interceptor.handle("/app.js").await;
    let second = interceptor.handle("/app.js").await;

    assert_eq!(first.body, b"console.log(1)");
    assert_eq!(second.body, b"console.log(1)");
    assert_eq!(network.fetch_calls.load(Ordering::SeqCst), 1);
    assert!(store.match_request("/app.js").unwrap().is_some());
  }

  #[tokio::test]
  async fn cross_origin_response_is_not_cached() {
    let network = FakeNetwork::default();
    let mut response = FakeNetwork::page("cdn asset");
    response.same_origin = false;
    network.serve("/vendor.js", response);
    let (interceptor, store, _) = interceptor_with(network);

    let served = interceptor.handle("/vendor.js").await;

    // Off-origin responses go down the fallback chain and never enter the store
    assert_eq!(served.status, 503);
    assert!(store.match_request("/vendor.js").unwrap().is_none());
  }

  #[tokio::test]
  async fn failed_api_request_yields_offline_json() {
    let (interceptor, _, _) = interceptor_with(FakeNetwork::default());

    let response = interceptor.handle("/api/timers").await;

    assert_eq!(response.status, 503);
    assert_eq!(response.content_type.as_deref(), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["offline"], serde_json::json!(true));
    assert!(body["message"].is_string());
  }

  #[tokio::test]
  async fn failed_page_request_prefers_cached_offline_page() {
    let (interceptor, store, _) = interceptor_with(FakeNetwork::default());
    store
      .put(
        "/offline.html",
        &StoredResponse {
          status: 200,
          content_type: Some("text/html".to_string()),
          body: b"<html>offline page</html>".to_vec(),
        },
      )
      .unwrap();

    let response = interceptor.handle("/some/page").await;

    assert_eq!(response.body, b"<html>offline page</html>");
  }

  #[tokio::test]
  async fn failed_page_request_falls_back_to_fixed_html() {
    let (interceptor, _, _) = interceptor_with(FakeNetwork::default());

    let response = interceptor.handle("/some/page").await;

    assert_eq!(response.status, 503);
    assert_eq!(response.content_type.as_deref(), Some("text/html"));
  }

  #[tokio::test]
  async fn error_status_is_not_cached() {
    let network = FakeNetwork::default();
    let mut response = FakeNetwork::page("boom");
    response.status = 500;
    network.serve("/broken", response);
    let (interceptor, store, _) = interceptor_with(network);

    let served = interceptor.handle("/broken").await;

    assert_eq!(served.status, 503);
    assert!(store.match_request("/broken").unwrap().is_none());
  }
}
