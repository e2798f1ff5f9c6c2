//! The stateless protocol client.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::protocol::{unwrap_data, ApiResponse, GetRequest, SaveRequest};
use super::SyncError;

/// Slots expire after thirty days unless the caller says otherwise.
pub const DEFAULT_TTL_MILLIS: u64 = 30 * 24 * 60 * 60 * 1000;

/// The endpoint gates reads by IP unless told not to; snapshots are meant to
/// be pulled from any device.
const SAFE_IP_ANY: &str = "*.*.*.*";

pub struct RemoteSyncClient {
  http: reqwest::Client,
  endpoint: Url,
}

impl RemoteSyncClient {
  pub fn new(endpoint: &str) -> Result<Self> {
    let endpoint =
      Url::parse(endpoint).map_err(|e| eyre!("Invalid sync endpoint {}: {}", endpoint, e))?;

    Ok(Self {
      http: reqwest::Client::new(),
      endpoint,
    })
  }

  fn mode_url(&self, mode: &str) -> Url {
    let mut url = self.endpoint.clone();
    url.query_pairs_mut().append_pair("mode", mode);
    url
  }

  /// Push a snapshot into the slot `key`, protected by `secret`, expiring
  /// after `ttl_millis`.
  pub async fn save<T: Serialize>(
    &self,
    key: &str,
    secret: &str,
    payload: &T,
    ttl_millis: u64,
  ) -> Result<(), SyncError> {
    let data = serde_json::to_string(payload).map_err(SyncError::Serialize)?;

    let response = self
      .http
      .post(self.mode_url("set"))
      .json(&SaveRequest {
        data,
        password: secret,
        safe_ip: SAFE_IP_ANY,
        expired_time: ttl_millis,
        uuid: key,
      })
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      warn!(key, status = status.as_u16(), "sync save failed");
      return Err(SyncError::Transport {
        status: status.as_u16(),
      });
    }

    let body: ApiResponse = response.json().await?;
    if body.is_success() {
      debug!(key, "sync snapshot saved");
      Ok(())
    } else {
      let message = body
        .message
        .unwrap_or_else(|| "save was not accepted".to_string());
      warn!(key, %message, "sync save rejected");
      Err(SyncError::Rejected(message))
    }
  }

  /// Pull the snapshot stored in slot `key`. With `should_delete` the remote
  /// record is removed after the read.
  pub async fn get(&self, key: &str, secret: &str, should_delete: bool) -> Result<Value, SyncError> {
    let response = self
      .http
      .post(self.mode_url("get"))
      .json(&GetRequest {
        uuid: key,
        password: secret,
        should_delete,
      })
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      warn!(key, status = status.as_u16(), "sync get failed");
      return Err(SyncError::Transport {
        status: status.as_u16(),
      });
    }

    let body: ApiResponse = response.json().await?;
    if !body.is_success() {
      let message = body
        .message
        .unwrap_or_else(|| "get was not accepted".to_string());
      warn!(key, %message, "sync get rejected");
      return Err(SyncError::Rejected(message));
    }

    match body.data {
      // An empty string is how the store reports an empty slot, same as null
      None | Some(Value::Null) => Err(SyncError::NotFound),
      Some(Value::String(raw)) if raw.is_empty() => Err(SyncError::NotFound),
      Some(data) => unwrap_data(data),
    }
  }
}
