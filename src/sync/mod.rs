//! Cross-device sync against a remote key-value store.
//!
//! A sync slot is a remote record identified by an opaque uuid, protected by
//! a password and expiring after a TTL. The client is stateless: each call is
//! one request/response round trip with no retry or backoff; retry policy
//! belongs to the caller.

mod client;
mod protocol;

pub use client::{RemoteSyncClient, DEFAULT_TTL_MILLIS};

use thiserror::Error;

/// Why a sync operation failed. The variants matter: "nothing there"
/// (`NotFound`) and "garbage there" (`CorruptPayload`) must stay
/// distinguishable for callers.
#[derive(Debug, Error)]
pub enum SyncError {
  /// The HTTP round trip itself failed (connect error, timeout, ...).
  #[error("remote call failed: {0}")]
  Http(#[from] reqwest::Error),

  /// The endpoint answered with a non-2xx status.
  #[error("remote call failed: HTTP {status}")]
  Transport { status: u16 },

  /// 2xx answer whose body says the operation was not accepted.
  #[error("remote store rejected the request: {0}")]
  Rejected(String),

  /// Successful answer carrying no data: the slot does not exist or the
  /// password does not open it.
  #[error("sync record not found or inaccessible")]
  NotFound,

  /// The slot exists but its stored payload is not valid serialized data.
  #[error("stored payload could not be parsed: {0}")]
  CorruptPayload(#[source] serde_json::Error),

  /// The local payload could not be serialized for saving.
  #[error("payload could not be serialized: {0}")]
  Serialize(#[source] serde_json::Error),
}
