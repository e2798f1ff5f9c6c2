//! Wire shapes of the page↔worker messages.
//!
//! Commands are a closed, tagged set so the worker can dispatch exhaustively;
//! an unknown `action` fails decoding at the boundary instead of being
//! silently swallowed by a default branch.

use serde::{Deserialize, Serialize};

use crate::notify::PendingNotification;

/// UI → worker command. JSON tag: `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
  /// Raise notification `id` at `timestamp` (epoch milliseconds). `id`
  /// doubles as the platform dedup tag.
  ScheduleNotification {
    id: String,
    title: String,
    body: String,
    timestamp: i64,
  },
  CancelNotification {
    id: String,
  },
  /// Re-fetch the warm-up list, bypassing intermediate caches.
  UpdateCache,
}

impl From<PendingNotification> for Command {
  fn from(pending: PendingNotification) -> Self {
    Command::ScheduleNotification {
      id: pending.id,
      title: pending.title,
      body: pending.body,
      timestamp: pending.target_timestamp,
    }
  }
}

/// Worker → pages broadcast. JSON tag: `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Broadcast {
  CacheUpdated { timestamp: i64 },
}
