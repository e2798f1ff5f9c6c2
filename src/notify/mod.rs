//! Page-side notification scheduling.
//!
//! The scheduler hands "fire notification N at time T" commands to the
//! background worker. While no delivery channel exists the commands wait in
//! an explicit FIFO queue; delivery is fire-and-forget, so the caller is
//! never told whether the eventual worker-side timer actually fired.

mod queue;
mod scheduler;
mod surface;

pub use queue::{PendingNotification, PendingQueue};
pub use scheduler::{NotificationScheduler, SchedulerEvent};
pub use surface::{NotificationSurface, TracingSurface};

use serde::Deserialize;

/// The user's stored notification choice. Persisted outside this core
/// (app settings); read as a gate before any platform permission check.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPreference {
  #[default]
  NotSet,
  Allowed,
  Denied,
}

/// What the notification surface itself reports about delivery permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformPermission {
  Granted,
  Denied,
  /// Undecided; the UI has to ask the user before anything can be shown.
  Prompt,
}

/// Result of a schedule call. Permission problems are reported here as
/// ordinary values, never as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
  /// Command handed to the delivery channel.
  Sent,
  /// No delivery channel yet; queued and waiting for one.
  Queued,
  /// Permission is undecided; the UI was signalled to obtain consent.
  ConsentRequired,
  /// Stored preference or platform permission says no. No-op.
  Denied,
}

/// Source of the persisted notification preference.
pub trait PreferenceSource: Send + Sync {
  fn notification_preference(&self) -> NotificationPreference;
}

/// A fixed preference value is its own source.
impl PreferenceSource for NotificationPreference {
  fn notification_preference(&self) -> NotificationPreference {
    *self
  }
}
