use tracing::info;

use super::PlatformPermission;

/// The platform's notification surface.
///
/// `tag` is a deduplication key: showing a second notification with the same
/// tag replaces the first instead of stacking a new one. Implementations must
/// honor that contract.
pub trait NotificationSurface: Send + Sync {
  /// Current delivery permission as the platform reports it.
  fn permission(&self) -> PlatformPermission;

  /// Raise (or replace, by tag) a notification.
  fn show(&self, tag: &str, title: &str, body: &str);

  /// Close an already-shown notification carrying this tag, if any.
  fn close(&self, tag: &str);
}

/// Surface for headless runs: notifications are emitted as log records.
#[derive(Debug, Default)]
pub struct TracingSurface;

impl NotificationSurface for TracingSurface {
  fn permission(&self) -> PlatformPermission {
    PlatformPermission::Granted
  }

  fn show(&self, tag: &str, title: &str, body: &str) {
    info!(tag, title, body, "notification");
  }

  fn close(&self, tag: &str) {
    info!(tag, "notification closed");
  }
}
