//! Caller-facing scheduling entry point.
//!
//! Permission gating happens here, before anything is sent; commands that
//! cannot be delivered yet wait in the pending queue while a bounded poll
//! watches for the delivery channel to come up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::worker::{ChannelSlot, Command};

use super::queue::{PendingNotification, PendingQueue};
use super::surface::NotificationSurface;
use super::{NotificationPreference, PlatformPermission, PreferenceSource, ScheduleOutcome};

/// Signals the scheduler raises for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
  /// Permission is undecided; the UI should obtain consent before the
  /// caller retries this schedule.
  ConsentRequired { id: String },
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Retry budget for the readiness poll (~2 minutes at the default interval).
/// Exhaustion is logged; queued entries stay put for a later attempt.
const DEFAULT_MAX_POLLS: u32 = 240;

pub struct NotificationScheduler {
  channel: ChannelSlot,
  pending: Arc<Mutex<PendingQueue>>,
  polling: Arc<AtomicBool>,
  poll_interval: Duration,
  max_polls: u32,
  preference: Arc<dyn PreferenceSource>,
  surface: Arc<dyn NotificationSurface>,
  events: mpsc::UnboundedSender<SchedulerEvent>,
}

impl NotificationScheduler {
  /// Returns the scheduler and the receiver for its UI-facing events.
  pub fn new(
    channel: ChannelSlot,
    preference: Arc<dyn PreferenceSource>,
    surface: Arc<dyn NotificationSurface>,
  ) -> (Self, mpsc::UnboundedReceiver<SchedulerEvent>) {
    let (events, events_rx) = mpsc::unbounded_channel();

    let scheduler = Self {
      channel,
      pending: Arc::new(Mutex::new(PendingQueue::new())),
      polling: Arc::new(AtomicBool::new(false)),
      poll_interval: DEFAULT_POLL_INTERVAL,
      max_polls: DEFAULT_MAX_POLLS,
      preference,
      surface,
      events,
    };

    (scheduler, events_rx)
  }

  pub fn with_poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  pub fn with_poll_budget(mut self, max_polls: u32) -> Self {
    self.max_polls = max_polls;
    self
  }

  /// Ask for a notification to be raised at `target_timestamp` (epoch
  /// milliseconds). Fire-and-forget: a `Sent` outcome only means the command
  /// reached the delivery channel, not that the timer will survive to fire.
  pub fn schedule(
    &self,
    id: &str,
    title: &str,
    body: &str,
    target_timestamp: i64,
  ) -> ScheduleOutcome {
    if let Some(blocked) = self.permission_gate(id) {
      return blocked;
    }

    let pending = PendingNotification {
      id: id.to_string(),
      title: title.to_string(),
      body: body.to_string(),
      target_timestamp,
    };

    if let Some(tx) = self.channel.get() {
      if self.flush_backlog(&tx) && tx.send(Command::from(pending.clone())).is_ok() {
        return ScheduleOutcome::Sent;
      }
      // Channel closed under us (worker torn down); queue for its successor.
      warn!(id, "delivery channel closed, queueing notification");
    }

    self.queue().enqueue(pending);
    self.ensure_polling();
    ScheduleOutcome::Queued
  }

  /// Send every entry queued before this call, oldest first. A backlog can
  /// outlive the readiness poll (its budget is finite), so each direct send
  /// doubles as a drain attempt; the backlog must go out ahead of the new
  /// command to keep delivery FIFO. Returns false if the channel closed
  /// mid-flush; unsent entries go back into the queue.
  fn flush_backlog(&self, tx: &mpsc::UnboundedSender<Command>) -> bool {
    let mut entries = self.queue().drain_all().into_iter();
    while let Some(entry) = entries.next() {
      if tx.send(Command::from(entry.clone())).is_err() {
        let mut queue = self.queue();
        queue.enqueue(entry);
        entries.for_each(|rest| queue.enqueue(rest));
        return false;
      }
    }
    true
  }

  /// Best-effort cancellation: the worker is asked to disarm its timer, any
  /// queued copy is dropped, and the platform is asked to close an
  /// already-shown notification with this tag. A timer that already queued
  /// at the platform layer may still fire.
  pub fn cancel(&self, id: &str) {
    if let Some(tx) = self.channel.get() {
      let _ = tx.send(Command::CancelNotification { id: id.to_string() });
    }

    let removed = self.queue().remove(id);
    if removed > 0 {
      debug!(id, removed, "dropped queued notifications");
    }

    self.surface.close(id);
  }

  /// Number of commands still waiting for a delivery channel.
  pub fn pending_len(&self) -> usize {
    self.queue().len()
  }

  /// Returns the blocking outcome, or None when scheduling may proceed.
  fn permission_gate(&self, id: &str) -> Option<ScheduleOutcome> {
    if self.preference.notification_preference() == NotificationPreference::Denied {
      debug!(id, "notifications denied by stored preference");
      return Some(ScheduleOutcome::Denied);
    }

    match self.surface.permission() {
      PlatformPermission::Denied => {
        debug!(id, "notifications denied by the platform");
        Some(ScheduleOutcome::Denied)
      }
      PlatformPermission::Prompt => {
        let _ = self.events.send(SchedulerEvent::ConsentRequired { id: id.to_string() });
        Some(ScheduleOutcome::ConsentRequired)
      }
      PlatformPermission::Granted => None,
    }
  }

  fn queue(&self) -> MutexGuard<'_, PendingQueue> {
    // The queue holds plain data; recover it even if a panicking thread
    // poisoned the lock.
    self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Start the readiness poll unless one is already running.
  fn ensure_polling(&self) {
    if self.polling.swap(true, Ordering::SeqCst) {
      return;
    }

    let channel = self.channel.clone();
    let pending = Arc::clone(&self.pending);
    let polling = Arc::clone(&self.polling);
    let interval = self.poll_interval;
    let max_polls = self.max_polls;

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);

      for _ in 0..max_polls {
        ticker.tick().await;

        let Some(tx) = channel.get() else { continue };

        let drained = pending
          .lock()
          .unwrap_or_else(|poisoned| poisoned.into_inner())
          .drain_all();
        debug!(count = drained.len(), "delivery channel ready, flushing queue");

        for entry in drained {
          // A failure here means the worker vanished between the readiness
          // check and the flush; fire-and-forget, nothing to report.
          let _ = tx.send(Command::from(entry));
        }

        polling.store(false, Ordering::SeqCst);
        return;
      }

      warn!("delivery channel never became ready, keeping queued notifications");
      polling.store(false, Ordering::SeqCst);
    });
  }
}
