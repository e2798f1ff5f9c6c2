use std::collections::VecDeque;

/// A schedule command that arrived before the delivery channel existed.
///
/// Lives only in memory for the current process lifetime: if the worker is
/// torn down before the queue is flushed, the entries are lost. That is a
/// documented property of the design, not something this type papers over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
  pub id: String,
  pub title: String,
  pub body: String,
  pub target_timestamp: i64,
}

/// FIFO queue of pending notifications with explicit ownership: the
/// scheduler holds it, nothing else mutates it.
#[derive(Debug, Default)]
pub struct PendingQueue {
  entries: VecDeque<PendingNotification>,
}

impl PendingQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn enqueue(&mut self, notification: PendingNotification) {
    self.entries.push_back(notification);
  }

  /// Remove and return everything, oldest first.
  pub fn drain_all(&mut self) -> Vec<PendingNotification> {
    self.entries.drain(..).collect()
  }

  /// Drop queued entries for a cancelled id. Returns how many were removed.
  pub fn remove(&mut self, id: &str) -> usize {
    let before = self.entries.len();
    self.entries.retain(|entry| entry.id != id);
    before - self.entries.len()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
