//! Page-facing plumbing: the delivery channel slot pages poll, and the
//! registry the worker broadcasts through.

use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

use super::message::{Broadcast, Command};

/// Shared slot holding the delivery channel to the worker.
///
/// Empty until the worker finishes activating and claims its pages; the
/// scheduler polls this to learn when commands can flow.
#[derive(Clone, Default)]
pub struct ChannelSlot {
  inner: Arc<RwLock<Option<mpsc::UnboundedSender<Command>>>>,
}

impl ChannelSlot {
  pub fn get(&self) -> Option<mpsc::UnboundedSender<Command>> {
    self
      .inner
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .clone()
  }

  pub fn set(&self, sender: mpsc::UnboundedSender<Command>) {
    *self
      .inner
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sender);
  }

  /// Drop the channel, e.g. when the worker shuts down.
  pub fn clear(&self) {
    *self
      .inner
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
  }

  pub fn is_ready(&self) -> bool {
    self
      .inner
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .is_some()
  }
}

/// All open pages known to the worker. One worker serves every page, so a
/// broadcast from one page's action reaches all of them.
#[derive(Clone, Default)]
pub struct PageRegistry {
  pages: Arc<Mutex<Vec<mpsc::UnboundedSender<Broadcast>>>>,
}

impl PageRegistry {
  /// Register a page; the returned receiver sees every future broadcast.
  pub fn register(&self) -> mpsc::UnboundedReceiver<Broadcast> {
    let (tx, rx) = mpsc::unbounded_channel();
    self
      .pages
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .push(tx);
    rx
  }

  /// Deliver a message to every live page, pruning closed ones.
  /// Returns the number of pages reached.
  pub fn broadcast(&self, message: &Broadcast) -> usize {
    let mut pages = self
      .pages
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());

    pages.retain(|page| page.send(message.clone()).is_ok());
    pages.len()
  }

  pub fn len(&self) -> usize {
    self
      .pages
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .len()
  }
}
