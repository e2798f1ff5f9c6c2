//! Install/activate lifecycle and command handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::CacheConfig;
use crate::fetch::{FetchInterceptor, NetworkFetcher};
use crate::notify::NotificationSurface;

use super::message::{Broadcast, Command};
use super::pages::{ChannelSlot, PageRegistry};

pub(crate) fn now_millis() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

/// `Installing → Waiting → Activating → Controlling`. The worker skips the
/// usual wait-for-pages-to-close step and promotes itself immediately after
/// install, so a new cache generation takes effect without a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  Waiting,
  Activating,
  Controlling,
}

/// Armed one-shot notification timers, keyed by tag.
#[derive(Clone, Default)]
struct ArmedTimers {
  inner: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl ArmedTimers {
  fn lock(&self) -> MutexGuard<'_, HashMap<String, AbortHandle>> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Arming an already-armed tag replaces the previous timer.
  fn arm(&self, id: &str, handle: AbortHandle) {
    if let Some(old) = self.lock().insert(id.to_string(), handle) {
      old.abort();
    }
  }

  fn disarm(&self, id: &str) -> bool {
    match self.lock().remove(id) {
      Some(handle) => {
        handle.abort();
        true
      }
      None => false,
    }
  }

  /// Called by a timer that fired: its handle is spent.
  fn finished(&self, id: &str) {
    self.lock().remove(id);
  }

  fn len(&self) -> usize {
    self.lock().len()
  }
}

/// The worker-side execution scope.
///
/// Owns the cache lifecycle, serves intercepted fetches, and turns schedule
/// commands into armed timers. Everything here is single-threaded in spirit:
/// one command is handled to completion before the next is taken, so a
/// handler's work never outlives the event that started it.
pub struct BackgroundContext {
  state: LifecycleState,
  store: Arc<CacheStore>,
  network: Arc<dyn NetworkFetcher>,
  surface: Arc<dyn NotificationSurface>,
  interceptor: FetchInterceptor,
  pages: PageRegistry,
  slot: ChannelSlot,
  /// Taken when pages are claimed; the context keeps no sender of its own,
  /// so the mailbox closes once every page lets go.
  mailbox: Option<mpsc::UnboundedSender<Command>>,
  warm_up: Vec<String>,
  armed: ArmedTimers,
}

impl BackgroundContext {
  pub fn new(
    config: &CacheConfig,
    store: Arc<CacheStore>,
    network: Arc<dyn NetworkFetcher>,
    surface: Arc<dyn NotificationSurface>,
    pages: PageRegistry,
    slot: ChannelSlot,
    mailbox: mpsc::UnboundedSender<Command>,
  ) -> Self {
    let interceptor = FetchInterceptor::new(
      Arc::clone(&store),
      Arc::clone(&network),
      config.offline_page.clone(),
    );

    Self {
      state: LifecycleState::Installing,
      store,
      network,
      surface,
      interceptor,
      pages,
      slot,
      mailbox: Some(mailbox),
      warm_up: config.warm_up.clone(),
      armed: ArmedTimers::default(),
    }
  }

  pub fn state(&self) -> LifecycleState {
    self.state
  }

  /// Entry point for intercepted requests.
  pub fn interceptor(&self) -> &FetchInterceptor {
    &self.interceptor
  }

  /// Install, activate, then serve commands until the mailbox closes.
  pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
    self.install().await;

    while let Some(command) = commands.recv().await {
      self.handle_command(command).await;
    }

    self.slot.clear();
    info!("command channel closed, background context terminating");
  }

  /// Install: warm the cache, then promote immediately (skip waiting for
  /// pages to close) and activate.
  pub async fn install(&mut self) {
    self.state = LifecycleState::Installing;
    info!(store = self.store.store_name(), "installing");

    self.warm_cache(false).await;

    self.state = LifecycleState::Waiting;
    self.activate();
  }

  /// Activate: garbage-collect stale generations, then claim all pages by
  /// publishing the delivery channel.
  fn activate(&mut self) {
    self.state = LifecycleState::Activating;

    match self.store.collect_garbage() {
      Ok(removed) if removed > 0 => info!(removed, "dropped stale cache versions"),
      Ok(_) => {}
      Err(err) => warn!(error = %err, "failed to collect stale cache versions"),
    }

    if let Some(mailbox) = self.mailbox.take() {
      self.slot.set(mailbox);
    }
    self.state = LifecycleState::Controlling;
    info!("claimed pages, current cache version in effect");
  }

  /// Fetch every warm-up resource and store the successes. Attempts are
  /// independent: a failed resource is logged and skipped, never aborting
  /// the pass.
  async fn warm_cache(&self, reload: bool) {
    let attempts = self.warm_up.iter().map(|path| {
      let network = Arc::clone(&self.network);
      async move {
        let fetched = if reload {
          network.fetch_reload(path).await
        } else {
          network.fetch(path).await
        };
        (path.as_str(), fetched)
      }
    });

    let mut stored = 0usize;
    for (path, fetched) in futures::future::join_all(attempts).await {
      match fetched {
        Ok(response) if response.is_success() => {
          match self.store.put(path, &response.into_stored()) {
            Ok(()) => stored += 1,
            Err(err) => warn!(path, error = %err, "failed to store warm-up resource"),
          }
        }
        Ok(response) => warn!(path, status = response.status, "skipping warm-up resource"),
        Err(err) => warn!(path, error = %err, "failed to fetch warm-up resource"),
      }
    }

    debug!(stored, total = self.warm_up.len(), reload, "cache warm-up pass finished");
  }

  pub async fn handle_command(&self, command: Command) {
    match command {
      Command::ScheduleNotification {
        id,
        title,
        body,
        timestamp,
      } => self.schedule_notification(id, title, body, timestamp),
      Command::CancelNotification { id } => self.cancel_notification(&id),
      Command::UpdateCache => self.update_cache().await,
    }
  }

  fn schedule_notification(&self, id: String, title: String, body: String, timestamp: i64) {
    let delay = timestamp - now_millis();
    if delay <= 0 {
      // Target already passed: raise right away
      self.surface.show(&id, &title, &body);
      return;
    }

    debug!(id = %id, delay_ms = delay, "arming notification timer");
    let surface = Arc::clone(&self.surface);
    let armed = self.armed.clone();
    let tag = id.clone();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(delay as u64)).await;
      armed.finished(&tag);
      surface.show(&tag, &title, &body);
    });

    self.armed.arm(&id, handle.abort_handle());
  }

  fn cancel_notification(&self, id: &str) {
    if self.armed.disarm(id) {
      debug!(id, "disarmed notification timer");
    }
    self.surface.close(id);
  }

  async fn update_cache(&self) {
    info!("refreshing cache on demand");
    self.warm_cache(true).await;

    let reached = self.pages.broadcast(&Broadcast::CacheUpdated {
      timestamp: now_millis(),
    });
    info!(reached, "cache refreshed");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::testing::FakeNetwork;
  use crate::notify::PlatformPermission;
  use std::sync::atomic::Ordering;

  #[derive(Default)]
  struct RecordingSurface {
    shown: Mutex<Vec<String>>,
    closed: Mutex<Vec<String>>,
  }

  impl NotificationSurface for RecordingSurface {
    fn permission(&self) -> PlatformPermission {
      PlatformPermission::Granted
    }

    fn show(&self, tag: &str, _title: &str, _body: &str) {
      self.shown.lock().unwrap().push(tag.to_string());
    }

    fn close(&self, tag: &str) {
      self.closed.lock().unwrap().push(tag.to_string());
    }
  }

  struct Harness {
    context: BackgroundContext,
    store: Arc<CacheStore>,
    network: Arc<FakeNetwork>,
    surface: Arc<RecordingSurface>,
    pages: PageRegistry,
    slot: ChannelSlot,
    mailbox: mpsc::UnboundedSender<Command>,
  }

  fn harness(warm_up: &[&str]) -> Harness {
    let config = CacheConfig {
      warm_up: warm_up.iter().map(|s| s.to_string()).collect(),
      ..CacheConfig::default()
    };
    let store = Arc::new(CacheStore::open_in_memory("v1").unwrap());
    let network = Arc::new(FakeNetwork::default());
    let surface = Arc::new(RecordingSurface::default());
    let pages = PageRegistry::default();
    let slot = ChannelSlot::default();
    let (mailbox, _rx) = mpsc::unbounded_channel();

    let context = BackgroundContext::new(
      &config,
      Arc::clone(&store),
      Arc::clone(&network) as Arc<dyn NetworkFetcher>,
      Arc::clone(&surface) as Arc<dyn NotificationSurface>,
      pages.clone(),
      slot.clone(),
      mailbox.clone(),
    );

    Harness {
      context,
      store,
      network,
      surface,
      pages,
      slot,
      mailbox,
    }
  }

  #[tokio::test]
  async fn install_survives_failed_warm_up_resources() {
    let mut h = harness(&["/", "/missing"]);
    h.network.serve("/", FakeNetwork::page("home"));

    h.context.install().await;

    assert_eq!(h.context.state(), LifecycleState::Controlling);
    assert!(h.slot.is_ready());
    assert!(h.store.match_request("/").unwrap().is_some());
    assert!(h.store.match_request("/missing").unwrap().is_none());
  }

  #[tokio::test]
  async fn intercepted_requests_are_served_from_the_warm_cache() {
    let mut h = harness(&["/"]);
    h.network.serve("/", FakeNetwork::page("home"));

    h.context.install().await;
    let response = h.context.interceptor().handle("/").await;

    assert_eq!(response.body, b"home");
    // One fetch for warm-up; the intercepted request never hits the network
    assert_eq!(h.network.fetch_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn past_timestamp_fires_immediately() {
    let h = harness(&[]);

    h.context
      .handle_command(Command::ScheduleNotification {
        id: "t1".to_string(),
        title: "Tea".to_string(),
        body: "Tea is ready".to_string(),
        timestamp: now_millis() - 1_000,
      })
      .await;

    assert_eq!(h.surface.shown.lock().unwrap().as_slice(), ["t1"]);
    assert_eq!(h.context.armed.len(), 0);
  }

  #[tokio::test]
  async fn future_timestamp_arms_a_timer_that_fires_on_expiry() {
    let h = harness(&[]);

    h.context
      .handle_command(Command::ScheduleNotification {
        id: "t1".to_string(),
        title: "Tea".to_string(),
        body: String::new(),
        timestamp: now_millis() + 80,
      })
      .await;

    assert!(h.surface.shown.lock().unwrap().is_empty());
    assert_eq!(h.context.armed.len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.surface.shown.lock().unwrap().as_slice(), ["t1"]);
    assert_eq!(h.context.armed.len(), 0);
  }

  #[tokio::test]
  async fn cancel_disarms_the_timer_and_closes_the_notification() {
    let h = harness(&[]);

    h.context
      .handle_command(Command::ScheduleNotification {
        id: "t1".to_string(),
        title: "Tea".to_string(),
        body: String::new(),
        timestamp: now_millis() + 200,
      })
      .await;
    h.context
      .handle_command(Command::CancelNotification {
        id: "t1".to_string(),
      })
      .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(h.surface.shown.lock().unwrap().is_empty());
    assert_eq!(h.surface.closed.lock().unwrap().as_slice(), ["t1"]);
  }

  #[tokio::test]
  async fn rearming_the_same_tag_replaces_the_previous_timer() {
    let h = harness(&[]);

    h.context
      .handle_command(Command::ScheduleNotification {
        id: "t1".to_string(),
        title: "Tea".to_string(),
        body: String::new(),
        timestamp: now_millis() + 5_000,
      })
      .await;
    h.context
      .handle_command(Command::ScheduleNotification {
        id: "t1".to_string(),
        title: "Tea".to_string(),
        body: String::new(),
        timestamp: now_millis() + 60,
      })
      .await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    // Only the replacement fired
    assert_eq!(h.surface.shown.lock().unwrap().as_slice(), ["t1"]);
  }

  #[tokio::test]
  async fn update_cache_refetches_and_broadcasts_to_all_pages() {
    let h = harness(&["/", "/app.js"]);
    h.network.serve("/", FakeNetwork::page("home"));
    h.network.serve("/app.js", FakeNetwork::page("app"));
    let mut first = h.pages.register();
    let mut second = h.pages.register();

    h.context.handle_command(Command::UpdateCache).await;

    assert_eq!(h.network.reload_calls.load(Ordering::SeqCst), 2);
    assert!(h.store.match_request("/app.js").unwrap().is_some());
    for page in [&mut first, &mut second] {
      match page.try_recv().unwrap() {
        Broadcast::CacheUpdated { timestamp } => assert!(timestamp > 0),
      }
    }
  }

  #[tokio::test]
  async fn run_serves_commands_after_claiming_pages() {
    let h = harness(&[]);
    let (tx, rx) = mpsc::unbounded_channel();
    drop(h.mailbox);

    let worker = tokio::spawn(h.context.run(rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.slot.is_ready());

    tx.send(Command::ScheduleNotification {
      id: "t1".to_string(),
      title: "Tea".to_string(),
      body: String::new(),
      timestamp: 0,
    })
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.surface.shown.lock().unwrap().as_slice(), ["t1"]);
    worker.abort();
  }
}
