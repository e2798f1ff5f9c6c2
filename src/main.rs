mod cache;
mod config;
mod fetch;
mod notify;
mod sync;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cache::CacheStore;
use config::Config;
use fetch::HttpFetcher;
use notify::{NotificationScheduler, NotificationSurface, ScheduleOutcome, TracingSurface};
use sync::{RemoteSyncClient, DEFAULT_TTL_MILLIS};
use worker::{BackgroundContext, Broadcast, ChannelSlot, Command, PageRegistry};

#[derive(Parser, Debug)]
#[command(name = "pulsed")]
#[command(about = "Background worker for a countdown app: offline cache, notifications, sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pulsed/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
  /// Run the background worker (the default)
  Run,
  /// Serve one request through the offline-first chain and print the body
  Fetch {
    /// Request path, resolved against the configured origin (e.g. "/")
    path: String,
  },
  /// Schedule a one-off notification through the worker and wait for it
  Notify {
    /// Countdown id; doubles as the notification dedup tag
    #[arg(long)]
    id: String,
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    body: String,
    /// Seconds from now until the notification fires
    #[arg(long, default_value_t = 0)]
    in_seconds: u64,
  },
  /// Push a snapshot (JSON on stdin) to a remote sync slot
  SyncSave {
    #[arg(long)]
    key: String,
    /// Slot password (defaults to $PULSED_SYNC_SECRET)
    #[arg(long)]
    secret: Option<String>,
    /// Expiry in days (default: 30)
    #[arg(long)]
    ttl_days: Option<u64>,
  },
  /// Pull a snapshot from a remote sync slot
  SyncGet {
    #[arg(long)]
    key: String,
    #[arg(long)]
    secret: Option<String>,
    /// Delete the remote record after reading it
    #[arg(long)]
    delete: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  match args.command.unwrap_or(CliCommand::Run) {
    CliCommand::Run => run_worker(config).await,
    CliCommand::Fetch { path } => fetch_once(&config, &path).await,
    CliCommand::Notify {
      id,
      title,
      body,
      in_seconds,
    } => notify_once(config, id, title, body, in_seconds).await,
    CliCommand::SyncSave {
      key,
      secret,
      ttl_days,
    } => sync_save(&config, &key, secret, ttl_days).await,
    CliCommand::SyncGet {
      key,
      secret,
      delete,
    } => sync_get(&config, &key, secret, delete).await,
  }
}

/// Everything a running worker consists of, wired together.
struct Runtime {
  context: BackgroundContext,
  slot: ChannelSlot,
  pages: PageRegistry,
  commands_tx: mpsc::UnboundedSender<Command>,
  commands_rx: mpsc::UnboundedReceiver<Command>,
  surface: Arc<TracingSurface>,
}

fn assemble(config: &Config) -> Result<Runtime> {
  let store = match &config.cache.db_path {
    Some(path) => CacheStore::open(path, &config.cache.version)?,
    None => CacheStore::open_default(&config.cache.version)?,
  };
  let network = Arc::new(HttpFetcher::new(&config.origin)?);
  let surface = Arc::new(TracingSurface);
  let pages = PageRegistry::default();
  let slot = ChannelSlot::default();
  let (commands_tx, commands_rx) = mpsc::unbounded_channel();

  let context = BackgroundContext::new(
    &config.cache,
    Arc::new(store),
    network,
    Arc::clone(&surface) as Arc<dyn NotificationSurface>,
    pages.clone(),
    slot.clone(),
    commands_tx.clone(),
  );

  Ok(Runtime {
    context,
    slot,
    pages,
    commands_tx,
    commands_rx,
    surface,
  })
}

async fn run_worker(config: Config) -> Result<()> {
  let runtime = assemble(&config)?;

  // A local page mirror: log broadcasts the way an open page would see them
  let mut page = runtime.pages.register();
  tokio::spawn(async move {
    while let Some(broadcast) = page.recv().await {
      match broadcast {
        Broadcast::CacheUpdated { timestamp } => info!(timestamp, "cache updated"),
      }
    }
  });

  let worker = tokio::spawn(runtime.context.run(runtime.commands_rx));

  info!("worker running, press Ctrl-C to stop");
  tokio::signal::ctrl_c().await?;
  info!("shutting down");

  // Closing every sender lets the worker drain its mailbox and return.
  runtime.slot.clear();
  drop(runtime.commands_tx);
  worker.await?;

  Ok(())
}

/// One-shot interception: install (warming the cache), serve the path, exit.
/// Useful for checking what the offline fallback chain returns for a path.
async fn fetch_once(config: &Config, path: &str) -> Result<()> {
  let mut runtime = assemble(config)?;
  runtime.context.install().await;

  let response = runtime.context.interceptor().handle(path).await;

  info!(
    status = response.status,
    content_type = response.content_type.as_deref().unwrap_or("-"),
    "serving response"
  );
  std::io::stdout().write_all(&response.body)?;
  Ok(())
}

async fn notify_once(
  config: Config,
  id: String,
  title: String,
  body: String,
  in_seconds: u64,
) -> Result<()> {
  let runtime = assemble(&config)?;
  let worker = tokio::spawn(runtime.context.run(runtime.commands_rx));

  let (scheduler, _events) = NotificationScheduler::new(
    runtime.slot.clone(),
    Arc::new(config.notifications.preference),
    Arc::clone(&runtime.surface) as Arc<dyn NotificationSurface>,
  );

  let target = chrono::Utc::now().timestamp_millis() + (in_seconds * 1000) as i64;
  match scheduler.schedule(&id, &title, &body, target) {
    ScheduleOutcome::Denied => println!("notifications are denied; nothing scheduled"),
    ScheduleOutcome::ConsentRequired => println!(
      "notification permission is undecided; set `notifications.preference: allowed` in the config"
    ),
    outcome @ (ScheduleOutcome::Sent | ScheduleOutcome::Queued) => {
      info!(?outcome, "scheduled, waiting for the timer");
      // Grace covers install time plus the readiness poll interval
      tokio::time::sleep(Duration::from_millis(in_seconds * 1000 + 1_500)).await;
    }
  }

  runtime.slot.clear();
  drop(runtime.commands_tx);
  worker.await?;

  Ok(())
}

fn secret_or_env(secret: Option<String>) -> Result<String> {
  match secret {
    Some(secret) => Ok(secret),
    None => Config::get_sync_secret(),
  }
}

async fn sync_save(
  config: &Config,
  key: &str,
  secret: Option<String>,
  ttl_days: Option<u64>,
) -> Result<()> {
  let secret = secret_or_env(secret)?;
  let ttl_millis = ttl_days
    .map(|days| days * 24 * 60 * 60 * 1000)
    .unwrap_or(DEFAULT_TTL_MILLIS);

  let mut raw = String::new();
  std::io::stdin().read_to_string(&mut raw)?;
  let payload: serde_json::Value =
    serde_json::from_str(&raw).map_err(|e| eyre!("stdin is not valid JSON: {}", e))?;

  let client = RemoteSyncClient::new(&config.sync.endpoint)?;
  client.save(key, &secret, &payload, ttl_millis).await?;

  println!("saved snapshot to slot {key}");
  Ok(())
}

async fn sync_get(config: &Config, key: &str, secret: Option<String>, delete: bool) -> Result<()> {
  let secret = secret_or_env(secret)?;

  let client = RemoteSyncClient::new(&config.sync.endpoint)?;
  let snapshot = client.get(key, &secret, delete).await?;

  println!("{}", serde_json::to_string_pretty(&snapshot)?);
  Ok(())
}
