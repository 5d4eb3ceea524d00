mod api;
mod cache;
mod chat;
mod config;
mod db;
mod interpreter;
mod queue;
mod snapshot;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use interpreter::OfflineReply;

#[derive(Parser, Debug)]
#[command(name = "bolso")]
#[command(about = "Offline queue and sync core for the Bolso finance app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/bolso/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show queue depth, dead-letter count and last sync time
  Status,
  /// Run one drain pass against the API
  Sync,
  /// Watch connectivity and sync automatically until interrupted
  Watch,
  /// Pull live account state into the local snapshot
  Refresh,
  /// Queue a chat message durably, then try to deliver it
  Send {
    /// Message text, e.g. "gastei 50 no mercado"
    text: Vec<String>,
  },
  /// Interpret an offline command against the cached snapshot
  Parse {
    /// Command text, e.g. "gastei 45,90 no uber"
    text: Vec<String>,
  },
  /// Seed the response cache with the precache routes and activate it
  Install,
  /// Serve a URL through the offline cache policy
  Fetch {
    url: String,
    /// Accept header to send, e.g. "text/html"
    #[arg(long)]
    accept: Option<String>,
  },
  /// Remove every queued item (explicit reset)
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;

  let config = config::Config::load(args.config.as_deref())?;

  let db = db::Database::open()?;
  let queue = queue::OfflineQueue::new(db.clone());
  let chat = chat::ChatStore::new(db.clone());
  let snapshot = snapshot::SnapshotStore::new(db.clone());

  match args.command {
    Command::Status => {
      println!("pending:     {}", queue.pending_count()?);
      println!("dead-letter: {}", queue.dead_count()?);

      let undelivered = chat
        .list()?
        .iter()
        .filter(|m| m.status == chat::STATUS_PENDING)
        .count();
      println!("chat queued: {}", undelivered);

      match snapshot.last_sync()? {
        Some(at) => println!("last sync:   {}", at.to_rfc3339()),
        None => println!("last sync:   never"),
      }

      if let Some(summary) = snapshot.summary()? {
        println!(
          "snapshot:    receitas R$ {:.2}, despesas R$ {:.2}",
          summary.income, summary.expenses
        );
      }
      if let Some(categories) = snapshot.categories()? {
        println!("categories:  {} cached", categories.len());
      }

      for item in queue.list_dead()? {
        println!(
          "  dead: #{} {} {} ({} attempts)",
          item.id, item.method, item.url, item.attempts
        );
      }
    }
    Command::Sync => {
      let engine = sync::SyncEngine::new(
        config.sync_config()?,
        config.retry_policy(),
        queue,
        chat,
        snapshot,
      )?;

      let report = engine.sync().await?;
      println!(
        "synced {} of {} item(s), {} failed",
        report.synced, report.processed, report.failed
      );
      if report.dead_lettered > 0 {
        println!("{} item(s) moved to the dead-letter list", report.dead_lettered);
      }
    }
    Command::Watch => {
      let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
      let engine = sync::SyncEngine::new(
        config.sync_config()?,
        config.retry_policy(),
        queue,
        chat,
        snapshot,
      )?
      .with_events(event_tx);

      tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
          match event {
            sync::SyncEvent::WentOnline => println!("online"),
            sync::SyncEvent::WentOffline => println!("offline, queueing locally"),
            sync::SyncEvent::Started { pending } => println!("syncing {} item(s)", pending),
            sync::SyncEvent::ItemSynced { id } => println!("  ok #{}", id),
            sync::SyncEvent::ItemFailed { id, error } => println!("  failed #{}: {}", id, error),
            sync::SyncEvent::Completed(report) => {
              println!("done: {} synced, {} failed", report.synced, report.failed)
            }
          }
        }
      });

      let (monitor, handle) = sync::ConnectivityMonitor::new(engine, config.monitor_config()?)?;
      let task = tokio::spawn(monitor.run());

      tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to wait for ctrl-c: {}", e))?;

      handle.shutdown().await?;
      task
        .await
        .map_err(|e| eyre!("Monitor task panicked: {}", e))??;
    }
    Command::Refresh => {
      let client = api::ApiClient::new(config.api_base()?, config::Config::api_token())?;
      client.refresh_snapshot(&snapshot).await?;
      println!("snapshot refreshed");
    }
    Command::Send { text } => {
      let content = text.join(" ");
      let offline_id = format!("chat-{}", chrono::Utc::now().timestamp_millis());

      // Durable first; delivery is the sync engine's problem
      chat.append(&offline_id, &content)?;
      queue.enqueue(queue::QueuedRequest {
        url: "/api/chat".to_string(),
        method: None,
        body: serde_json::json!({ "content": content, "offlineId": offline_id }),
        item_type: "CHAT".to_string(),
        headers: None,
      })?;

      let engine = sync::SyncEngine::new(
        config.sync_config()?,
        config.retry_policy(),
        queue,
        chat,
        snapshot,
      )?;

      let report = engine.sync().await?;
      if report.failed == 0 && report.synced > 0 {
        println!("delivered");
      } else {
        println!("queued for next sync");
      }
    }
    Command::Parse { text } => {
      let input = text.join(" ");
      match interpreter::interpret(&input, &snapshot)? {
        Some(reply) => println!("{}", format_reply(&reply)),
        None => println!("Não entendi. Este comando não está disponível offline."),
      }
    }
    Command::Install => {
      let store = cache::ResponseStore::new(db.clone());
      let (mut host, signal) = cache::update_channel();
      let mut gateway = cache::FetchGateway::new(store.clone(), config.gateway_origin()?)?
        .with_update_signal(signal);

      let seeded = gateway.install().await?;
      println!("precached {} route(s)", seeded);

      if let Some(cache::GatewayEvent::UpdateAvailable { version }) = host.next_event().await {
        println!("cache version {} installed and waiting", version);
      }

      // A fresh install takes control right away
      host.skip_waiting();
      gateway.run_update_cycle().await?;

      if let Some(cache::GatewayEvent::ControllerChanged { version }) = host.next_event().await {
        println!("cache version {} now controls fetches", version);
      }

      println!("live caches: {}", store.cache_names()?.join(", "));
    }
    Command::Fetch { url, accept } => {
      let store = cache::ResponseStore::new(db.clone());
      let gateway = cache::FetchGateway::new(store, config.gateway_origin()?)?;

      let mut request = cache::FetchRequest::get(&url);
      if let Some(accept) = &accept {
        request = request.with_accept(accept);
      }

      let response = gateway.handle(&request).await?;
      println!(
        "{} via {:?} ({}, {} bytes)",
        response.status,
        response.source,
        response.content_type.as_deref().unwrap_or("unknown"),
        response.body.len()
      );
    }
    Command::Clear => {
      queue.clear()?;
      println!("queue cleared");
    }
  }

  Ok(())
}

/// File logging under the data dir plus whatever RUST_LOG asks for.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .map(|d| d.join("bolso").join("logs"))
    .unwrap_or_else(|| PathBuf::from("."));
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "bolso.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn format_reply(reply: &OfflineReply) -> String {
  match reply {
    OfflineReply::Balance { total, accounts } => {
      let mut out = format!("Saldo total: R$ {:.2}", total);
      for account in accounts {
        out.push_str(&format!("\n  {}: R$ {:.2}", account.name, account.balance));
      }
      out
    }
    OfflineReply::Cards {
      total_limit,
      total_used,
      total_available,
      cards,
    } => {
      let mut out = format!(
        "Limite total: R$ {:.2}\nUsado: R$ {:.2}\nDisponível: R$ {:.2}",
        total_limit, total_used, total_available
      );
      for card in cards {
        out.push_str(&format!(
          "\n  {}: R$ {:.2} de R$ {:.2}",
          card.name, card.used, card.limit
        ));
      }
      out
    }
    OfflineReply::Subscriptions {
      monthly_total,
      subscriptions,
    } => {
      let mut out = format!("Assinaturas: R$ {:.2}/mês", monthly_total);
      for sub in subscriptions {
        out.push_str(&format!("\n  {}: R$ {:.2}", sub.name, sub.amount));
      }
      out
    }
    OfflineReply::Transaction(tx) => {
      let kind = match tx.kind {
        interpreter::TransactionKind::Expense => "Gasto",
        interpreter::TransactionKind::Income => "Receita",
      };
      format!(
        "{} de R$ {:.2}: {} ({})",
        kind, tx.amount, tx.description, tx.category
      )
    }
    OfflineReply::NoCachedData { message } => message.clone(),
  }
}
