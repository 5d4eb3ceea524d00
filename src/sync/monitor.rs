//! Connectivity monitor: triggers sync passes when the network comes back.

use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use super::engine::{SyncEngine, SyncEvent};

/// Commands a host can send to the monitor loop.
#[derive(Debug)]
pub enum MonitorCommand {
  /// Run a drain pass now, regardless of connectivity state
  SyncNow,
  /// Stop the loop
  Shutdown,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
  /// Probed to detect connectivity; any response counts as online
  pub probe_url: Url,
  pub probe_interval: Duration,
  /// Wait after an offline→online flip before draining, to ride out flapping
  pub settle_delay: Duration,
}

/// Handle to send commands to a running monitor.
#[derive(Clone)]
pub struct MonitorHandle {
  command_tx: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
  pub async fn sync_now(&self) -> Result<()> {
    self
      .command_tx
      .send(MonitorCommand::SyncNow)
      .await
      .map_err(|e| eyre!("Monitor is gone: {}", e))
  }

  pub async fn shutdown(&self) -> Result<()> {
    self
      .command_tx
      .send(MonitorCommand::Shutdown)
      .await
      .map_err(|e| eyre!("Monitor is gone: {}", e))
  }
}

/// Watches connectivity transitions and drives the sync engine.
///
/// Starts in the offline state, so the first successful probe after startup
/// drains whatever the last session left queued.
pub struct ConnectivityMonitor {
  engine: SyncEngine,
  http: reqwest::Client,
  config: MonitorConfig,
  command_rx: mpsc::Receiver<MonitorCommand>,
  online: bool,
}

impl ConnectivityMonitor {
  pub fn new(engine: SyncEngine, config: MonitorConfig) -> Result<(Self, MonitorHandle)> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(5))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    let (command_tx, command_rx) = mpsc::channel(16);

    Ok((
      Self {
        engine,
        http,
        config,
        command_rx,
        online: false,
      },
      MonitorHandle { command_tx },
    ))
  }

  /// Run until shut down. Sync failures are logged, never fatal.
  pub async fn run(mut self) -> Result<()> {
    let mut probe = tokio::time::interval(self.config.probe_interval);

    loop {
      tokio::select! {
        _ = probe.tick() => {
          let now_online = self.probe().await;

          if now_online && !self.online {
            info!("connectivity restored, settling before sync");
            self.engine.emit(SyncEvent::WentOnline);
            tokio::time::sleep(self.config.settle_delay).await;
            self.run_pass().await;
          } else if !now_online && self.online {
            warn!("connectivity lost, queueing mutations locally");
            self.engine.emit(SyncEvent::WentOffline);
          }

          self.online = now_online;
        }
        cmd = self.command_rx.recv() => match cmd {
          Some(MonitorCommand::SyncNow) => self.run_pass().await,
          Some(MonitorCommand::Shutdown) | None => break,
        }
      }
    }

    Ok(())
  }

  async fn run_pass(&self) {
    if let Err(e) = self.engine.sync().await {
      warn!(error = %e, "sync pass failed");
    }
  }

  async fn probe(&self) -> bool {
    self
      .http
      .head(self.config.probe_url.clone())
      .send()
      .await
      .is_ok()
  }
}
