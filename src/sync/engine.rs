//! Queue drain engine.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::chat::ChatStore;
use crate::queue::{OfflineQueue, QueueItem};
use crate::snapshot::SnapshotStore;

/// Queue item type whose acknowledgment also flips a chat message.
const TYPE_CHAT: &str = "CHAT";

/// Explicit configuration for the engine; nothing is read from ambient
/// globals.
#[derive(Debug, Clone)]
pub struct SyncConfig {
  /// Base every relative queue-item URL resolves against
  pub api_base: Url,
  /// Bearer token attached when present
  pub token: Option<String>,
  /// Upper bound on each item's network call
  pub request_timeout: Duration,
}

/// How failing items are treated across passes.
///
/// `None` reproduces the historical retry-forever behavior. `Some(n)` moves
/// an item to the dead-letter state after n failed attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
  pub max_attempts: Option<u32>,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub processed: usize,
  pub synced: usize,
  pub failed: usize,
  pub dead_lettered: usize,
}

/// Progress events for hosts that want to show a sync indicator.
#[derive(Debug, Clone)]
pub enum SyncEvent {
  Started { pending: usize },
  ItemSynced { id: i64 },
  ItemFailed { id: i64, error: String },
  Completed(SyncReport),
  WentOnline,
  WentOffline,
}

/// Drains the offline queue against the remote API, one item at a time.
#[derive(Clone)]
pub struct SyncEngine {
  config: SyncConfig,
  policy: RetryPolicy,
  http: reqwest::Client,
  queue: OfflineQueue,
  chat: ChatStore,
  snapshot: SnapshotStore,
  /// One pass in flight at a time; re-entrant calls are ignored
  syncing: Arc<AtomicBool>,
  events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl SyncEngine {
  pub fn new(
    config: SyncConfig,
    policy: RetryPolicy,
    queue: OfflineQueue,
    chat: ChatStore,
    snapshot: SnapshotStore,
  ) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.request_timeout)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      config,
      policy,
      http,
      queue,
      chat,
      snapshot,
      syncing: Arc::new(AtomicBool::new(false)),
      events: None,
    })
  }

  /// Attach a progress-event channel.
  pub fn with_events(mut self, events: mpsc::UnboundedSender<SyncEvent>) -> Self {
    self.events = Some(events);
    self
  }

  pub(crate) fn emit(&self, event: SyncEvent) {
    if let Some(tx) = &self.events {
      let _ = tx.send(event);
    }
  }

  /// Run one drain pass. A call while another pass is in flight is a no-op
  /// that reports an empty pass.
  pub async fn sync(&self) -> Result<SyncReport> {
    if self.syncing.swap(true, Ordering::SeqCst) {
      debug!("sync already in progress, ignoring trigger");
      return Ok(SyncReport::default());
    }

    let result = self.drain().await;
    self.syncing.store(false, Ordering::SeqCst);
    result
  }

  /// Drain the queue snapshot taken at pass start. Items enqueued mid-pass
  /// wait for the next pass.
  async fn drain(&self) -> Result<SyncReport> {
    let items = self.queue.list_pending()?;
    let mut report = SyncReport::default();

    if items.is_empty() {
      return Ok(report);
    }

    info!(pending = items.len(), "sync pass started");
    self.emit(SyncEvent::Started {
      pending: items.len(),
    });

    for item in items {
      let id = item.id;
      let offline_id = offline_id_of(&item);

      match self.replay(&item, &offline_id).await {
        Ok(()) => {
          self.queue.dequeue(id)?;
          report.synced += 1;

          if item.item_type == TYPE_CHAT && !self.chat.mark_delivered(&offline_id)? {
            debug!(id, offline_id = %offline_id, "no chat message matches synced item");
          }

          self.emit(SyncEvent::ItemSynced { id });
        }
        Err(e) => {
          warn!(id, error = %e, "replay failed, item stays queued");
          report.failed += 1;

          let attempts = self.queue.record_failure(id)?;
          if let Some(max) = self.policy.max_attempts {
            if attempts >= i64::from(max) {
              warn!(id, attempts, "retry budget exhausted, dead-lettering item");
              self.queue.mark_dead(id)?;
              report.dead_lettered += 1;
            }
          }

          self.emit(SyncEvent::ItemFailed {
            id,
            error: e.to_string(),
          });
        }
      }

      report.processed += 1;
    }

    if report.processed > 0 {
      self.snapshot.set_last_sync(Utc::now())?;
    }

    info!(
      synced = report.synced,
      failed = report.failed,
      "sync pass finished"
    );
    self.emit(SyncEvent::Completed(report.clone()));

    Ok(report)
  }

  /// Replay one item. Ok means the server acknowledged it.
  async fn replay(&self, item: &QueueItem, offline_id: &str) -> Result<()> {
    let url = self.resolve(&item.url)?;

    let method = reqwest::Method::from_bytes(item.method.as_bytes())
      .map_err(|e| eyre!("Invalid HTTP method '{}': {}", item.method, e))?;

    let mut body = item.body.clone();
    if let serde_json::Value::Object(map) = &mut body {
      map.insert(
        "offlineId".to_string(),
        serde_json::Value::String(offline_id.to_string()),
      );
    }

    let mut request = self.http.request(method, url.clone()).json(&body);

    if let Some(token) = &self.config.token {
      request = request.bearer_auth(token);
    }

    if let Some(serde_json::Value::Object(headers)) = &item.headers {
      for (name, value) in headers {
        if let Some(value) = value.as_str() {
          request = request.header(name.as_str(), value);
        }
      }
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    if !response.status().is_success() {
      return Err(eyre!("Server rejected {}: HTTP {}", url, response.status()));
    }

    Ok(())
  }

  /// Absolute URLs pass through; relative ones resolve against the API base.
  fn resolve(&self, url: &str) -> Result<Url> {
    match Url::parse(url) {
      Ok(parsed) => Ok(parsed),
      Err(_) => self
        .config
        .api_base
        .join(url)
        .map_err(|e| eyre!("Failed to resolve URL '{}': {}", url, e)),
    }
  }
}

/// The dedup id sent to the server: the body's own offlineId when present,
/// the item's queue id otherwise.
fn offline_id_of(item: &QueueItem) -> String {
  item
    .body
    .get("offlineId")
    .and_then(|v| v.as_str())
    .map(String::from)
    .unwrap_or_else(|| item.id.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::queue::QueuedRequest;
  use serde_json::json;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  struct Fixture {
    engine: SyncEngine,
    queue: OfflineQueue,
    chat: ChatStore,
    snapshot: SnapshotStore,
    _dir: tempfile::TempDir,
  }

  fn fixture(api_base: &str, policy: RetryPolicy, token: Option<&str>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("test.db")).unwrap();
    let queue = OfflineQueue::new(db.clone());
    let chat = ChatStore::new(db.clone());
    let snapshot = SnapshotStore::new(db);

    let config = SyncConfig {
      api_base: Url::parse(api_base).unwrap(),
      token: token.map(String::from),
      request_timeout: Duration::from_secs(5),
    };

    let engine = SyncEngine::new(
      config,
      policy,
      queue.clone(),
      chat.clone(),
      snapshot.clone(),
    )
    .unwrap();

    Fixture {
      engine,
      queue,
      chat,
      snapshot,
      _dir: dir,
    }
  }

  fn request(url: &str, body: serde_json::Value) -> QueuedRequest {
    QueuedRequest {
      url: url.to_string(),
      method: None,
      body,
      item_type: "TRANSACTION".to_string(),
      headers: None,
    }
  }

  #[tokio::test]
  async fn test_success_removes_item_and_records_last_sync() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/tx"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), None);
    fx.queue
      .enqueue(request("/api/tx", json!({"amount": 50})))
      .unwrap();

    let report = fx.engine.sync().await.unwrap();

    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 0);
    assert!(fx.queue.list_pending().unwrap().is_empty());
    assert!(fx.snapshot.last_sync().unwrap().is_some());
  }

  #[tokio::test]
  async fn test_failure_retains_item_and_pass_continues() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/broken"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/ok"))
      .respond_with(ResponseTemplate::new(201))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), None);
    let broken = fx
      .queue
      .enqueue(request("/api/broken", json!({"n": 1})))
      .unwrap();
    fx.queue.enqueue(request("/api/ok", json!({"n": 2}))).unwrap();

    let report = fx.engine.sync().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 1);

    let pending = fx.queue.list_pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, broken.id);
    assert_eq!(pending[0].attempts, 1);
  }

  #[tokio::test]
  async fn test_items_replay_in_enqueue_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), None);
    fx.queue.enqueue(request("/api/a", json!({}))).unwrap();
    fx.queue.enqueue(request("/api/b", json!({}))).unwrap();
    fx.queue.enqueue(request("/api/c", json!({}))).unwrap();

    fx.engine.sync().await.unwrap();

    let received = server.received_requests().await.unwrap();
    let paths: Vec<String> = received.iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(paths, vec!["/api/a", "/api/b", "/api/c"]);
  }

  #[tokio::test]
  async fn test_offline_id_falls_back_to_item_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), None);
    let no_id = fx
      .queue
      .enqueue(request("/api/tx", json!({"amount": 1})))
      .unwrap();
    fx.queue
      .enqueue(request("/api/tx", json!({"amount": 2, "offlineId": "client-7"})))
      .unwrap();

    fx.engine.sync().await.unwrap();

    let received = server.received_requests().await.unwrap();
    let bodies: Vec<serde_json::Value> = received
      .iter()
      .map(|r| serde_json::from_slice(&r.body).unwrap())
      .collect();

    assert_eq!(bodies[0]["offlineId"], json!(no_id.id.to_string()));
    assert_eq!(bodies[1]["offlineId"], json!("client-7"));
  }

  #[tokio::test]
  async fn test_bearer_token_and_extra_headers_are_attached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), Some("tok-123"));
    let mut req = request("/api/tx", json!({}));
    req.headers = Some(json!({"X-Device": "pixel"}));
    fx.queue.enqueue(req).unwrap();

    fx.engine.sync().await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(
      received[0].headers.get("authorization").unwrap(),
      "Bearer tok-123"
    );
    assert_eq!(received[0].headers.get("x-device").unwrap(), "pixel");
  }

  #[tokio::test]
  async fn test_chat_item_flips_message_to_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), None);
    fx.chat.append("msg-42", "gastei 50 no mercado").unwrap();
    fx.queue
      .enqueue(QueuedRequest {
        url: "/api/chat".to_string(),
        method: None,
        body: json!({"content": "gastei 50 no mercado", "offlineId": "msg-42"}),
        item_type: "CHAT".to_string(),
        headers: None,
      })
      .unwrap();

    fx.engine.sync().await.unwrap();

    let messages = fx.chat.list().unwrap();
    assert_eq!(messages[0].status, crate::chat::STATUS_DELIVERED);
  }

  #[tokio::test]
  async fn test_bounded_policy_dead_letters_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let fx = fixture(
      &server.uri(),
      RetryPolicy {
        max_attempts: Some(2),
      },
      None,
    );
    fx.queue.enqueue(request("/api/tx", json!({}))).unwrap();

    let first = fx.engine.sync().await.unwrap();
    assert_eq!(first.dead_lettered, 0);

    let second = fx.engine.sync().await.unwrap();
    assert_eq!(second.dead_lettered, 1);

    assert!(fx.queue.list_pending().unwrap().is_empty());
    assert_eq!(fx.queue.list_dead().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_transport_error_is_treated_like_rejection() {
    // Nothing listens on port 1
    let fx = fixture("http://127.0.0.1:1", RetryPolicy::default(), None);
    fx.queue.enqueue(request("/api/tx", json!({}))).unwrap();

    let report = fx.engine.sync().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(fx.queue.list_pending().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_progress_events_arrive_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), None);
    let item = fx.queue.enqueue(request("/api/tx", json!({}))).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = fx.engine.clone().with_events(tx);
    engine.sync().await.unwrap();

    assert!(matches!(
      rx.recv().await,
      Some(SyncEvent::Started { pending: 1 })
    ));
    assert!(matches!(
      rx.recv().await,
      Some(SyncEvent::ItemSynced { id }) if id == item.id
    ));
    assert!(matches!(
      rx.recv().await,
      Some(SyncEvent::Completed(report)) if report.synced == 1
    ));
  }

  #[tokio::test]
  async fn test_reentrant_sync_is_ignored_while_pass_runs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), None);
    fx.queue.enqueue(request("/api/tx", json!({}))).unwrap();

    // Clones share the in-flight guard
    let engine = fx.engine.clone();
    let first = tokio::spawn(async move { engine.sync().await.unwrap() });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = fx.engine.sync().await.unwrap();
    assert_eq!(second, SyncReport::default());

    let first = first.await.unwrap();
    assert_eq!(first.synced, 1);
  }

  #[tokio::test]
  async fn test_duplicate_submissions_share_one_dedup_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let fx = fixture(&server.uri(), RetryPolicy::default(), None);
    let body = json!({"amount": 50, "offlineId": "tx-dup"});
    fx.queue.enqueue(request("/api/tx", body.clone())).unwrap();
    fx.queue.enqueue(request("/api/tx", body)).unwrap();

    fx.engine.sync().await.unwrap();

    let received = server.received_requests().await.unwrap();
    let ids: std::collections::HashSet<String> = received
      .iter()
      .map(|r| {
        let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
        body["offlineId"].as_str().unwrap().to_string()
      })
      .collect();
    assert_eq!(ids, std::collections::HashSet::from(["tx-dup".to_string()]));
  }

  #[tokio::test]
  async fn test_empty_queue_does_not_record_last_sync() {
    let fx = fixture("http://127.0.0.1:1", RetryPolicy::default(), None);

    let report = fx.engine.sync().await.unwrap();

    assert_eq!(report, SyncReport::default());
    assert!(fx.snapshot.last_sync().unwrap().is_none());
  }
}
