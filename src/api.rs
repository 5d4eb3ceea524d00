//! Thin client for the Bolso REST API.
//!
//! Only covers what the offline core needs: pulling fresh account state to
//! overwrite the local snapshot. Mutations never go through here; they are
//! queued and replayed by the sync engine.

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use url::Url;

use crate::snapshot::{Account, Card, Category, DashboardSummary, SnapshotStore, Subscription};

#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(base: Url, token: Option<String>) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { http, base, token })
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let url = self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid API path '{}': {}", path, e))?;

    let mut request = self.http.get(url.clone());
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    if !response.status().is_success() {
      return Err(eyre!("Server rejected {}: HTTP {}", url, response.status()));
    }

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }

  pub async fn accounts(&self) -> Result<Vec<Account>> {
    self.get_json("/api/accounts").await
  }

  pub async fn cards(&self) -> Result<Vec<Card>> {
    self.get_json("/api/cards").await
  }

  pub async fn subscriptions(&self) -> Result<Vec<Subscription>> {
    self.get_json("/api/subscriptions").await
  }

  pub async fn categories(&self) -> Result<Vec<Category>> {
    self.get_json("/api/categories").await
  }

  pub async fn summary(&self) -> Result<DashboardSummary> {
    self.get_json("/api/summary").await
  }

  /// Overwrite the local snapshot with live server state, wholesale.
  pub async fn refresh_snapshot(&self, snapshot: &SnapshotStore) -> Result<()> {
    snapshot.put_accounts(&self.accounts().await?)?;
    snapshot.put_cards(&self.cards().await?)?;
    snapshot.put_subscriptions(&self.subscriptions().await?)?;
    snapshot.put_categories(&self.categories().await?)?;
    snapshot.put_summary(&self.summary().await?)?;
    Ok(())
  }
}
