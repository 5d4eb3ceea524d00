//! Fetch gateway: applies the caching policy so the app stays usable offline.
//!
//! Stands where a browser service worker would: every same-origin request
//! goes through [`FetchGateway::handle`], which classifies it and serves it
//! per strategy. API requests pass through untouched so the offline queue
//! keeps control of their failure semantics.

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};
use url::Url;

use super::policy::{classify, current_caches, Strategy, CACHE_VERSION, IMAGE_CACHE, STATIC_CACHE};
use super::storage::ResponseStore;
use super::update::GatewaySignal;

/// Top-level routes seeded into the static cache at install time.
pub const PRECACHE_ROUTES: &[&str] = &[
  "/",
  "/dashboard",
  "/cards",
  "/investments",
  "/goals",
  "/settings",
];

/// Where the offline fallback page lives in the static cache.
pub const OFFLINE_PAGE_URL: &str = "/offline.html";

/// Served for HTML navigations that fail both live fetch and cache lookup.
const OFFLINE_PAGE: &str = "<!doctype html>\n<html lang=\"pt-BR\">\n<head><meta charset=\"utf-8\"><title>Bolso — offline</title></head>\n<body>\n<h1>Você está offline</h1>\n<p>Suas ações foram salvas e serão sincronizadas quando a conexão voltar.</p>\n</body>\n</html>\n";

/// 1×1 transparent GIF served when an image misses both cache and network.
const PLACEHOLDER_PIXEL: &[u8] = &[
  0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
  0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
  0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// A request presented to the gateway.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: String,
  pub url: String,
  /// Accept header value, when the caller sends one
  pub accept: Option<String>,
}

impl FetchRequest {
  /// Plain GET with no Accept header.
  pub fn get(url: &str) -> Self {
    Self {
      method: "GET".to_string(),
      url: url.to_string(),
      accept: None,
    }
  }

  pub fn with_accept(mut self, accept: &str) -> Self {
    self.accept = Some(accept.to_string());
    self
  }

  fn accepts_html(&self) -> bool {
    self
      .accept
      .as_deref()
      .map(|a| a.contains("text/html"))
      .unwrap_or(false)
  }
}

/// Where a gateway response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  Network,
  Cache,
  /// Offline page or synthetic 503
  Fallback,
  /// Built-in transparent pixel
  Placeholder,
}

/// What the gateway hands back to the caller.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

/// Policy-driven fetch front end over [`ResponseStore`].
pub struct FetchGateway {
  http: reqwest::Client,
  store: ResponseStore,
  /// Origin used to resolve relative request paths
  origin: Url,
  signal: Option<GatewaySignal>,
}

impl FetchGateway {
  pub fn new(store: ResponseStore, origin: Url) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(10))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      store,
      origin,
      signal: None,
    })
  }

  /// Attach the host-facing update channel.
  pub fn with_update_signal(mut self, signal: GatewaySignal) -> Self {
    self.signal = Some(signal);
    self
  }

  /// Seed the static cache with the fixed route set and the offline page,
  /// then announce the new version to the host. Routes that cannot be
  /// fetched are skipped; the built-in offline page is always stored.
  /// Returns the number of routes cached.
  pub async fn install(&self) -> Result<usize> {
    let mut seeded = 0;

    for route in PRECACHE_ROUTES {
      let url = self.resolve(route)?;
      match self.fetch_live("GET", &url).await {
        Ok((status, content_type, body)) if (200..300).contains(&status) => {
          self
            .store
            .put(STATIC_CACHE, url.as_str(), status, content_type.as_deref(), &body)?;
          seeded += 1;
        }
        Ok((status, _, _)) => {
          warn!(route = *route, status, "precache fetch returned non-success");
        }
        Err(e) => {
          warn!(route = *route, error = %e, "precache fetch failed");
        }
      }
    }

    let offline_url = self.resolve(OFFLINE_PAGE_URL)?;
    self.store.put(
      STATIC_CACHE,
      offline_url.as_str(),
      200,
      Some("text/html"),
      OFFLINE_PAGE.as_bytes(),
    )?;

    if let Some(signal) = &self.signal {
      signal.announce_update(CACHE_VERSION);
    }

    Ok(seeded)
  }

  /// Drop every cache generation that is not current and take control of
  /// fetches. Returns the number of pruned rows.
  pub fn activate(&self) -> Result<usize> {
    let removed = self.store.prune_stale_caches(&current_caches())?;
    debug!(removed, "activated cache version {}", CACHE_VERSION);

    if let Some(signal) = &self.signal {
      signal.announce_controller(CACHE_VERSION);
    }

    Ok(removed)
  }

  /// Block until the host sends skip-waiting, then activate. Returns false
  /// when the host side is gone without asking.
  pub async fn run_update_cycle(&mut self) -> Result<bool> {
    let Some(signal) = &mut self.signal else {
      return Ok(false);
    };

    if !signal.wait_for_skip().await {
      return Ok(false);
    }

    self.activate()?;
    Ok(true)
  }

  /// Serve one request per the policy table.
  pub async fn handle(&self, request: &FetchRequest) -> Result<GatewayResponse> {
    let url = self.resolve(&request.url)?;

    match classify(&request.method, url.as_str()) {
      Strategy::Bypass => self.pass_through(&request.method, &url).await,
      Strategy::NetworkFirst => self.network_first(request, &url).await,
      Strategy::ImageCacheFirst => self.image_cache_first(&url).await,
    }
  }

  /// Not intercepted: errors surface to the caller untouched.
  async fn pass_through(&self, method: &str, url: &Url) -> Result<GatewayResponse> {
    let (status, content_type, body) = self.fetch_live(method, url).await?;
    Ok(GatewayResponse {
      status,
      content_type,
      body,
      source: ResponseSource::Network,
    })
  }

  async fn network_first(&self, request: &FetchRequest, url: &Url) -> Result<GatewayResponse> {
    match self.fetch_live(&request.method, url).await {
      Ok((status, content_type, body)) => {
        if (200..300).contains(&status) {
          self
            .store
            .put(STATIC_CACHE, url.as_str(), status, content_type.as_deref(), &body)?;
        }
        Ok(GatewayResponse {
          status,
          content_type,
          body,
          source: ResponseSource::Network,
        })
      }
      Err(e) => {
        debug!(url = %url, error = %e, "network-first fetch failed, trying cache");

        if let Some(cached) = self.store.get(STATIC_CACHE, url.as_str())? {
          return Ok(GatewayResponse {
            status: cached.status,
            content_type: cached.content_type,
            body: cached.body,
            source: ResponseSource::Cache,
          });
        }

        if request.accepts_html() {
          return Ok(GatewayResponse {
            status: 200,
            content_type: Some("text/html".to_string()),
            body: OFFLINE_PAGE.as_bytes().to_vec(),
            source: ResponseSource::Fallback,
          });
        }

        Ok(GatewayResponse {
          status: 503,
          content_type: Some("text/plain".to_string()),
          body: b"Service Unavailable".to_vec(),
          source: ResponseSource::Fallback,
        })
      }
    }
  }

  async fn image_cache_first(&self, url: &Url) -> Result<GatewayResponse> {
    if let Some(cached) = self.store.get(IMAGE_CACHE, url.as_str())? {
      // Serve immediately, refresh in the background
      let http = self.http.clone();
      let store = self.store.clone();
      let url = url.clone();
      tokio::spawn(async move {
        if let Ok(resp) = http.get(url.clone()).send().await {
          let status = resp.status().as_u16();
          let content_type = header_content_type(&resp);
          if (200..300).contains(&status) {
            if let Ok(body) = resp.bytes().await {
              let _ = store.put(IMAGE_CACHE, url.as_str(), status, content_type.as_deref(), &body);
            }
          }
        }
      });

      return Ok(GatewayResponse {
        status: cached.status,
        content_type: cached.content_type,
        body: cached.body,
        source: ResponseSource::Cache,
      });
    }

    match self.fetch_live("GET", url).await {
      Ok((status, content_type, body)) => {
        if (200..300).contains(&status) {
          self
            .store
            .put(IMAGE_CACHE, url.as_str(), status, content_type.as_deref(), &body)?;
        }
        Ok(GatewayResponse {
          status,
          content_type,
          body,
          source: ResponseSource::Network,
        })
      }
      Err(_) => Ok(GatewayResponse {
        status: 200,
        content_type: Some("image/gif".to_string()),
        body: PLACEHOLDER_PIXEL.to_vec(),
        source: ResponseSource::Placeholder,
      }),
    }
  }

  async fn fetch_live(&self, method: &str, url: &Url) -> Result<(u16, Option<String>, Vec<u8>)> {
    let method = reqwest::Method::from_bytes(method.as_bytes())
      .map_err(|e| eyre!("Invalid HTTP method '{}': {}", method, e))?;

    let resp = self
      .http
      .request(method, url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", url, e))?;

    let status = resp.status().as_u16();
    let content_type = header_content_type(&resp);
    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", url, e))?;

    Ok((status, content_type, body.to_vec()))
  }

  /// Absolute URLs pass through; relative paths resolve against the origin.
  fn resolve(&self, url: &str) -> Result<Url> {
    match Url::parse(url) {
      Ok(parsed) => Ok(parsed),
      Err(_) => self
        .origin
        .join(url)
        .map_err(|e| eyre!("Failed to resolve URL '{}': {}", url, e)),
    }
  }
}

fn header_content_type(resp: &reqwest::Response) -> Option<String> {
  resp
    .headers()
    .get(reqwest::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(String::from)
}
