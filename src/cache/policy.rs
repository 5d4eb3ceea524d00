//! Request classification and versioned cache names.
//!
//! Every same-origin request gets exactly one strategy. API calls are never
//! intercepted so the queue and sync engine keep full control over their
//! failure semantics; image lookups are cheap and tolerate staleness;
//! everything else prefers the network.

/// Bumped together whenever the cached payload format changes. Activation
/// prunes every cache name that does not carry the current version.
pub const CACHE_VERSION: u32 = 3;

/// Cache name for pages and static assets.
pub const STATIC_CACHE: &str = "bolso-static-v3";

/// Cache name for image resources.
pub const IMAGE_CACHE: &str = "bolso-images-v3";

/// The cache names the current version considers live.
pub fn current_caches() -> [&'static str; 2] {
  [STATIC_CACHE, IMAGE_CACHE]
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "avif"];

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Not intercepted; the request fails or succeeds naturally
  Bypass,
  /// Serve cached bytes immediately, refresh in the background
  ImageCacheFirst,
  /// Try the network, fall back to cache, then to the offline page
  NetworkFirst,
}

/// Pick the strategy for a request.
pub fn classify(method: &str, url: &str) -> Strategy {
  if !method.eq_ignore_ascii_case("GET") {
    return Strategy::Bypass;
  }

  let path = path_of(url);

  if path.contains("/api/") {
    return Strategy::Bypass;
  }

  if let Some(ext) = extension_of(&path) {
    if IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
      return Strategy::ImageCacheFirst;
    }
  }

  Strategy::NetworkFirst
}

/// Path component of a URL; relative URLs are treated as bare paths.
fn path_of(url: &str) -> String {
  match url::Url::parse(url) {
    Ok(parsed) => parsed.path().to_string(),
    Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
  }
}

/// Extension of the final path segment, if any.
fn extension_of(path: &str) -> Option<&str> {
  let segment = path.rsplit('/').next()?;
  let (stem, ext) = segment.rsplit_once('.')?;
  if stem.is_empty() {
    return None;
  }
  Some(ext)
}
