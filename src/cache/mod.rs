//! Network cache: keeps the app minimally functional offline.
//!
//! This module plays the role a service worker plays in a browser:
//! - Classifies every same-origin request into a caching strategy
//! - Serves documents network-first and images cache-first with background
//!   refresh
//! - Seeds a fixed route set plus an offline fallback page at install time
//! - Prunes stale cache generations at activation and signals the host
//!   through a typed skip-waiting channel

mod gateway;
mod policy;
mod storage;
mod update;

pub use gateway::{FetchGateway, FetchRequest, GatewayResponse, ResponseSource, PRECACHE_ROUTES};
pub use policy::{classify, current_caches, Strategy, CACHE_VERSION, IMAGE_CACHE, STATIC_CACHE};
pub use storage::{CachedResponse, ResponseStore};
pub use update::{update_channel, ControlMessage, GatewayEvent, GatewaySignal, HostHandle};
