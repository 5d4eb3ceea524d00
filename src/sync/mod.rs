//! Sync engine: replays the offline queue against the remote API.
//!
//! - Strictly sequential, oldest-first drain so causally dependent mutations
//!   land in order
//! - Items leave the queue only on server acknowledgment
//! - Retry behavior is an injectable policy; the default retries forever
//! - A connectivity monitor triggers passes on offline→online transitions

mod engine;
mod monitor;

pub use engine::{RetryPolicy, SyncConfig, SyncEngine, SyncEvent, SyncReport};
pub use monitor::{ConnectivityMonitor, MonitorCommand, MonitorConfig, MonitorHandle};
