/// Schema for all durable tables.
pub const SCHEMA: &str = r#"
-- Deferred mutations waiting for connectivity, drained oldest-first
CREATE TABLE IF NOT EXISTS offline_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    method TEXT NOT NULL DEFAULT 'POST',
    body BLOB NOT NULL,
    item_type TEXT NOT NULL,
    headers BLOB,
    timestamp INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_offline_queue_timestamp
    ON offline_queue(timestamp);

CREATE INDEX IF NOT EXISTS idx_offline_queue_type
    ON offline_queue(item_type);

-- Optimistic chat history; rows flip to 'delivered' once their queued
-- request is acknowledged
CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    offline_id TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
);

-- Last-write-wins snapshot blobs, one serialized JSON document per key
CREATE TABLE IF NOT EXISTS snapshot_cache (
    key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached HTTP responses, grouped by versioned cache name
CREATE TABLE IF NOT EXISTS response_cache (
    cache_name TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, url_hash)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_name
    ON response_cache(cache_name);
"#;
