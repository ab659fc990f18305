// SPDX-License-Identifier: MPL-2.0

/// SQL schema for the durable mirror tier
pub const SCHEMA: &str = r#"
-- Database version for migrations
PRAGMA user_version = 1;

-- kv: JSON-encoded collections keyed by string
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kv_updated_at ON kv(updated_at);
"#;
