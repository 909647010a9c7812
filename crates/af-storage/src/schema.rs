//! SQLite schema for the Storage Port: one table per collaborator
//! (tenants/users/roles, the audit chain and its tail, envelopes, token
//! revocation, and rate-limit counters).

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    tier TEXT NOT NULL,
    settings TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    email TEXT NOT NULL,
    secret_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(tenant_id, email)
);

CREATE TABLE IF NOT EXISTS roles (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    permissions TEXT NOT NULL,
    UNIQUE(tenant_id, name)
);

CREATE TABLE IF NOT EXISTS role_bindings (
    tenant_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    role_id TEXT NOT NULL,
    PRIMARY KEY (tenant_id, user_id, role_id)
);

CREATE TABLE IF NOT EXISTS audit_records (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    actor_type TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    action TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id TEXT,
    details TEXT NOT NULL,
    ts TEXT NOT NULL,
    seq INTEGER NOT NULL,
    prev_hash BLOB,
    hash BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_tenant_ts_seq ON audit_records (tenant_id, ts, seq);

CREATE TABLE IF NOT EXISTS audit_tail (
    tenant_id TEXT PRIMARY KEY,
    hash BLOB NOT NULL,
    seq INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS envelopes (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    trace_id TEXT NOT NULL,
    span_id TEXT NOT NULL,
    from_agent TEXT NOT NULL,
    to_agent TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload BLOB NOT NULL,
    metadata TEXT NOT NULL,
    cost TEXT NOT NULL,
    ts TEXT NOT NULL,
    envelope_hash BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS revoked_tokens (
    jti TEXT PRIMARY KEY,
    revoked_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_counters (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    expires_at TEXT NOT NULL
);
"#;
