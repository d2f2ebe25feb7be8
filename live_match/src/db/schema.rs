//! PostgreSQL schema for the live-matching tables.
//!
//! The `users` table belongs to the main platform and is only read.

/// Idempotent DDL applied by `Database::ensure_schema`
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS live_profiles (
    user_id BIGINT PRIMARY KEY,
    description TEXT,
    photo_key TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS live_preferences (
    user_id BIGINT PRIMARY KEY,
    seeking_gender TEXT NOT NULL,
    min_age INTEGER NOT NULL CHECK (min_age >= 18),
    max_age INTEGER NOT NULL CHECK (max_age >= min_age),
    max_distance_km DOUBLE PRECISION NOT NULL CHECK (max_distance_km > 0),
    orientation TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS live_sessions (
    id UUID PRIMARY KEY,
    user_id BIGINT NOT NULL,
    started_at TIMESTAMP NOT NULL,
    expires_at TIMESTAMP NOT NULL,
    ended_at TIMESTAMP,
    true_latitude DOUBLE PRECISION NOT NULL,
    true_longitude DOUBLE PRECISION NOT NULL,
    fuzzed_latitude DOUBLE PRECISION NOT NULL,
    fuzzed_longitude DOUBLE PRECISION NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS live_sessions_one_active_per_user
    ON live_sessions (user_id) WHERE ended_at IS NULL;

CREATE INDEX IF NOT EXISTS live_sessions_active_expiry
    ON live_sessions (expires_at) WHERE ended_at IS NULL;

CREATE TABLE IF NOT EXISTS live_matches (
    id UUID PRIMARY KEY,
    session_a UUID NOT NULL REFERENCES live_sessions (id),
    user_a BIGINT NOT NULL,
    session_b UUID NOT NULL REFERENCES live_sessions (id),
    user_b BIGINT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    expires_at TIMESTAMP NOT NULL,
    declined_by BIGINT,
    declined_at TIMESTAMP,
    auto_declined BOOLEAN NOT NULL DEFAULT FALSE,
    accepted_by BIGINT,
    accepted_at TIMESTAMP,
    CHECK (user_a <> user_b)
);

CREATE INDEX IF NOT EXISTS live_matches_user_a ON live_matches (user_a) WHERE declined_by IS NULL;
CREATE INDEX IF NOT EXISTS live_matches_user_b ON live_matches (user_b) WHERE declined_by IS NULL;

CREATE TABLE IF NOT EXISTS live_declines (
    decliner_id BIGINT NOT NULL,
    declined_id BIGINT NOT NULL,
    counter INTEGER NOT NULL CHECK (counter BETWEEN 1 AND 3),
    first_declined_at TIMESTAMP NOT NULL,
    last_session_id UUID NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    PRIMARY KEY (decliner_id, declined_id)
);

CREATE INDEX IF NOT EXISTS live_declines_declined ON live_declines (declined_id);

CREATE TABLE IF NOT EXISTS live_device_fingerprints (
    session_id UUID PRIMARY KEY,
    user_id BIGINT NOT NULL,
    device_id TEXT NOT NULL,
    device_model TEXT,
    platform TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);
"#;
