//! PostgreSQL implementation of the live-matching store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::{collections::HashSet, sync::Arc};

use super::{
    errors::{StoreError, StoreResult},
    repository::{
        DeclineKind, DeclineRepository, LiveStore, MatchRepository, ProfileRepository,
        SessionRepository,
    },
    timeouts::{with_query_timeout, with_transaction_timeout},
};
use crate::{
    geo::Coordinate,
    matching::{DeclineRecord, Match, MatchId},
    profile::{EphemeralProfile, Preferences, UserId},
    session::{ClosedSession, DeviceFingerprint, Session, SessionId},
};

const SESSION_COLUMNS: &str = "id, user_id, started_at, expires_at, ended_at, \
     true_latitude, true_longitude, fuzzed_latitude, fuzzed_longitude";

const MATCH_COLUMNS: &str = "id, session_a, user_a, session_b, user_b, created_at, expires_at, \
     declined_by, declined_at, auto_declined, accepted_by, accepted_at";

const DECLINE_COLUMNS: &str =
    "decliner_id, declined_id, counter, first_declined_at, last_session_id, updated_at";

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

fn coordinate(row: &PgRow, lat: &str, lon: &str) -> StoreResult<Coordinate> {
    Coordinate::new(row.get(lat), row.get(lon))
        .map_err(|e| StoreError::corrupt("live_sessions", e.to_string()))
}

fn session_from_row(row: &PgRow) -> StoreResult<Session> {
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        started_at: utc(row.get("started_at")),
        expires_at: utc(row.get("expires_at")),
        ended_at: row
            .get::<Option<NaiveDateTime>, _>("ended_at")
            .map(utc),
        true_location: coordinate(row, "true_latitude", "true_longitude")?,
        fuzzed_location: coordinate(row, "fuzzed_latitude", "fuzzed_longitude")?,
    })
}

fn match_from_row(row: &PgRow) -> Match {
    Match {
        id: row.get("id"),
        session_a: row.get("session_a"),
        user_a: row.get("user_a"),
        session_b: row.get("session_b"),
        user_b: row.get("user_b"),
        created_at: utc(row.get("created_at")),
        expires_at: utc(row.get("expires_at")),
        declined_by: row.get("declined_by"),
        declined_at: row
            .get::<Option<NaiveDateTime>, _>("declined_at")
            .map(utc),
        auto_declined: row.get("auto_declined"),
        accepted_by: row.get("accepted_by"),
        accepted_at: row
            .get::<Option<NaiveDateTime>, _>("accepted_at")
            .map(utc),
    }
}

fn decline_from_row(row: &PgRow) -> DeclineRecord {
    DeclineRecord {
        decliner_id: row.get("decliner_id"),
        declined_id: row.get("declined_id"),
        counter: row.get("counter"),
        first_declined_at: utc(row.get("first_declined_at")),
        last_session_id: row.get("last_session_id"),
        updated_at: utc(row.get("updated_at")),
    }
}

fn profile_from_row(row: &PgRow) -> EphemeralProfile {
    EphemeralProfile {
        user_id: row.get("user_id"),
        description: row.get("description"),
        photo_key: row.get("photo_key"),
        created_at: utc(row.get("created_at")),
        updated_at: utc(row.get("updated_at")),
    }
}

fn preferences_from_row(row: &PgRow) -> StoreResult<Preferences> {
    let parse_err = |e: String| StoreError::corrupt("live_preferences", e);
    Ok(Preferences {
        user_id: row.get("user_id"),
        seeking_gender: row
            .get::<String, _>("seeking_gender")
            .parse()
            .map_err(parse_err)?,
        min_age: row.get("min_age"),
        max_age: row.get("max_age"),
        max_distance_km: row.get("max_distance_km"),
        orientation: row
            .get::<String, _>("orientation")
            .parse()
            .map_err(parse_err)?,
    })
}

/// Take the per-user advisory locks in a fixed order
async fn lock_users(tx: &mut Transaction<'_, Postgres>, users: &[UserId]) -> StoreResult<()> {
    let mut ordered = users.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    for user_id in ordered {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// `LiveStore` backed by PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn close_in_tx(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
        expired_by: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<ClosedSession>> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<UserId> =
            sqlx::query_scalar("SELECT user_id FROM live_sessions WHERE id = $1")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(owner) = owner else {
            return Ok(None);
        };
        lock_users(&mut tx, &[owner]).await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE live_sessions SET ended_at = $2
            WHERE id = $1 AND ended_at IS NULL
              AND ($3::TIMESTAMP IS NULL OR expires_at <= $3)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(now.naive_utc())
        .bind(expired_by.map(|t| t.naive_utc()))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let session = session_from_row(&row)?;

        let invalidated_matches = sqlx::query(&format!(
            r#"
            UPDATE live_matches SET expires_at = $2
            WHERE (session_a = $1 OR session_b = $1)
              AND declined_by IS NULL AND expires_at > $2
            RETURNING {MATCH_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(now.naive_utc())
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(match_from_row)
        .collect();

        tx.commit().await?;

        Ok(Some(ClosedSession {
            session,
            invalidated_matches,
        }))
    }

    async fn insert_match_in_tx(&self, candidate: &Match, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        lock_users(&mut tx, &[candidate.user_a, candidate.user_b]).await?;

        let busy: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM live_matches
            WHERE (user_a IN ($1, $2) OR user_b IN ($1, $2))
              AND declined_by IS NULL AND expires_at > $3
            "#,
        )
        .bind(candidate.user_a)
        .bind(candidate.user_b)
        .bind(now.naive_utc())
        .fetch_one(&mut *tx)
        .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM live_sessions WHERE id IN ($1, $2) AND ended_at IS NULL",
        )
        .bind(candidate.session_a)
        .bind(candidate.session_b)
        .fetch_one(&mut *tx)
        .await?;

        if busy > 0 || active != 2 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO live_matches
                (id, session_a, user_a, session_b, user_b, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(candidate.id)
        .bind(candidate.session_a)
        .bind(candidate.user_a)
        .bind(candidate.session_b)
        .bind(candidate.user_b)
        .bind(candidate.created_at.naive_utc())
        .bind(candidate.expires_at.naive_utc())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn insert_session(&self, session: &Session) -> StoreResult<bool> {
        let inserted: Option<SessionId> = with_query_timeout(
            sqlx::query_scalar(
                r#"
                INSERT INTO live_sessions
                    (id, user_id, started_at, expires_at, true_latitude, true_longitude,
                     fuzzed_latitude, fuzzed_longitude)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (user_id) WHERE ended_at IS NULL DO NOTHING
                RETURNING id
                "#,
            )
            .bind(session.id)
            .bind(session.user_id)
            .bind(session.started_at.naive_utc())
            .bind(session.expires_at.naive_utc())
            .bind(session.true_location.latitude)
            .bind(session.true_location.longitude)
            .bind(session.fuzzed_location.latitude)
            .bind(session.fuzzed_location.longitude)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(inserted.is_some())
    }

    async fn find_session(&self, session_id: SessionId) -> StoreResult<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM live_sessions WHERE id = $1");
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(session_id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn find_active_session(&self, user_id: UserId) -> StoreResult<Option<Session>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM live_sessions WHERE user_id = $1 AND ended_at IS NULL"
        );
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(user_id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn list_active_sessions(&self) -> StoreResult<Vec<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM live_sessions WHERE ended_at IS NULL");
        let rows = with_query_timeout(sqlx::query(&query).fetch_all(self.pool.as_ref())).await?;

        rows.iter().map(session_from_row).collect()
    }

    async fn extend_session(
        &self,
        user_id: UserId,
        extra: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let query = format!(
            r#"
            UPDATE live_sessions
            SET expires_at = GREATEST(expires_at, $3) + ($2::BIGINT * INTERVAL '1 second')
            WHERE user_id = $1 AND ended_at IS NULL
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(user_id)
                .bind(extra.num_seconds())
                .bind(now.naive_utc())
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn close_session(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
        expired_by: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<ClosedSession>> {
        with_transaction_timeout(self.close_in_tx(session_id, now, expired_by)).await
    }

    async fn record_device(&self, fingerprint: &DeviceFingerprint) -> StoreResult<()> {
        with_query_timeout(
            sqlx::query(
                r#"
                INSERT INTO live_device_fingerprints
                    (session_id, user_id, device_id, device_model, platform, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (session_id) DO NOTHING
                "#,
            )
            .bind(fingerprint.session_id)
            .bind(fingerprint.user_id)
            .bind(&fingerprint.device_id)
            .bind(&fingerprint.device_model)
            .bind(&fingerprint.platform)
            .bind(fingerprint.created_at.naive_utc())
            .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for PgStore {
    async fn insert_match_if_free(
        &self,
        candidate: &Match,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        with_transaction_timeout(self.insert_match_in_tx(candidate, now)).await
    }

    async fn find_match(&self, match_id: MatchId) -> StoreResult<Option<Match>> {
        let query = format!("SELECT {MATCH_COLUMNS} FROM live_matches WHERE id = $1");
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(match_id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.as_ref().map(match_from_row))
    }

    async fn find_live_match(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>> {
        let query = format!(
            r#"
            SELECT {MATCH_COLUMNS} FROM live_matches
            WHERE (user_a = $1 OR user_b = $1) AND declined_by IS NULL AND expires_at > $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(user_id)
                .bind(now.naive_utc())
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.as_ref().map(match_from_row))
    }

    async fn users_with_live_match(&self, now: DateTime<Utc>) -> StoreResult<HashSet<UserId>> {
        let rows = with_query_timeout(
            sqlx::query(
                r#"
                SELECT user_a, user_b FROM live_matches
                WHERE declined_by IS NULL AND expires_at > $1
                "#,
            )
            .bind(now.naive_utc())
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        Ok(rows
            .iter()
            .flat_map(|r| [r.get::<i64, _>("user_a"), r.get::<i64, _>("user_b")])
            .collect())
    }

    async fn decline_match(
        &self,
        match_id: MatchId,
        declined_by: UserId,
        kind: DeclineKind,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>> {
        let condition = match kind {
            DeclineKind::Manual => "declined_by IS NULL AND expires_at > $3",
            DeclineKind::Auto => "declined_by IS NULL AND accepted_at IS NULL",
        };
        let query = format!(
            r#"
            UPDATE live_matches
            SET declined_by = $2, declined_at = $3, auto_declined = $4
            WHERE id = $1 AND {condition}
            RETURNING {MATCH_COLUMNS}
            "#
        );
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(match_id)
                .bind(declined_by)
                .bind(now.naive_utc())
                .bind(kind == DeclineKind::Auto)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.as_ref().map(match_from_row))
    }

    async fn accept_match(
        &self,
        match_id: MatchId,
        accepted_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>> {
        let query = format!(
            r#"
            UPDATE live_matches
            SET accepted_by = COALESCE(accepted_by, $2),
                accepted_at = COALESCE(accepted_at, $3)
            WHERE id = $1 AND declined_by IS NULL AND expires_at > $3
            RETURNING {MATCH_COLUMNS}
            "#
        );
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(match_id)
                .bind(accepted_by)
                .bind(now.naive_utc())
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.as_ref().map(match_from_row))
    }

    async fn list_pending_matches(&self) -> StoreResult<Vec<Match>> {
        let query = format!(
            r#"
            SELECT {MATCH_COLUMNS} FROM live_matches m
            WHERE m.declined_by IS NULL AND m.accepted_at IS NULL
              AND EXISTS (SELECT 1 FROM live_sessions s WHERE s.id = m.session_a AND s.ended_at IS NULL)
              AND EXISTS (SELECT 1 FROM live_sessions s WHERE s.id = m.session_b AND s.ended_at IS NULL)
            "#
        );
        let rows = with_query_timeout(sqlx::query(&query).fetch_all(self.pool.as_ref())).await?;

        Ok(rows.iter().map(match_from_row).collect())
    }
}

#[async_trait]
impl DeclineRepository for PgStore {
    async fn record_decline(
        &self,
        decliner_id: UserId,
        declined_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> StoreResult<DeclineRecord> {
        let query = format!(
            r#"
            INSERT INTO live_declines
                (decliner_id, declined_id, counter, first_declined_at, last_session_id, updated_at)
            VALUES ($1, $2, 1, $4, $3, $4)
            ON CONFLICT (decliner_id, declined_id) DO UPDATE SET
                counter = CASE WHEN live_declines.counter >= $5 THEN 1
                               ELSE live_declines.counter + 1 END,
                first_declined_at = CASE WHEN live_declines.counter >= $5
                                         THEN EXCLUDED.first_declined_at
                                         ELSE live_declines.first_declined_at END,
                last_session_id = EXCLUDED.last_session_id,
                updated_at = EXCLUDED.updated_at
            RETURNING {DECLINE_COLUMNS}
            "#
        );
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(decliner_id)
                .bind(declined_id)
                .bind(session_id)
                .bind(now.naive_utc())
                .bind(crate::matching::DECLINE_WRAP_THRESHOLD)
                .fetch_one(self.pool.as_ref()),
        )
        .await?;

        Ok(decline_from_row(&row))
    }

    async fn find_decline(
        &self,
        decliner_id: UserId,
        declined_id: UserId,
    ) -> StoreResult<Option<DeclineRecord>> {
        let query = format!(
            "SELECT {DECLINE_COLUMNS} FROM live_declines WHERE decliner_id = $1 AND declined_id = $2"
        );
        let row = with_query_timeout(
            sqlx::query(&query)
                .bind(decliner_id)
                .bind(declined_id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.as_ref().map(decline_from_row))
    }

    async fn excluded_users(&self, user_id: UserId) -> StoreResult<HashSet<UserId>> {
        let others: Vec<i64> = with_query_timeout(
            sqlx::query_scalar(
                r#"
                SELECT CASE WHEN decliner_id = $1 THEN declined_id ELSE decliner_id END
                FROM live_declines
                WHERE (decliner_id = $1 OR declined_id = $1) AND counter < $2
                "#,
            )
            .bind(user_id)
            .bind(crate::matching::DECLINE_WRAP_THRESHOLD)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        Ok(others.into_iter().collect())
    }
}

#[async_trait]
impl ProfileRepository for PgStore {
    async fn insert_profile(&self, profile: &EphemeralProfile) -> StoreResult<bool> {
        let result = with_query_timeout(
            sqlx::query(
                r#"
                INSERT INTO live_profiles (user_id, description, photo_key, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(profile.user_id)
            .bind(&profile.description)
            .bind(&profile.photo_key)
            .bind(profile.created_at.naive_utc())
            .bind(profile.updated_at.naive_utc())
            .execute(self.pool.as_ref()),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_profile(&self, user_id: UserId) -> StoreResult<Option<EphemeralProfile>> {
        let row = with_query_timeout(
            sqlx::query(
                r#"
                SELECT user_id, description, photo_key, created_at, updated_at
                FROM live_profiles WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.as_ref().map(profile_from_row))
    }

    async fn update_profile(&self, profile: &EphemeralProfile) -> StoreResult<bool> {
        let result = with_query_timeout(
            sqlx::query(
                r#"
                UPDATE live_profiles SET description = $2, photo_key = $3, updated_at = $4
                WHERE user_id = $1
                "#,
            )
            .bind(profile.user_id)
            .bind(&profile.description)
            .bind(&profile.photo_key)
            .bind(profile.updated_at.naive_utc())
            .execute(self.pool.as_ref()),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_preferences(&self, preferences: &Preferences) -> StoreResult<bool> {
        let result = with_query_timeout(
            sqlx::query(
                r#"
                INSERT INTO live_preferences
                    (user_id, seeking_gender, min_age, max_age, max_distance_km, orientation)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(preferences.user_id)
            .bind(preferences.seeking_gender.to_string())
            .bind(preferences.min_age)
            .bind(preferences.max_age)
            .bind(preferences.max_distance_km)
            .bind(preferences.orientation.to_string())
            .execute(self.pool.as_ref()),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_preferences(&self, user_id: UserId) -> StoreResult<Option<Preferences>> {
        let row = with_query_timeout(
            sqlx::query(
                r#"
                SELECT user_id, seeking_gender, min_age, max_age, max_distance_km, orientation
                FROM live_preferences WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        row.as_ref().map(preferences_from_row).transpose()
    }

    async fn update_preferences(&self, preferences: &Preferences) -> StoreResult<bool> {
        let result = with_query_timeout(
            sqlx::query(
                r#"
                UPDATE live_preferences
                SET seeking_gender = $2, min_age = $3, max_age = $4, max_distance_km = $5,
                    orientation = $6, updated_at = NOW()
                WHERE user_id = $1
                "#,
            )
            .bind(preferences.user_id)
            .bind(preferences.seeking_gender.to_string())
            .bind(preferences.min_age)
            .bind(preferences.max_age)
            .bind(preferences.max_distance_km)
            .bind(preferences.orientation.to_string())
            .execute(self.pool.as_ref()),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl LiveStore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        with_query_timeout(sqlx::query("SELECT 1").execute(self.pool.as_ref())).await?;
        Ok(())
    }
}
