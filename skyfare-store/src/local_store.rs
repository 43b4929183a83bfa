use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::OnceCell;
use tracing::info;

use skyfare_core::models::{Booking, CachedSearchResult, Flight, UserProfile};

use crate::{StoreError, StoreResult};

/// Schema DDL run on first use. One table per collection: primary key,
/// extracted secondary-index columns, and the full record as a JSON body.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS flights (
        id TEXT PRIMARY KEY,
        origin TEXT NOT NULL,
        destination TEXT NOT NULL,
        departure_day TEXT NOT NULL,
        body TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_flights_route ON flights(origin, destination)",
    "CREATE INDEX IF NOT EXISTS idx_flights_day ON flights(departure_day)",
    "CREATE TABLE IF NOT EXISTS bookings (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        body TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings(user_id)",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        body TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS search_cache (
        id TEXT PRIMARY KEY,
        query TEXT NOT NULL UNIQUE,
        expires_at INTEGER NOT NULL,
        body TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_search_cache_expiry ON search_cache(expires_at)",
];

/// The durable on-device cache of flights, bookings, users and search
/// results. Constructed once and shared (`Arc`); the underlying pool and
/// schema are set up lazily on the first operation, and every concurrent
/// caller awaits that single initialization.
pub struct LocalStore {
    path: String,
    /// Outcome of the single initialization attempt. A failure is
    /// memoized and replayed; the attempt is never re-run.
    init: OnceCell<Result<SqlitePool, String>>,
}

impl LocalStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            init: OnceCell::new(),
        }
    }

    async fn pool(&self) -> StoreResult<&SqlitePool> {
        let result = self
            .init
            .get_or_init(|| async {
                match Self::connect(&self.path).await {
                    Ok(pool) => {
                        info!("Local store initialized at {}", self.path);
                        Ok(pool)
                    }
                    Err(e) => Err(e.to_string()),
                }
            })
            .await;

        match result {
            Ok(pool) => Ok(pool),
            // Schema setup failure is fatal for this instance.
            Err(msg) => Err(StoreError::Init(msg.clone())),
        }
    }

    async fn connect(path: &str) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(pool)
    }

    // ------------------------------------------------------------------
    // Flights
    // ------------------------------------------------------------------

    /// Idempotent bulk upsert, committed as a single transaction: either
    /// every record lands or none does.
    pub async fn upsert_flights(&self, flights: &[Flight]) -> StoreResult<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        for flight in flights {
            write_flight(&mut tx, flight).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Authoritative overwrite of the whole collection. An empty slice
    /// yields an empty collection; a remote zero-row response is not a
    /// failure.
    pub async fn replace_flights(&self, flights: &[Flight]) -> StoreResult<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM flights").execute(&mut *tx).await?;
        for flight in flights {
            write_flight(&mut tx, flight).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn flights(&self) -> StoreResult<Vec<Flight>> {
        let pool = self.pool().await?;
        let bodies: Vec<String> = sqlx::query_scalar("SELECT body FROM flights")
            .fetch_all(pool)
            .await?;
        decode_all(bodies)
    }

    pub async fn flight(&self, id: &str) -> StoreResult<Option<Flight>> {
        let pool = self.pool().await?;
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM flights WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        decode_optional(body)
    }

    pub async fn flights_by_route(
        &self,
        origin: &str,
        destination: &str,
    ) -> StoreResult<Vec<Flight>> {
        let pool = self.pool().await?;
        let bodies: Vec<String> =
            sqlx::query_scalar("SELECT body FROM flights WHERE origin = ? AND destination = ?")
                .bind(origin)
                .bind(destination)
                .fetch_all(pool)
                .await?;
        decode_all(bodies)
    }

    pub async fn flights_by_day(&self, day: NaiveDate) -> StoreResult<Vec<Flight>> {
        let pool = self.pool().await?;
        let bodies: Vec<String> =
            sqlx::query_scalar("SELECT body FROM flights WHERE departure_day = ?")
                .bind(day.to_string())
                .fetch_all(pool)
                .await?;
        decode_all(bodies)
    }

    /// The one in-place flight patch. Returns false when the flight is not
    /// in the cache.
    pub async fn update_flight_seats(&self, id: &str, available_seats: i32) -> StoreResult<bool> {
        let Some(mut flight) = self.flight(id).await? else {
            return Ok(false);
        };
        flight.available_seats = Some(available_seats);
        self.upsert_flights(std::slice::from_ref(&flight)).await?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Bookings
    // ------------------------------------------------------------------

    pub async fn upsert_bookings(&self, bookings: &[Booking]) -> StoreResult<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        for booking in bookings {
            write_booking(&mut tx, booking).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Overwrite one user's bookings with a fresh sync pull, leaving other
    /// users' records untouched.
    pub async fn replace_user_bookings(
        &self,
        user_id: &str,
        bookings: &[Booking],
    ) -> StoreResult<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM bookings WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        for booking in bookings {
            write_booking(&mut tx, booking).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn bookings(&self) -> StoreResult<Vec<Booking>> {
        let pool = self.pool().await?;
        let bodies: Vec<String> = sqlx::query_scalar("SELECT body FROM bookings")
            .fetch_all(pool)
            .await?;
        decode_all(bodies)
    }

    pub async fn booking(&self, id: &str) -> StoreResult<Option<Booking>> {
        let pool = self.pool().await?;
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        decode_optional(body)
    }

    pub async fn bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let pool = self.pool().await?;
        let bodies: Vec<String> =
            sqlx::query_scalar("SELECT body FROM bookings WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(pool)
                .await?;
        decode_all(bodies)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn upsert_users(&self, users: &[UserProfile]) -> StoreResult<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        for user in users {
            let body = serde_json::to_string(user)?;
            sqlx::query(
                "INSERT INTO users (id, body) VALUES (?, ?)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body",
            )
            .bind(&user.id)
            .bind(body)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn users(&self) -> StoreResult<Vec<UserProfile>> {
        let pool = self.pool().await?;
        let bodies: Vec<String> = sqlx::query_scalar("SELECT body FROM users")
            .fetch_all(pool)
            .await?;
        decode_all(bodies)
    }

    pub async fn user(&self, id: &str) -> StoreResult<Option<UserProfile>> {
        let pool = self.pool().await?;
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        decode_optional(body)
    }

    // ------------------------------------------------------------------
    // Search cache
    // ------------------------------------------------------------------

    /// Store a captured search result. A later capture for the same
    /// canonical query supersedes the earlier one (last write wins).
    pub async fn put_search_result(&self, entry: &CachedSearchResult) -> StoreResult<()> {
        let pool = self.pool().await?;
        let body = serde_json::to_string(entry)?;
        sqlx::query(
            "INSERT INTO search_cache (id, query, expires_at, body) VALUES (?, ?, ?, ?)
             ON CONFLICT(query) DO UPDATE SET
                 id = excluded.id,
                 expires_at = excluded.expires_at,
                 body = excluded.body",
        )
        .bind(&entry.id)
        .bind(&entry.query)
        .bind(entry.expires_at.timestamp_millis())
        .bind(body)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Lookup by canonical query. An entry whose expiry has passed is a
    /// miss, identical to no entry at all.
    pub async fn search_result(&self, query: &str) -> StoreResult<Option<CachedSearchResult>> {
        let pool = self.pool().await?;
        let body: Option<String> = sqlx::query_scalar(
            "SELECT body FROM search_cache WHERE query = ? AND expires_at > ?",
        )
        .bind(query)
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(pool)
        .await?;
        decode_optional(body)
    }

    /// Physically remove every expired entry. Returns the removed count.
    pub async fn purge_expired_results(&self) -> StoreResult<u64> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM search_cache WHERE expires_at <= ?")
            .bind(Utc::now().timestamp_millis())
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Wipe every collection. Explicit user-initiated reset only.
    pub async fn clear_all(&self) -> StoreResult<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        for table in ["flights", "bookings", "users", "search_cache"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Serialized byte size of the union of all stored records. Diagnostic
    /// only; not exact storage-engine bytes.
    pub async fn approximate_size(&self) -> StoreResult<u64> {
        let pool = self.pool().await?;
        let mut total: i64 = 0;
        for table in ["flights", "bookings", "users", "search_cache"] {
            let size: i64 =
                sqlx::query_scalar(&format!("SELECT COALESCE(SUM(LENGTH(body)), 0) FROM {table}"))
                    .fetch_one(pool)
                    .await?;
            total += size;
        }
        Ok(total as u64)
    }
}

async fn write_flight(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    flight: &Flight,
) -> StoreResult<()> {
    let body = serde_json::to_string(flight)?;
    sqlx::query(
        "INSERT INTO flights (id, origin, destination, departure_day, body)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             origin = excluded.origin,
             destination = excluded.destination,
             departure_day = excluded.departure_day,
             body = excluded.body",
    )
    .bind(&flight.id)
    .bind(&flight.origin)
    .bind(&flight.destination)
    .bind(flight.departure_time.date_naive().to_string())
    .bind(body)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn write_booking(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    booking: &Booking,
) -> StoreResult<()> {
    let body = serde_json::to_string(booking)?;
    sqlx::query(
        "INSERT INTO bookings (id, user_id, body) VALUES (?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             user_id = excluded.user_id,
             body = excluded.body",
    )
    .bind(&booking.id)
    .bind(&booking.user_id)
    .bind(body)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn decode_all<T: serde::de::DeserializeOwned>(bodies: Vec<String>) -> StoreResult<Vec<T>> {
    bodies
        .into_iter()
        .map(|b| serde_json::from_str(&b).map_err(StoreError::from))
        .collect()
}

fn decode_optional<T: serde::de::DeserializeOwned>(body: Option<String>) -> StoreResult<Option<T>> {
    body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
        .transpose()
}
