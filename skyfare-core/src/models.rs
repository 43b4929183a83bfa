use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Cabin class offered on a flight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    Economy,
    Business,
    First,
}

/// Trip type of a booking or a search
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripType {
    OneWay,
    RoundTrip,
}

/// A flight as mirrored from the remote source of truth.
///
/// Flights are overwritten wholesale by sync pulls; the only in-place
/// mutation the cache layer applies is the seat count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: String,
    pub flight_number: String,
    pub airline: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    /// Currency-agnostic amount
    pub price: f64,
    pub cabin_class: CabinClass,
    /// None means the remote exposes no seat data for this flight
    pub available_seats: Option<i32>,
}

impl Flight {
    /// Check the record-level invariant: a flight cannot land before it departs.
    pub fn validate(&self) -> CoreResult<()> {
        if self.arrival_time < self.departure_time {
            return Err(CoreError::ValidationError(format!(
                "flight {} arrives before it departs",
                self.id
            )));
        }
        Ok(())
    }
}

/// A passenger on a booking. Unconstrained by the cache layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub name: String,
    pub age: u8,
    pub gender: String,
}

/// A booking owned by a user, referencing a flight by logical identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub flight_id: String,
    pub passengers: Vec<Passenger>,
    pub cabin_class: CabinClass,
    pub total_price: f64,
    pub trip_type: TripType,
    /// Free text, e.g. "confirmed" / "cancelled"
    pub status: String,
    pub payment_method: Option<String>,
    pub payment_status: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub booked_at: DateTime<Utc>,
}

/// The authenticated user's profile, one record per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// A memoized search result with a bounded time-to-live.
///
/// Entries are immutable once written; expiry is evaluated against the
/// current time at read, never by mutating the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedSearchResult {
    pub id: String,
    /// Canonical serialization of the search arguments, see [`crate::query`]
    pub query: String,
    pub flights: Vec<Flight>,
    pub captured_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedSearchResult {
    /// Capture a search result now, expiring after `ttl`.
    pub fn new(query: String, flights: Vec<Flight>, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}-{}", now.timestamp_millis(), Uuid::new_v4().simple()),
            query,
            flights,
            captured_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
