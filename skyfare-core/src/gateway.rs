use async_trait::async_trait;

use crate::models::{Booking, Flight, UserProfile};

/// Failures of the remote query interface. Transport failures and
/// error-shaped responses are equivalent for fallback purposes: callers
/// behind the freshness-then-fallback boundary never see either.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("remote request failed: {0}")]
    Transport(String),
    #[error("remote returned error response ({status}): {message}")]
    ErrorResponse { status: u16, message: String },
    #[error("failed to decode remote payload: {0}")]
    Decode(String),
    #[error("remote call timed out after {0}s")]
    Timeout(u64),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Query interface over the hosted database, external to this core.
///
/// The reachability flag is only a hint that an attempt is worthwhile;
/// every method here can still fail and the engine falls back to the
/// local store when it does.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Select the full authoritative flight set. A zero-row result is a
    /// valid successful response, not a failure.
    async fn fetch_flights(&self) -> GatewayResult<Vec<Flight>>;

    /// Membership query, used to join bookings to their flights for display.
    async fn fetch_flights_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Flight>>;

    async fn fetch_user_bookings(&self, user_id: &str) -> GatewayResult<Vec<Booking>>;

    async fn fetch_user_profile(&self, user_id: &str) -> GatewayResult<Option<UserProfile>>;

    /// Upsert a booking edited locally.
    async fn push_booking(&self, booking: &Booking) -> GatewayResult<()>;

    /// In-place seat-count patch, the one partial flight update.
    async fn update_flight_seats(&self, flight_id: &str, available_seats: i32)
        -> GatewayResult<()>;

    /// Row-count-only query, dashboard diagnostic.
    async fn count_flights(&self) -> GatewayResult<u64>;
}
