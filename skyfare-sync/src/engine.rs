use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info, warn};

use skyfare_core::gateway::{GatewayError, GatewayResult, RemoteGateway};
use skyfare_core::models::{Booking, Flight};
use skyfare_core::query::SearchQuery;
use skyfare_store::app_config::SyncConfig;
use skyfare_store::LocalStore;

use crate::connectivity::{ConnectivityMonitor, ReachabilityEvent};
use crate::search_cache::SearchCache;
use crate::SyncResult;

/// The one in-place flight patch carried alongside a booking edit.
#[derive(Debug, Clone)]
pub struct SeatAdjustment {
    pub flight_id: String,
    pub available_seats: i32,
}

/// A composed update description: the full booking record plus any seat
/// adjustments it implies. Passing the whole change at once keeps the
/// atomicity boundary at the user-visible unit of edit rather than at an
/// accidental sequence of calls.
#[derive(Debug, Clone)]
pub struct BookingChange {
    pub booking: Booking,
    pub seat_adjustments: Vec<SeatAdjustment>,
}

impl BookingChange {
    pub fn new(booking: Booking) -> Self {
        Self {
            booking,
            seat_adjustments: Vec::new(),
        }
    }

    pub fn with_seat_adjustment(
        mut self,
        flight_id: impl Into<String>,
        available_seats: i32,
    ) -> Self {
        self.seat_adjustments.push(SeatAdjustment {
            flight_id: flight_id.into(),
            available_seats,
        });
        self
    }
}

/// Keeps the local store reconciled with the remote source of truth and
/// serves reads from whichever side is authoritative given connectivity.
///
/// Freshness is attempted first and the store is the fallback. Remote
/// failures never surface from reads; only store failures propagate.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    gateway: Arc<dyn RemoteGateway>,
    connectivity: Arc<ConnectivityMonitor>,
    search_cache: SearchCache,
    session_user: RwLock<Option<String>>,
    remote_timeout: Duration,
    /// Re-entrancy guard: a sync in progress suppresses a new trigger.
    syncing: AtomicBool,
    sync_in_progress_tx: watch::Sender<bool>,
    last_synced_tx: watch::Sender<Option<DateTime<Utc>>>,
    /// Whether the most recent fallback-capable read served remote data.
    /// Deliberately distinct from reachability: the two can disagree.
    last_fetch_fresh_tx: watch::Sender<bool>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<LocalStore>,
        gateway: Arc<dyn RemoteGateway>,
        connectivity: Arc<ConnectivityMonitor>,
        config: &SyncConfig,
    ) -> Self {
        let (sync_in_progress_tx, _) = watch::channel(false);
        let (last_synced_tx, _) = watch::channel(None);
        let (last_fetch_fresh_tx, _) = watch::channel(false);
        Self {
            search_cache: SearchCache::new(store.clone(), config.search_ttl_seconds),
            store,
            gateway,
            connectivity,
            session_user: RwLock::new(None),
            remote_timeout: Duration::from_secs(config.remote_timeout_secs),
            syncing: AtomicBool::new(false),
            sync_in_progress_tx,
            last_synced_tx,
            last_fetch_fresh_tx,
        }
    }

    // ------------------------------------------------------------------
    // Session & observables
    // ------------------------------------------------------------------

    pub async fn set_session_user(&self, user_id: Option<String>) {
        *self.session_user.write().await = user_id;
    }

    pub async fn session_user(&self) -> Option<String> {
        self.session_user.read().await.clone()
    }

    pub fn reachability(&self) -> watch::Receiver<bool> {
        self.connectivity.watch()
    }

    pub fn sync_in_progress(&self) -> watch::Receiver<bool> {
        self.sync_in_progress_tx.subscribe()
    }

    pub fn last_synced(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_synced_tx.subscribe()
    }

    pub fn last_fetch_fresh(&self) -> watch::Receiver<bool> {
        self.last_fetch_fresh_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Sync cycle
    // ------------------------------------------------------------------

    /// Trigger one sync cycle on every became-reachable transition. One
    /// event yields at most one cycle; the re-entrancy guard absorbs any
    /// overlap with a manually triggered sync.
    pub fn watch_connectivity(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut events = engine.connectivity.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ReachabilityEvent::BecameReachable) => {
                        info!("connectivity restored, starting sync cycle");
                        engine.sync_all().await;
                    }
                    Ok(ReachabilityEvent::BecameUnreachable) => {
                        info!("connectivity lost, serving cached data");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "connectivity events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Run the three sub-syncs (flights, this user's bookings, this user's
    /// profile) concurrently. A failure in one is logged and never aborts
    /// the others; the last-synced timestamp is recorded even for a
    /// partial cycle. Skipped entirely when unreachable or mid-sync.
    pub async fn sync_all(&self) {
        if !self.connectivity.is_reachable() {
            debug!("sync skipped: network unreachable");
            return;
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync suppressed: a cycle is already in progress");
            return;
        }
        self.sync_in_progress_tx.send_replace(true);

        let user = self.session_user().await;
        let (flights, bookings, profile) = tokio::join!(
            self.sync_flights(),
            self.sync_bookings(user.as_deref()),
            self.sync_profile(user.as_deref()),
        );
        for (name, result) in [
            ("flights", flights),
            ("bookings", bookings),
            ("profile", profile),
        ] {
            if let Err(e) = result {
                warn!("{name} sub-sync failed: {e}");
            }
        }

        self.last_synced_tx.send_replace(Some(Utc::now()));
        self.sync_in_progress_tx.send_replace(false);
        self.syncing.store(false, Ordering::SeqCst);
    }

    async fn sync_flights(&self) -> SyncResult<()> {
        let flights = self.remote(self.gateway.fetch_flights()).await?;
        let count = flights.len();
        self.store.replace_flights(&flights).await?;
        info!(count, "flight collection synced");
        Ok(())
    }

    async fn sync_bookings(&self, user: Option<&str>) -> SyncResult<()> {
        let Some(user) = user else {
            return Ok(());
        };
        let bookings = self.remote(self.gateway.fetch_user_bookings(user)).await?;
        let count = bookings.len();
        self.store.replace_user_bookings(user, &bookings).await?;
        info!(count, user, "booking collection synced");
        Ok(())
    }

    async fn sync_profile(&self, user: Option<&str>) -> SyncResult<()> {
        let Some(user) = user else {
            return Ok(());
        };
        let Some(mut profile) = self.remote(self.gateway.fetch_user_profile(user)).await? else {
            debug!(user, "no remote profile to sync");
            return Ok(());
        };
        profile.last_synced_at = Some(Utc::now());
        self.store.upsert_users(std::slice::from_ref(&profile)).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fallback-capable reads
    // ------------------------------------------------------------------

    /// Freshness first, availability as the fallback. While reachable the
    /// remote set is fetched and mirrored wholesale into the store, a
    /// zero-row response included. Any remote failure (or timeout) falls
    /// back to the store's contents; an empty cache is a valid fallback
    /// result, not an error.
    pub async fn get_flights(&self) -> SyncResult<Vec<Flight>> {
        if self.connectivity.is_reachable() {
            match self.remote(self.gateway.fetch_flights()).await {
                Ok(flights) => {
                    self.store.replace_flights(&flights).await?;
                    self.last_fetch_fresh_tx.send_replace(true);
                    return Ok(flights);
                }
                Err(e) => warn!("remote flight fetch failed, serving cached flights: {e}"),
            }
        }
        self.last_fetch_fresh_tx.send_replace(false);
        Ok(self.store.flights().await?)
    }

    /// Same pattern, scoped to the session user. With no authenticated
    /// user there is no identity to query for, so the result is an empty
    /// list rather than an error.
    pub async fn get_user_bookings(&self) -> SyncResult<Vec<Booking>> {
        let Some(user) = self.session_user().await else {
            return Ok(Vec::new());
        };
        if self.connectivity.is_reachable() {
            match self.remote(self.gateway.fetch_user_bookings(&user)).await {
                Ok(bookings) => {
                    self.store.replace_user_bookings(&user, &bookings).await?;
                    self.last_fetch_fresh_tx.send_replace(true);
                    return Ok(bookings);
                }
                Err(e) => warn!("remote booking fetch failed, serving cached bookings: {e}"),
            }
        }
        self.last_fetch_fresh_tx.send_replace(false);
        Ok(self.store.bookings_for_user(&user).await?)
    }

    /// Resolve the flights a set of bookings reference, for display joins.
    /// Remote when possible (mirrored into the store as an upsert, not an
    /// overwrite), cached otherwise.
    pub async fn get_flights_for_bookings(&self, bookings: &[Booking]) -> SyncResult<Vec<Flight>> {
        let ids: Vec<String> = bookings
            .iter()
            .map(|b| b.flight_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        if self.connectivity.is_reachable() {
            match self.remote(self.gateway.fetch_flights_by_ids(&ids)).await {
                Ok(flights) => {
                    self.store.upsert_flights(&flights).await?;
                    return Ok(flights);
                }
                Err(e) => warn!("remote flight join failed, serving cached flights: {e}"),
            }
        }

        let mut flights = Vec::new();
        for id in &ids {
            if let Some(flight) = self.store.flight(id).await? {
                flights.push(flight);
            }
        }
        Ok(flights)
    }

    /// Search with memoization: the canonical query is checked against the
    /// search cache first; a miss goes through `get_flights` and filters
    /// in memory, each absent argument skipping its filter and dates
    /// comparing by UTC calendar day.
    pub async fn search_flights(
        &self,
        origin: Option<String>,
        destination: Option<String>,
        date: Option<NaiveDate>,
    ) -> SyncResult<Vec<Flight>> {
        let query = SearchQuery::new(origin, destination, date);
        let key = query.canonical();

        if let Some(cached) = self.search_cache.lookup(&key).await? {
            return Ok(cached);
        }

        let flights = self.get_flights().await?;
        let matched: Vec<Flight> = flights
            .into_iter()
            .filter(|flight| {
                query.origin.as_deref().is_none_or(|o| flight.origin == o)
                    && query
                        .destination
                        .as_deref()
                        .is_none_or(|d| flight.destination == d)
                    && query
                        .date
                        .is_none_or(|d| flight.departure_time.date_naive() == d)
            })
            .collect();

        self.search_cache.store(&key, matched.clone()).await?;
        Ok(matched)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Local first: the edit must be visible immediately and survive a
    /// subsequent offline period. Only then, and only while reachable, is
    /// the same change pushed remotely. A push failure is logged, not
    /// retried, and not surfaced; the local copy is authoritative until
    /// the next sync.
    pub async fn update_booking(&self, change: BookingChange) -> SyncResult<()> {
        self.store
            .upsert_bookings(std::slice::from_ref(&change.booking))
            .await?;
        for adjustment in &change.seat_adjustments {
            let patched = self
                .store
                .update_flight_seats(&adjustment.flight_id, adjustment.available_seats)
                .await?;
            if !patched {
                warn!(flight_id = %adjustment.flight_id, "seat adjustment for uncached flight");
            }
        }

        if self.connectivity.is_reachable() {
            if let Err(e) = self.push_change(&change).await {
                warn!(
                    booking_id = %change.booking.id,
                    "remote push failed, local copy is authoritative until next sync: {e}"
                );
            }
        }
        Ok(())
    }

    async fn push_change(&self, change: &BookingChange) -> GatewayResult<()> {
        self.remote(self.gateway.push_booking(&change.booking)).await?;
        for adjustment in &change.seat_adjustments {
            self.remote(
                self.gateway
                    .update_flight_seats(&adjustment.flight_id, adjustment.available_seats),
            )
            .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance & diagnostics
    // ------------------------------------------------------------------

    pub async fn purge_expired_cache(&self) -> SyncResult<u64> {
        self.search_cache.purge_expired().await
    }

    pub async fn approximate_store_size(&self) -> SyncResult<u64> {
        Ok(self.store.approximate_size().await?)
    }

    /// Explicit user-initiated reset of every local collection.
    pub async fn reset_local_data(&self) -> SyncResult<()> {
        info!("clearing all local collections");
        Ok(self.store.clear_all().await?)
    }

    /// Authoritative row count, when the remote can answer. Dashboard
    /// diagnostic only.
    pub async fn remote_flight_count(&self) -> Option<u64> {
        if !self.connectivity.is_reachable() {
            return None;
        }
        match self.remote(self.gateway.count_flights()).await {
            Ok(count) => Some(count),
            Err(e) => {
                debug!("remote count unavailable: {e}");
                None
            }
        }
    }

    /// Bound every remote call so the attempt-then-fallback contract has a
    /// practical upper bound on latency.
    async fn remote<T>(
        &self,
        call: impl std::future::Future<Output = GatewayResult<T>>,
    ) -> GatewayResult<T> {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.remote_timeout.as_secs())),
        }
    }
}
