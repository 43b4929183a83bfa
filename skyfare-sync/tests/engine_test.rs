use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use skyfare_core::gateway::{GatewayError, GatewayResult, RemoteGateway};
use skyfare_core::models::{Booking, CabinClass, Flight, Passenger, TripType, UserProfile};
use skyfare_store::app_config::SyncConfig;
use skyfare_store::LocalStore;
use skyfare_sync::{BookingChange, ConnectivityMonitor, SyncEngine};

fn flight(id: &str, origin: &str, destination: &str, seats: Option<i32>) -> Flight {
    let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    let departure = Utc.from_utc_datetime(&day.and_hms_opt(8, 0, 0).unwrap());
    Flight {
        id: id.to_string(),
        flight_number: format!("SF-{id}"),
        airline: "Skyfare Air".to_string(),
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure_time: departure,
        arrival_time: departure + chrono::Duration::hours(6),
        price: 275.0,
        cabin_class: CabinClass::Economy,
        available_seats: seats,
    }
}

fn booking(id: &str, user_id: &str, flight_id: &str) -> Booking {
    Booking {
        id: id.to_string(),
        user_id: user_id.to_string(),
        flight_id: flight_id.to_string(),
        passengers: vec![Passenger {
            name: "Ada".to_string(),
            age: 34,
            gender: "female".to_string(),
        }],
        cabin_class: CabinClass::Economy,
        total_price: 275.0,
        trip_type: TripType::OneWay,
        status: "confirmed".to_string(),
        payment_method: None,
        payment_status: None,
        transaction_id: None,
        paid_at: None,
        booked_at: Utc::now(),
    }
}

/// Scriptable remote: per-resource failure switches, call counters, and an
/// optional artificial delay for overlap tests.
#[derive(Default)]
struct MockGateway {
    flights: Mutex<Vec<Flight>>,
    bookings: Mutex<Vec<Booking>>,
    profile: Mutex<Option<UserProfile>>,
    fail_flights: AtomicBool,
    fail_bookings: AtomicBool,
    flight_calls: AtomicUsize,
    booking_calls: AtomicUsize,
    pushed_bookings: Mutex<Vec<Booking>>,
    seat_patches: Mutex<Vec<(String, i32)>>,
    delay: Option<Duration>,
}

impl MockGateway {
    fn with_flights(flights: Vec<Flight>) -> Self {
        Self {
            flights: Mutex::new(flights),
            ..Default::default()
        }
    }

    fn set_flights(&self, flights: Vec<Flight>) {
        *self.flights.lock().unwrap() = flights;
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn fetch_flights(&self) -> GatewayResult<Vec<Flight>> {
        self.flight_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_flights.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        Ok(self.flights.lock().unwrap().clone())
    }

    async fn fetch_flights_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Flight>> {
        if self.fail_flights.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        Ok(self
            .flights
            .lock()
            .unwrap()
            .iter()
            .filter(|f| ids.contains(&f.id))
            .cloned()
            .collect())
    }

    async fn fetch_user_bookings(&self, user_id: &str) -> GatewayResult<Vec<Booking>> {
        self.booking_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bookings.load(Ordering::SeqCst) {
            return Err(GatewayError::ErrorResponse {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn fetch_user_profile(&self, user_id: &str) -> GatewayResult<Option<UserProfile>> {
        Ok(self
            .profile
            .lock()
            .unwrap()
            .clone()
            .filter(|p| p.id == user_id))
    }

    async fn push_booking(&self, booking: &Booking) -> GatewayResult<()> {
        if self.fail_bookings.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        self.pushed_bookings.lock().unwrap().push(booking.clone());
        Ok(())
    }

    async fn update_flight_seats(
        &self,
        flight_id: &str,
        available_seats: i32,
    ) -> GatewayResult<()> {
        self.seat_patches
            .lock()
            .unwrap()
            .push((flight_id.to_string(), available_seats));
        Ok(())
    }

    async fn count_flights(&self) -> GatewayResult<u64> {
        Ok(self.flights.lock().unwrap().len() as u64)
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<LocalStore>,
    gateway: Arc<MockGateway>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
}

fn harness(gateway: MockGateway, reachable: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let store = Arc::new(LocalStore::new(format!("sqlite://{}", path.display())));
    let gateway = Arc::new(gateway);
    let monitor = Arc::new(ConnectivityMonitor::new(reachable));
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        gateway.clone(),
        monitor.clone(),
        &SyncConfig::default(),
    ));
    Harness {
        _dir: dir,
        store,
        gateway,
        monitor,
        engine,
    }
}

#[tokio::test]
async fn remote_failure_falls_back_to_cached_flights() {
    let h = harness(MockGateway::default(), true);
    h.store
        .upsert_flights(&[flight("f1", "NYC", "LAX", Some(10))])
        .await
        .unwrap();
    h.gateway.fail_flights.store(true, Ordering::SeqCst);

    let flights = h.engine.get_flights().await.unwrap();
    assert_eq!(flights.len(), 1);
    assert_eq!(flights[0].id, "f1");
    // The failed attempt must not have wiped the cache.
    assert_eq!(h.store.flights().await.unwrap().len(), 1);
    assert!(!*h.engine.last_fetch_fresh().borrow());
}

#[tokio::test]
async fn fresh_remote_data_overwrites_cache_including_empty_set() {
    let h = harness(
        MockGateway::with_flights(vec![
            flight("f1", "NYC", "LAX", Some(10)),
            flight("f2", "LAX", "NYC", Some(5)),
        ]),
        true,
    );
    h.store
        .upsert_flights(&[flight("stale", "SFO", "SEA", None)])
        .await
        .unwrap();

    let flights = h.engine.get_flights().await.unwrap();
    assert_eq!(flights.len(), 2);
    let cached = h.store.flights().await.unwrap();
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|f| f.id != "stale"));
    assert!(*h.engine.last_fetch_fresh().borrow());

    // A zero-row response is authoritative, not a failure.
    h.gateway.set_flights(Vec::new());
    let flights = h.engine.get_flights().await.unwrap();
    assert!(flights.is_empty());
    assert!(h.store.flights().await.unwrap().is_empty());
}

#[tokio::test]
async fn offline_skips_remote_and_reads_cache() {
    let h = harness(MockGateway::with_flights(vec![flight("f1", "NYC", "LAX", None)]), false);
    h.store
        .upsert_flights(&[flight("f9", "SFO", "SEA", None)])
        .await
        .unwrap();

    let flights = h.engine.get_flights().await.unwrap();
    assert_eq!(flights.len(), 1);
    assert_eq!(flights[0].id, "f9");
    assert_eq!(h.gateway.flight_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_online_then_failing_gateway_serves_same_flights() {
    let h = harness(
        MockGateway::with_flights(vec![
            flight("f1", "NYC", "LAX", Some(50)),
            flight("f2", "LAX", "NYC", Some(0)),
        ]),
        true,
    );

    let online = h.engine.get_flights().await.unwrap();
    assert_eq!(online.len(), 2);
    assert_eq!(h.store.flights().await.unwrap().len(), 2);

    h.gateway.fail_flights.store(true, Ordering::SeqCst);
    let fallback = h.engine.get_flights().await.unwrap();
    let mut ids: Vec<&str> = fallback.iter().map(|f| f.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["f1", "f2"]);
}

#[tokio::test]
async fn second_search_within_ttl_hits_the_cache() {
    let h = harness(MockGateway::with_flights(vec![flight("f1", "NYC", "LAX", Some(3))]), true);

    let first = h
        .engine
        .search_flights(
            Some("NYC".to_string()),
            Some("LAX".to_string()),
            NaiveDate::from_ymd_opt(2024, 1, 15),
        )
        .await
        .unwrap();
    let second = h
        .engine
        .search_flights(
            Some("NYC".to_string()),
            Some("LAX".to_string()),
            NaiveDate::from_ymd_opt(2024, 1, 15),
        )
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    // Exactly one remote call across both invocations.
    assert_eq!(h.gateway.flight_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn search_applies_only_specified_filters() {
    let h = harness(
        MockGateway::with_flights(vec![
            flight("f1", "NYC", "LAX", None),
            flight("f2", "NYC", "SFO", None),
            flight("f3", "BOS", "LAX", None),
        ]),
        true,
    );

    let from_nyc = h
        .engine
        .search_flights(Some("NYC".to_string()), None, None)
        .await
        .unwrap();
    let ids: Vec<&str> = from_nyc.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["f1", "f2"]);

    let everything = h.engine.search_flights(None, None, None).await.unwrap();
    assert_eq!(everything.len(), 3);
}

#[tokio::test]
async fn offline_booking_update_is_local_only_and_never_throws() {
    let h = harness(MockGateway::default(), false);
    h.store
        .upsert_flights(&[flight("f1", "NYC", "LAX", Some(50))])
        .await
        .unwrap();
    h.store.upsert_bookings(&[booking("b1", "u1", "f1")]).await.unwrap();

    let mut edited = booking("b1", "u1", "f1");
    edited.status = "cancelled".to_string();
    let change = BookingChange::new(edited).with_seat_adjustment("f1", 51);

    h.engine.update_booking(change).await.unwrap();

    let stored = h.store.booking("b1").await.unwrap().unwrap();
    assert_eq!(stored.status, "cancelled");
    let f = h.store.flight("f1").await.unwrap().unwrap();
    assert_eq!(f.available_seats, Some(51));
    // The gateway was never touched.
    assert!(h.gateway.pushed_bookings.lock().unwrap().is_empty());
    assert!(h.gateway.seat_patches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn online_booking_update_pushes_and_push_failure_is_not_surfaced() {
    let h = harness(MockGateway::default(), true);
    h.store.upsert_bookings(&[booking("b1", "u1", "f1")]).await.unwrap();

    h.engine
        .update_booking(BookingChange::new(booking("b1", "u1", "f1")))
        .await
        .unwrap();
    assert_eq!(h.gateway.pushed_bookings.lock().unwrap().len(), 1);

    // Local write still succeeds when the push fails.
    h.gateway.fail_bookings.store(true, Ordering::SeqCst);
    let mut edited = booking("b1", "u1", "f1");
    edited.status = "changed".to_string();
    h.engine
        .update_booking(BookingChange::new(edited))
        .await
        .unwrap();
    assert_eq!(
        h.store.booking("b1").await.unwrap().unwrap().status,
        "changed"
    );
}

#[tokio::test]
async fn bookings_without_session_user_are_empty_not_an_error() {
    let h = harness(MockGateway::default(), true);
    let bookings = h.engine.get_user_bookings().await.unwrap();
    assert!(bookings.is_empty());
    assert_eq!(h.gateway.booking_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn partial_sync_failure_does_not_abort_other_sub_syncs() {
    let gateway = MockGateway::with_flights(vec![flight("f1", "NYC", "LAX", Some(9))]);
    gateway.fail_bookings.store(true, Ordering::SeqCst);
    *gateway.profile.lock().unwrap() = Some(UserProfile {
        id: "u1".to_string(),
        email: "ada@example.com".to_string(),
        display_name: Some("Ada".to_string()),
        last_synced_at: None,
    });
    let h = harness(gateway, true);
    h.engine.set_session_user(Some("u1".to_string())).await;

    h.engine.sync_all().await;

    // Flights and profile landed despite the bookings failure.
    assert_eq!(h.store.flights().await.unwrap().len(), 1);
    let profile = h.store.user("u1").await.unwrap().unwrap();
    assert!(profile.last_synced_at.is_some());
    // A partial cycle still records the last-synced timestamp.
    assert!(h.engine.last_synced().borrow().is_some());
    assert!(!*h.engine.sync_in_progress().borrow());
}

#[tokio::test]
async fn overlapping_sync_triggers_are_suppressed() {
    let mut gateway = MockGateway::with_flights(vec![flight("f1", "NYC", "LAX", None)]);
    gateway.delay = Some(Duration::from_millis(50));
    let h = harness(gateway, true);

    tokio::join!(h.engine.sync_all(), h.engine.sync_all());

    // The second trigger was suppressed, not queued.
    assert_eq!(h.gateway.flight_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconnect_triggers_one_sync_per_transition() {
    let h = harness(MockGateway::with_flights(vec![flight("f1", "NYC", "LAX", None)]), false);
    let _watcher = h.engine.watch_connectivity();
    tokio::time::sleep(Duration::from_millis(10)).await;

    h.monitor.set_reachable(true);
    h.monitor.set_reachable(true); // redundant report, no transition
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.gateway.flight_calls.load(Ordering::SeqCst), 1);

    h.monitor.set_reachable(false);
    h.monitor.set_reachable(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.gateway.flight_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn booking_flight_join_upserts_without_overwriting() {
    let h = harness(
        MockGateway::with_flights(vec![
            flight("f1", "NYC", "LAX", Some(4)),
            flight("f2", "LAX", "NYC", Some(8)),
        ]),
        true,
    );
    h.store
        .upsert_flights(&[flight("local-only", "SFO", "SEA", None)])
        .await
        .unwrap();

    let bookings = vec![booking("b1", "u1", "f1"), booking("b2", "u1", "f2")];
    let joined = h.engine.get_flights_for_bookings(&bookings).await.unwrap();
    assert_eq!(joined.len(), 2);
    // Join mirrors are upserts; unrelated cached flights survive.
    assert_eq!(h.store.flights().await.unwrap().len(), 3);

    // Offline, the same join resolves from the cache.
    h.monitor.set_reachable(false);
    let offline = h.engine.get_flights_for_bookings(&bookings).await.unwrap();
    assert_eq!(offline.len(), 2);
}

#[tokio::test]
async fn expired_cache_entries_purge_through_the_engine() {
    let h = harness(MockGateway::with_flights(vec![flight("f1", "NYC", "LAX", None)]), true);

    let entry = skyfare_core::models::CachedSearchResult::new(
        "origin=OLD|dest=*|date=*".to_string(),
        Vec::new(),
        chrono::Duration::seconds(-5),
    );
    h.store.put_search_result(&entry).await.unwrap();

    assert_eq!(h.engine.purge_expired_cache().await.unwrap(), 1);
    assert_eq!(h.engine.remote_flight_count().await, Some(1));
    assert!(h.engine.approximate_store_size().await.unwrap() == 0);
}
