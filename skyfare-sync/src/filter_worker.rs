use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use skyfare_core::filter::{matching_flights, FilterCriteria};
use skyfare_core::models::Flight;

struct FilterJob {
    request_id: u64,
    flights: Vec<Flight>,
    criteria: FilterCriteria,
    reply: oneshot::Sender<Vec<Flight>>,
}

/// Runs the pure flight filter off the caller's task.
///
/// Each call carries a fresh correlation (per-job reply channel plus a
/// logged request id), so overlapping in-flight requests cannot collide.
/// The worker is stateless and replaceable: if its channel is gone the
/// handle runs the same function inline on the calling thread.
#[derive(Clone)]
pub struct FilterWorker {
    jobs: mpsc::Sender<FilterJob>,
    next_request: Arc<AtomicU64>,
}

impl FilterWorker {
    pub fn spawn() -> Self {
        let (jobs, mut inbox) = mpsc::channel::<FilterJob>(32);
        tokio::spawn(async move {
            while let Some(job) = inbox.recv().await {
                let matched = matching_flights(&job.flights, &job.criteria);
                debug!(
                    request_id = job.request_id,
                    matched = matched.len(),
                    "filter job complete"
                );
                // The requester may have gone away; nothing to do then.
                let _ = job.reply.send(matched);
            }
        });
        Self {
            jobs,
            next_request: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn filter(&self, flights: Vec<Flight>, criteria: FilterCriteria) -> Vec<Flight> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        let job = FilterJob {
            request_id,
            flights: flights.clone(),
            criteria: criteria.clone(),
            reply,
        };

        if self.jobs.send(job).await.is_err() {
            warn!(request_id, "filter worker unavailable, running inline");
            return matching_flights(&flights, &criteria);
        }
        match response.await {
            Ok(matched) => matched,
            Err(_) => {
                warn!(request_id, "filter worker dropped the job, running inline");
                matching_flights(&flights, &criteria)
            }
        }
    }

    #[cfg(test)]
    fn disconnected() -> Self {
        let (jobs, inbox) = mpsc::channel(1);
        drop(inbox);
        Self {
            jobs,
            next_request: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use skyfare_core::models::{CabinClass, TripType};

    fn flight(id: &str, origin: &str, destination: &str) -> Flight {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let departure = Utc.from_utc_datetime(&day.and_hms_opt(10, 0, 0).unwrap());
        Flight {
            id: id.to_string(),
            flight_number: format!("SF-{id}"),
            airline: "Skyfare Air".to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_time: departure,
            arrival_time: departure + Duration::hours(4),
            price: 180.0,
            cabin_class: CabinClass::Economy,
            available_seats: Some(40),
        }
    }

    fn criteria(origin: &str) -> FilterCriteria {
        FilterCriteria {
            origin: Some(origin.to_string()),
            destination: None,
            departure_date: None,
            return_date: None,
            trip_type: TripType::OneWay,
            cabin_class: None,
            passengers: 1,
        }
    }

    #[tokio::test]
    async fn test_overlapping_requests_get_their_own_results() {
        let worker = FilterWorker::spawn();
        let flights = vec![flight("f1", "NYC", "LAX"), flight("f2", "SFO", "SEA")];

        let (from_nyc, from_sfo) = tokio::join!(
            worker.filter(flights.clone(), criteria("NYC")),
            worker.filter(flights.clone(), criteria("SFO")),
        );
        assert_eq!(from_nyc.len(), 1);
        assert_eq!(from_nyc[0].id, "f1");
        assert_eq!(from_sfo.len(), 1);
        assert_eq!(from_sfo[0].id, "f2");
    }

    #[tokio::test]
    async fn test_inline_fallback_matches_worker_output() {
        let worker = FilterWorker::spawn();
        let broken = FilterWorker::disconnected();
        let flights = vec![flight("f1", "NYC", "LAX"), flight("f2", "SFO", "SEA")];

        let via_worker = worker.filter(flights.clone(), criteria("NYC")).await;
        let via_fallback = broken.filter(flights, criteria("NYC")).await;
        assert_eq!(via_worker, via_fallback);
    }
}
