use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CabinClass, Flight, TripType};

/// Criteria for the in-memory flight filter. Blank strings count as
/// unspecified, matching the behavior of empty form fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterCriteria {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub trip_type: TripType,
    pub cabin_class: Option<CabinClass>,
    pub passengers: u32,
}

/// Pure predicate over already-fetched flights: returns the subset matching
/// all specified criteria, preserving input order. No I/O, no shared state,
/// safe to run on any thread or inside the filter worker.
pub fn matching_flights(flights: &[Flight], criteria: &FilterCriteria) -> Vec<Flight> {
    flights
        .iter()
        .filter(|flight| matches(flight, criteria))
        .cloned()
        .collect()
}

fn matches(flight: &Flight, criteria: &FilterCriteria) -> bool {
    if !seats_sufficient(flight.available_seats, criteria.passengers) {
        return false;
    }
    if let Some(cabin) = criteria.cabin_class {
        if flight.cabin_class != cabin {
            return false;
        }
    }

    match criteria.trip_type {
        TripType::OneWay => matches_leg(
            flight,
            specified(&criteria.origin),
            specified(&criteria.destination),
            criteria.departure_date,
        ),
        TripType::RoundTrip => {
            // Outbound leg, or the inbound leg with direction and date reversed.
            let outbound = matches_leg(
                flight,
                specified(&criteria.origin),
                specified(&criteria.destination),
                criteria.departure_date,
            );
            let inbound = matches_leg(
                flight,
                specified(&criteria.destination),
                specified(&criteria.origin),
                criteria.return_date,
            );
            outbound || inbound
        }
    }
}

fn matches_leg(
    flight: &Flight,
    origin: Option<&str>,
    destination: Option<&str>,
    date: Option<NaiveDate>,
) -> bool {
    if let Some(origin) = origin {
        if flight.origin != origin {
            return false;
        }
    }
    if let Some(destination) = destination {
        if flight.destination != destination {
            return false;
        }
    }
    if let Some(date) = date {
        if !same_utc_day(flight.departure_time, date) {
            return false;
        }
    }
    true
}

/// A flight with no seat data is never excluded on capacity grounds.
fn seats_sufficient(available: Option<i32>, passengers: u32) -> bool {
    match available {
        Some(seats) => seats as i64 >= passengers as i64,
        None => true,
    }
}

/// Calendar-day equality in UTC, the fixed reference for date matching.
fn same_utc_day(instant: DateTime<Utc>, date: NaiveDate) -> bool {
    instant.date_naive() == date
}

fn specified(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
