// Data model for the Bluebikes station traffic map
// Station feed (GBFS-style JSON): https://dsc106.com/labs/lab07/data/bluebikes-stations.json
// Trip log (monthly CSV export): https://dsc106.com/labs/lab07/data/bluebikes-traffic-2024-03.csv
//
// Stations and trips are loaded once and never change. Traffic counts live in a
// separate snapshot keyed by station id (see traffic.rs) and are joined with the
// station only when a frame is built for the map.

use chrono::{NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Identifiers
// ============================================================================

/// Canonical station short code (e.g. `"A32000"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId(Arc<str>);

impl StationId {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for StationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Station {
    pub id: StationId,
    pub name: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub start_station_id: String,
    pub end_station_id: String,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
}

impl Trip {
    pub fn start_minute(&self) -> u16 {
        minutes_since_midnight(&self.started_at)
    }

    pub fn end_minute(&self) -> u16 {
        minutes_since_midnight(&self.ended_at)
    }
}

/// Minute of the day (0..=1439) of a wall-clock instant; the date is ignored.
pub fn minutes_since_midnight(at: &NaiveDateTime) -> u16 {
    (at.hour() * 60 + at.minute()) as u16
}

/// Arrival/departure counts of one station for the trip subset last aggregated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StationTraffic {
    pub arrivals: u32,
    pub departures: u32,
    pub total_traffic: u32,
}

impl StationTraffic {
    pub fn new(arrivals: u32, departures: u32) -> Self {
        StationTraffic {
            arrivals,
            departures,
            total_traffic: arrivals + departures,
        }
    }
}

/// Station joined with its current traffic and the visual values the map applies.
#[derive(Debug, Clone, Serialize)]
pub struct StationView {
    pub id: StationId,
    pub name: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub arrivals: u32,
    pub departures: u32,
    pub total_traffic: u32,
    pub radius: f64,
    pub departure_ratio: f64,
    pub flow: f64,
    pub tooltip: String,
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BikeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("File error: {0}")]
    FileError(String),

    #[error("No valid stations to draw ({0} records rejected)")]
    NoValidStations(usize),

    #[error("Invalid time filter: {0} (expected -1 or 0..=1439)")]
    InvalidFilter(i32),
}

pub type Result<T> = std::result::Result<T, BikeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 42)
            .unwrap()
    }

    #[test]
    fn minutes_ignore_date_and_seconds() {
        assert_eq!(minutes_since_midnight(&at(0, 0)), 0);
        assert_eq!(minutes_since_midnight(&at(9, 30)), 570);
        assert_eq!(minutes_since_midnight(&at(23, 59)), 1439);

        let other_day = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(minutes_since_midnight(&other_day), 570);
    }

    #[test]
    fn total_is_sum_of_arrivals_and_departures() {
        let traffic = StationTraffic::new(4, 7);
        assert_eq!(traffic.total_traffic, 11);
        assert_eq!(StationTraffic::default().total_traffic, 0);
    }

    #[test]
    fn station_id_serializes_as_plain_string() {
        let id = StationId::new("A32000");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"A32000\"");
        assert_eq!(id.to_string(), "A32000");
    }
}
